/// Client configuration.
/// Groups the remote endpoint, the caller identity, the polling cadence and
/// where local preferences live.

use crate::error::{ClientError, Result};
use crate::identity::ParticipantId;
use crate::resource::ResourceClass;
use directories::BaseDirs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:4000";
const DEFAULT_DIR_NAME: &str = ".duochat";

/// Polling cadence per resource class plus the transport timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub conversations_ttl: Duration,
    pub messages_ttl: Duration,
    pub call_history_ttl: Duration,
    /// Profiles and search results, effectively pulled once
    pub profile_ttl: Duration,
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            conversations_ttl: Duration::from_secs(5),
            messages_ttl: Duration::from_secs(3),
            call_history_ttl: Duration::from_secs(5),
            profile_ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    pub fn ttl(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::Conversations => self.conversations_ttl,
            ResourceClass::Messages => self.messages_ttl,
            ResourceClass::CallHistory => self.call_history_ttl,
            ResourceClass::Profile | ResourceClass::UserSearch => self.profile_ttl,
        }
    }

    /// How long an evicted key keeps dropping late pulls: no pull can outlive
    /// the transport timeout, nor should one outlive the longest TTL
    pub fn eviction_horizon(&self) -> Duration {
        [
            self.conversations_ttl,
            self.messages_ttl,
            self.call_history_ttl,
            self.profile_ttl,
        ]
        .into_iter()
        .fold(self.request_timeout, Duration::max)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: Url,
    pub principal: ParticipantId,
    pub sync: SyncConfig,
    /// Directory holding per-principal preference files
    pub config_dir: PathBuf,
}

impl ClientConfig {
    /// Build a configuration, validating the URL and the principal.
    /// Without an explicit directory, preferences go to `~/.duochat`.
    pub fn new(server_url: &str, principal: &str, config_dir: Option<PathBuf>) -> Result<Self> {
        let server_url = Url::parse(server_url)
            .map_err(|e| ClientError::ConfigError(format!("invalid server url {}: {}", server_url, e)))?;
        if !matches!(server_url.scheme(), "http" | "https") {
            return Err(ClientError::ConfigError(format!(
                "unsupported url scheme: {}",
                server_url.scheme()
            )));
        }

        let principal = ParticipantId::new(principal)
            .map_err(|e| ClientError::ConfigError(e.to_string()))?;

        let config_dir = match config_dir {
            Some(dir) => dir,
            None => default_config_dir()?,
        };

        Ok(ClientConfig {
            server_url,
            principal,
            sync: SyncConfig::default(),
            config_dir,
        })
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Server base URL without a trailing slash
    pub fn base_url(&self) -> String {
        self.server_url.as_str().trim_end_matches('/').to_string()
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new()
        .ok_or_else(|| ClientError::ConfigError("Failed to get home directory".to_string()))?;
    Ok(base_dirs.home_dir().join(DEFAULT_DIR_NAME))
}
