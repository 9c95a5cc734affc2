/// Directory client
///
/// Consumer-facing entry point. Wires the remote boundary, the snapshot
/// cache, the scheduler and the mutation engine together. Consumers read
/// snapshots and issue mutations; they never write the cache directly.

use crate::api::ServerApi;
use crate::cache::SnapshotCache;
use crate::config::{ClientConfig, SyncConfig};
use crate::error::{ClientError, Result};
use crate::identity::{ConversationId, ParticipantId};
use crate::models::{
    CallLogEntry, CallRecord, ConversationSummary, MessageKind, ProfileUpdate, SearchQuery,
};
use crate::mutation::{Mutation, MutationEngine, MutationOutcome};
use crate::remote::RemoteStore;
use crate::resource::{ResourceKey, ResourceValue};
use crate::scheduler::{Scheduler, Subscription};
use std::sync::Arc;

/// What a consumer sees for a key at a given moment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Ready(ResourceValue),
    /// No value yet and no failure recorded
    Loading,
    /// No value and the last pull failed
    Failed(String),
}

impl Snapshot {
    pub fn value(&self) -> Option<&ResourceValue> {
        match self {
            Snapshot::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Snapshot::Loading)
    }
}

pub struct DirectoryClient {
    me: ParticipantId,
    remote: Arc<dyn RemoteStore>,
    cache: Arc<SnapshotCache>,
    scheduler: Scheduler,
    engine: MutationEngine,
}

impl DirectoryClient {
    /// Create a client over any remote binding
    pub fn new(remote: Arc<dyn RemoteStore>, sync: SyncConfig) -> Self {
        let cache = Arc::new(SnapshotCache::new());
        let scheduler = Scheduler::new(remote.clone(), cache.clone(), sync);
        let engine = MutationEngine::new(remote.clone(), cache.clone(), scheduler.clone());

        Self {
            me: remote.principal().clone(),
            remote,
            cache,
            scheduler,
            engine,
        }
    }

    /// Create a client talking HTTP to the configured directory server
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let api = ServerApi::new(
            &config.base_url(),
            config.principal.clone(),
            config.sync.request_timeout,
        )?;
        log::info!(
            "Directory client for {} using {}",
            config.principal,
            config.base_url()
        );
        Ok(Self::new(Arc::new(api), config.sync.clone()))
    }

    pub fn principal(&self) -> &ParticipantId {
        &self.me
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn subscribe(&self, key: ResourceKey) -> Subscription {
        self.scheduler.subscribe(key)
    }

    pub fn refresh(&self, key: &ResourceKey) {
        self.scheduler.refresh(key);
    }

    /// Current view of a key. A cached value always wins over a failure.
    pub fn current_value(&self, key: &ResourceKey) -> Snapshot {
        match self.cache.entry(key) {
            Some(entry) => match (entry.value, entry.last_error) {
                (Some(value), _) => Snapshot::Ready(value),
                (None, Some(error)) => Snapshot::Failed(error),
                (None, None) => Snapshot::Loading,
            },
            None => Snapshot::Loading,
        }
    }

    pub async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome> {
        self.engine.apply(mutation).await
    }

    /// Drop cached keys nobody is subscribed to, and eviction records old
    /// enough that no pull they guard against can still land
    pub fn evict_unobserved(&self) -> usize {
        let scheduler = &self.scheduler;
        let evicted = self.cache.evict_where(|key| scheduler.is_tracked(key));
        let pruned = self
            .cache
            .prune_tombstones(scheduler.sync_config().eviction_horizon());
        if evicted > 0 || pruned > 0 {
            log::debug!("Evicted {} unobserved keys, pruned {} tombstones", evicted, pruned);
        }
        evicted
    }

    pub fn conversations(&self) -> Subscription {
        self.subscribe(ResourceKey::Conversations(self.me.clone()))
    }

    pub fn messages(&self, conversation_id: &ConversationId) -> Subscription {
        self.subscribe(ResourceKey::Messages(conversation_id.clone()))
    }

    pub fn call_history(&self) -> Subscription {
        self.subscribe(ResourceKey::CallHistory)
    }

    pub fn profile(&self, principal: &ParticipantId) -> Subscription {
        self.subscribe(ResourceKey::Profile(principal.clone()))
    }

    /// Subscribe to a directory search. Short queries never leave the client.
    pub fn search_users(&self, text: &str) -> Result<Subscription> {
        let query = SearchQuery::new(text)?;
        Ok(self.subscribe(ResourceKey::UserSearch(query)))
    }

    /// Conversation list with handles resolved from cached profiles
    pub fn conversation_list(&self) -> Vec<ConversationSummary> {
        let key = ResourceKey::Conversations(self.me.clone());
        let mut list = self
            .cache
            .read(&key)
            .and_then(|v| v.as_conversations().map(<[_]>::to_vec))
            .unwrap_or_default();
        for summary in &mut list {
            let profile_key = ResourceKey::Profile(summary.other_participant.id.clone());
            if let Some(ResourceValue::Profile(Some(profile))) = self.cache.read(&profile_key) {
                summary.other_participant.display_handle = profile.handle();
            }
        }
        list
    }

    pub async fn start_conversation(
        &self,
        other: &ParticipantId,
    ) -> Result<(ConversationId, MutationOutcome)> {
        let id = ConversationId::canonicalize(&self.me, other)?;
        let outcome = self
            .mutate(Mutation::AddConversation {
                other: other.clone(),
            })
            .await?;
        Ok((id, outcome))
    }

    pub async fn remove_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<MutationOutcome> {
        self.mutate(Mutation::RemoveConversation {
            conversation_id: conversation_id.clone(),
        })
        .await
    }

    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<MutationOutcome> {
        self.mutate(Mutation::SendMessage {
            conversation_id: conversation_id.clone(),
            text: text.to_string(),
            kind: MessageKind::Text,
            media: None,
        })
        .await
    }

    pub async fn delete_call_entry(&self, call_id: u64) -> Result<MutationOutcome> {
        self.mutate(Mutation::DeleteCallEntry { call_id }).await
    }

    pub async fn create_profile(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<MutationOutcome> {
        self.mutate(Mutation::CreateProfile {
            username: username.to_string(),
            display_name: display_name.to_string(),
        })
        .await
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<MutationOutcome> {
        self.mutate(Mutation::UpdateProfile(update)).await
    }

    /// Forward a finished call to the directory, then refresh the history
    pub async fn record_call(&self, record: &CallRecord) -> Result<CallLogEntry> {
        let result = self.remote.record_call(record).await;
        self.scheduler.refresh(&ResourceKey::CallHistory);
        result.map_err(ClientError::from)
    }
}
