/// Error types for the duochat client.
/// Provides comprehensive error handling for all client operations.

use crate::mutation::Rejection;
use crate::remote::RemoteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed conversation id: {0}")]
    MalformedId(String),

    #[error("{participant} is not a participant of conversation {conversation}")]
    NotAParticipant {
        conversation: String,
        participant: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Mutation already in progress: {0}")]
    MutationInProgress(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Rejected(Rejection),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Error taxonomy used to decide how a failure is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Remote unreachable or timed out
    Transport,
    /// Rejected locally before any remote call
    Validation,
    /// Remote business-rule violation
    DomainRejection,
    /// Another mutation for the same key is still pending
    Contention,
    /// Local configuration or IO failure
    Local,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::InvalidArgument(_)
            | ClientError::MalformedId(_)
            | ClientError::NotAParticipant { .. }
            | ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::Rejected(_) => ErrorKind::DomainRejection,
            ClientError::MutationInProgress(_) => ErrorKind::Contention,
            ClientError::ConfigError(_)
            | ClientError::IoError(_)
            | ClientError::JsonError(_) => ErrorKind::Local,
        }
    }

    /// True for failures shown as a passing notice rather than an error
    pub fn is_notice(&self) -> bool {
        self.kind() == ErrorKind::Contention
    }
}

impl From<RemoteError> for ClientError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(msg) => ClientError::Transport(msg),
            RemoteError::Rejected(msg) => {
                ClientError::Rejected(Rejection::unclassified(msg))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::MalformedId("p1".to_string());
        assert!(err.to_string().contains("Malformed conversation id"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let client_err: ClientError = io_err.into();
        assert!(client_err.to_string().contains("IO error"));
        assert_eq!(client_err.kind(), ErrorKind::Local);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ClientError::Transport("timeout".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            ClientError::Validation("short".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ClientError::ConfigError("bad url".into()).kind(),
            ErrorKind::Local
        );
        assert!(ClientError::MutationInProgress("call 42".into()).is_notice());
        assert!(!ClientError::Transport("timeout".into()).is_notice());
    }

    #[test]
    fn test_remote_error_conversion() {
        let err: ClientError = RemoteError::Transport("connection refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err: ClientError = RemoteError::Rejected("Profile not found".into()).into();
        assert_eq!(err.kind(), ErrorKind::DomainRejection);
        assert!(err.to_string().contains("Profile not found"));
    }
}
