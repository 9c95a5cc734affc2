//! Remote directory boundary
//!
//! The authoritative store offers snapshot reads and request/response
//! mutations only. The caller's identity is bound to the implementation, so
//! none of these operations take it as an argument.

use crate::identity::{ConversationId, ParticipantId};
use crate::models::{
    CallLogEntry, CallRecord, Message, MessageReply, ProfileUpdate, SearchQuery, UserProfile,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Unreachable, timed out or failed on the server side
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Business-rule violation reported by the directory
    #[error("{0}")]
    Rejected(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Principal every request is issued as
    fn principal(&self) -> &ParticipantId;

    async fn list_conversations(&self) -> RemoteResult<Vec<ConversationId>>;

    async fn add_conversation(&self, conversation_id: &ConversationId) -> RemoteResult<()>;

    async fn remove_conversation(&self, conversation_id: &ConversationId) -> RemoteResult<()>;

    /// Messages ascending by id
    async fn list_messages(&self, conversation_id: &ConversationId) -> RemoteResult<Vec<Message>>;

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        sender: &ParticipantId,
        text: &str,
    ) -> RemoteResult<MessageReply>;

    async fn get_call_history(&self) -> RemoteResult<Vec<CallLogEntry>>;

    async fn record_call(&self, record: &CallRecord) -> RemoteResult<CallLogEntry>;

    async fn delete_call_entry(&self, call_id: u64) -> RemoteResult<()>;

    async fn get_profile(&self, principal: &ParticipantId) -> RemoteResult<Option<UserProfile>>;

    async fn create_profile(&self, username: &str, display_name: &str)
        -> RemoteResult<UserProfile>;

    async fn update_profile(&self, update: &ProfileUpdate) -> RemoteResult<UserProfile>;

    async fn search_users(&self, query: &SearchQuery) -> RemoteResult<Vec<UserProfile>>;
}
