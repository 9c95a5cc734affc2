/// Data models for the directory store.
/// Represents conversations, messages, call log entries, and profiles,
/// plus the request/response DTOs exchanged over HTTP.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub participants: (String, String),
    /// Principal that added the conversation; only it may remove it
    pub originator: String,
    pub next_message_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub message_id: u64,
    pub conversation_id: String,
    pub sender: String,
    pub text: String,
    /// Nanoseconds since the Unix epoch
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Audio,
    Webcam,
    Stream,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallLogEntry {
    pub id: u64,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub call_type: CallType,
    pub duration: u64,
    pub notes: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub principal: String,
    pub username: String,
    pub display_name: String,
}

// Request/Response DTOs
#[derive(Debug, Serialize, Deserialize)]
pub struct AddConversationRequest {
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageReply {
    pub message_id: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordCallRequest {
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub call_type: CallType,
    pub duration: u64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProfileRequest {
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}
