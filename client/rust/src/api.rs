//! Server API client for REST endpoints
//!
//! Binds the remote directory boundary to the directory server's HTTP
//! routes. Every request carries the caller principal in a header.

use crate::error::{ClientError, Result};
use crate::identity::{ConversationId, ParticipantId};
use crate::models::{
    CallLogEntry, CallRecord, CallType, Message, MessageReply, ProfileUpdate, SearchQuery,
    UserProfile,
};
use crate::remote::{RemoteError, RemoteResult, RemoteStore};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the caller principal
pub const PRINCIPAL_HEADER: &str = "x-principal";

/// Server API client
pub struct ServerApi {
    client: Client,
    base_url: String,
    principal: ParticipantId,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct AddConversationRequest<'a> {
    conversation_id: &'a str,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    sender: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct MessageReplyResponse {
    message_id: u64,
    timestamp: u64,
}

#[derive(Deserialize)]
struct MessageResponse {
    message_id: u64,
    conversation_id: String,
    sender: String,
    text: String,
    timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct CallLogEntryWire {
    #[serde(default, skip_serializing)]
    id: u64,
    from_user: Option<String>,
    to_user: Option<String>,
    call_type: CallType,
    duration: u64,
    #[serde(default)]
    notes: String,
    #[serde(default, skip_serializing)]
    timestamp: u64,
}

#[derive(Deserialize)]
struct ProfileResponse {
    principal: String,
    username: String,
    display_name: String,
}

#[derive(Serialize)]
struct CreateProfileRequest<'a> {
    username: &'a str,
    display_name: &'a str,
}

impl From<CallLogEntryWire> for CallLogEntry {
    fn from(wire: CallLogEntryWire) -> Self {
        CallLogEntry {
            id: wire.id,
            from_user: wire.from_user,
            to_user: wire.to_user,
            call_type: wire.call_type,
            duration_seconds: wire.duration,
            notes: wire.notes,
            timestamp_nanos: wire.timestamp,
        }
    }
}

impl TryFrom<ProfileResponse> for UserProfile {
    type Error = ClientError;

    fn try_from(wire: ProfileResponse) -> Result<Self> {
        Ok(UserProfile {
            principal: ParticipantId::new(wire.principal)?,
            username: wire.username,
            display_name: wire.display_name,
        })
    }
}

impl ServerApi {
    /// Create a new server API client issuing requests as `principal`
    pub fn new(base_url: &str, principal: ParticipantId, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            principal,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(PRINCIPAL_HEADER, self.principal.as_str())
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorized(request).send().await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }

    /// Check if the server is healthy
    pub async fn health_check(&self) -> RemoteResult<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        check_status(response).await.map(|_| ())
    }
}

/// Split a response into success, domain rejection or transport failure
async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body).ok().map(|b| b.error);
    match message {
        Some(message) if status.is_client_error() => Err(RemoteError::Rejected(message)),
        Some(message) => Err(RemoteError::Transport(format!("{}: {}", status, message))),
        None => Err(RemoteError::Transport(format!("{}: {}", status, body))),
    }
}

fn message_from_wire(wire: MessageResponse) -> Result<Message> {
    Ok(Message::from_server(
        wire.message_id,
        ConversationId::parse(&wire.conversation_id)?,
        ParticipantId::new(wire.sender)?,
        wire.text,
        wire.timestamp,
    ))
}

fn profile_or_skip(wire: ProfileResponse) -> Option<UserProfile> {
    match UserProfile::try_from(wire) {
        Ok(profile) => Some(profile),
        Err(e) => {
            log::warn!("Skipping malformed profile from server: {}", e);
            None
        }
    }
}

#[async_trait]
impl RemoteStore for ServerApi {
    fn principal(&self) -> &ParticipantId {
        &self.principal
    }

    async fn list_conversations(&self) -> RemoteResult<Vec<ConversationId>> {
        let ids: Vec<String> = self
            .send_json(self.client.get(self.url("/conversations")))
            .await?;
        Ok(ids
            .into_iter()
            .filter_map(|id| match ConversationId::parse(&id) {
                Ok(id) => Some(id),
                Err(e) => {
                    log::warn!("Skipping malformed conversation id from server: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn add_conversation(&self, conversation_id: &ConversationId) -> RemoteResult<()> {
        let request = AddConversationRequest {
            conversation_id: conversation_id.as_str(),
        };
        self.send(self.client.post(self.url("/conversations")).json(&request))
            .await?;
        log::info!("Conversation {} opened", conversation_id);
        Ok(())
    }

    async fn remove_conversation(&self, conversation_id: &ConversationId) -> RemoteResult<()> {
        self.send(
            self.client
                .delete(self.url(&format!("/conversations/{}", conversation_id))),
        )
        .await?;
        log::info!("Conversation {} removed", conversation_id);
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &ConversationId) -> RemoteResult<Vec<Message>> {
        let wire: Vec<MessageResponse> = self
            .send_json(
                self.client
                    .get(self.url(&format!("/conversations/{}/messages", conversation_id))),
            )
            .await?;
        Ok(wire
            .into_iter()
            .filter_map(|m| match message_from_wire(m) {
                Ok(message) => Some(message),
                Err(e) => {
                    log::warn!("Skipping malformed message in {}: {}", conversation_id, e);
                    None
                }
            })
            .collect())
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        sender: &ParticipantId,
        text: &str,
    ) -> RemoteResult<MessageReply> {
        let request = SendMessageRequest {
            sender: sender.as_str(),
            text,
        };
        let reply: MessageReplyResponse = self
            .send_json(
                self.client
                    .post(self.url(&format!("/conversations/{}/messages", conversation_id)))
                    .json(&request),
            )
            .await?;
        Ok(MessageReply {
            message_id: reply.message_id,
            timestamp_nanos: reply.timestamp,
        })
    }

    async fn get_call_history(&self) -> RemoteResult<Vec<CallLogEntry>> {
        let wire: Vec<CallLogEntryWire> = self.send_json(self.client.get(self.url("/calls"))).await?;
        Ok(wire.into_iter().map(CallLogEntry::from).collect())
    }

    async fn record_call(&self, record: &CallRecord) -> RemoteResult<CallLogEntry> {
        let request = CallLogEntryWire {
            id: 0,
            from_user: record.from_user.clone(),
            to_user: record.to_user.clone(),
            call_type: record.call_type,
            duration: record.duration_seconds,
            notes: record.notes.clone(),
            timestamp: 0,
        };
        let entry: CallLogEntryWire = self
            .send_json(self.client.post(self.url("/calls")).json(&request))
            .await?;
        Ok(entry.into())
    }

    async fn delete_call_entry(&self, call_id: u64) -> RemoteResult<()> {
        self.send(self.client.delete(self.url(&format!("/calls/{}", call_id))))
            .await?;
        Ok(())
    }

    async fn get_profile(&self, principal: &ParticipantId) -> RemoteResult<Option<UserProfile>> {
        let wire: Option<ProfileResponse> = self
            .send_json(self.client.get(self.url(&format!("/profiles/{}", principal))))
            .await?;
        Ok(wire.and_then(profile_or_skip))
    }

    async fn create_profile(
        &self,
        username: &str,
        display_name: &str,
    ) -> RemoteResult<UserProfile> {
        let request = CreateProfileRequest {
            username,
            display_name,
        };
        let wire: ProfileResponse = self
            .send_json(self.client.post(self.url("/profile")).json(&request))
            .await?;
        UserProfile::try_from(wire).map_err(|e| RemoteError::Transport(e.to_string()))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> RemoteResult<UserProfile> {
        let wire: ProfileResponse = self
            .send_json(self.client.patch(self.url("/profile")).json(update))
            .await?;
        UserProfile::try_from(wire).map_err(|e| RemoteError::Transport(e.to_string()))
    }

    async fn search_users(&self, query: &SearchQuery) -> RemoteResult<Vec<UserProfile>> {
        let wire: Vec<ProfileResponse> = self
            .send_json(
                self.client
                    .get(self.url("/users/search"))
                    .query(&[("q", query.as_str())]),
            )
            .await?;
        Ok(wire.into_iter().filter_map(profile_or_skip).collect())
    }
}
