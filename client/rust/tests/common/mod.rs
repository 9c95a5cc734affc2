//! Common test utilities and helpers for integration tests
//! Binds the client to the directory server's in-memory store, with call
//! counting, injected latency and injected transport failures.

#![allow(dead_code)]

use async_trait::async_trait;
use duochat_client::config::SyncConfig;
use duochat_client::identity::{ConversationId, ParticipantId};
use duochat_client::models::{
    CallLogEntry, CallRecord, CallType, Message, MessageReply, ProfileUpdate, SearchQuery,
    UserProfile,
};
use duochat_client::remote::{RemoteError, RemoteResult, RemoteStore};
use duochat_client::DirectoryClient;
use duochat_server::store::models::{self as wire, RecordCallRequest};
use duochat_server::store::{create_pool, Directory, StorePool};
use duochat_server::StoreError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn pid(id: &str) -> ParticipantId {
    ParticipantId::new(id).expect("valid participant id")
}

pub fn chat(a: &str, b: &str) -> ConversationId {
    ConversationId::canonicalize(&pid(a), &pid(b)).expect("distinct participants")
}

/// Let spawned driver tasks run without moving the paused clock far
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn rejected(err: StoreError) -> RemoteError {
    RemoteError::Rejected(err.to_string())
}

fn transport(err: impl std::fmt::Display) -> RemoteError {
    RemoteError::Transport(err.to_string())
}

fn call_type_to_wire(call_type: CallType) -> wire::CallType {
    match call_type {
        CallType::Audio => wire::CallType::Audio,
        CallType::Webcam => wire::CallType::Webcam,
        CallType::Stream => wire::CallType::Stream,
    }
}

fn call_from_wire(entry: wire::CallLogEntry) -> CallLogEntry {
    CallLogEntry {
        id: entry.id,
        from_user: entry.from_user,
        to_user: entry.to_user,
        call_type: match entry.call_type {
            wire::CallType::Audio => CallType::Audio,
            wire::CallType::Webcam => CallType::Webcam,
            wire::CallType::Stream => CallType::Stream,
        },
        duration_seconds: entry.duration,
        notes: entry.notes,
        timestamp_nanos: entry.timestamp,
    }
}

fn profile_from_wire(profile: wire::UserProfile) -> RemoteResult<UserProfile> {
    Ok(UserProfile {
        principal: ParticipantId::new(profile.principal).map_err(transport)?,
        username: profile.username,
        display_name: profile.display_name,
    })
}

/// `RemoteStore` over the server's in-memory directory, acting as one principal
pub struct DirectoryAdapter {
    principal: ParticipantId,
    pool: StorePool,
    latency: Duration,
    offline: AtomicBool,
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl DirectoryAdapter {
    pub fn new(pool: &StorePool, principal: &str) -> Self {
        DirectoryAdapter {
            principal: pid(principal),
            pool: pool.clone(),
            latency: Duration::ZERO,
            offline: AtomicBool::new(false),
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Every call sleeps this long before reaching the store
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every call fail as a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of calls issued for an operation, including failed ones
    pub fn count(&self, operation: &str) -> usize {
        self.counts.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    async fn enter(&self, operation: &'static str) -> RemoteResult<()> {
        *self.counts.lock().unwrap().entry(operation).or_insert(0) += 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn caller(&self) -> &str {
        self.principal.as_str()
    }
}

#[async_trait]
impl RemoteStore for DirectoryAdapter {
    fn principal(&self) -> &ParticipantId {
        &self.principal
    }

    async fn list_conversations(&self) -> RemoteResult<Vec<ConversationId>> {
        self.enter("list_conversations").await?;
        let ids = Directory::list_conversations(&self.pool, self.caller())
            .await
            .map_err(rejected)?;
        ids.iter()
            .map(|id| ConversationId::parse(id).map_err(transport))
            .collect()
    }

    async fn add_conversation(&self, conversation_id: &ConversationId) -> RemoteResult<()> {
        self.enter("add_conversation").await?;
        Directory::add_conversation(&self.pool, self.caller(), conversation_id.as_str())
            .await
            .map(|_| ())
            .map_err(rejected)
    }

    async fn remove_conversation(&self, conversation_id: &ConversationId) -> RemoteResult<()> {
        self.enter("remove_conversation").await?;
        Directory::remove_conversation(&self.pool, self.caller(), conversation_id.as_str())
            .await
            .map_err(rejected)
    }

    async fn list_messages(&self, conversation_id: &ConversationId) -> RemoteResult<Vec<Message>> {
        self.enter("list_messages").await?;
        let messages = Directory::list_messages(&self.pool, self.caller(), conversation_id.as_str())
            .await
            .map_err(rejected)?;
        messages
            .into_iter()
            .map(|m| {
                Ok(Message::from_server(
                    m.message_id,
                    ConversationId::parse(&m.conversation_id).map_err(transport)?,
                    ParticipantId::new(m.sender).map_err(transport)?,
                    m.text,
                    m.timestamp,
                ))
            })
            .collect()
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        sender: &ParticipantId,
        text: &str,
    ) -> RemoteResult<MessageReply> {
        self.enter("send_message").await?;
        let reply = Directory::send_message(
            &self.pool,
            self.caller(),
            conversation_id.as_str(),
            sender.as_str(),
            text,
        )
        .await
        .map_err(rejected)?;
        Ok(MessageReply {
            message_id: reply.message_id,
            timestamp_nanos: reply.timestamp,
        })
    }

    async fn get_call_history(&self) -> RemoteResult<Vec<CallLogEntry>> {
        self.enter("get_call_history").await?;
        let calls = Directory::get_call_history(&self.pool, self.caller())
            .await
            .map_err(rejected)?;
        Ok(calls.into_iter().map(call_from_wire).collect())
    }

    async fn record_call(&self, record: &CallRecord) -> RemoteResult<CallLogEntry> {
        self.enter("record_call").await?;
        let request = RecordCallRequest {
            from_user: record.from_user.clone(),
            to_user: record.to_user.clone(),
            call_type: call_type_to_wire(record.call_type),
            duration: record.duration_seconds,
            notes: record.notes.clone(),
        };
        let entry = Directory::record_call(&self.pool, self.caller(), &request)
            .await
            .map_err(rejected)?;
        Ok(call_from_wire(entry))
    }

    async fn delete_call_entry(&self, call_id: u64) -> RemoteResult<()> {
        self.enter("delete_call_entry").await?;
        Directory::delete_call_entry(&self.pool, self.caller(), call_id)
            .await
            .map_err(rejected)
    }

    async fn get_profile(&self, principal: &ParticipantId) -> RemoteResult<Option<UserProfile>> {
        self.enter("get_profile").await?;
        let profile = Directory::get_profile(&self.pool, principal.as_str())
            .await
            .map_err(rejected)?;
        profile.map(profile_from_wire).transpose()
    }

    async fn create_profile(&self, username: &str, display_name: &str) -> RemoteResult<UserProfile> {
        self.enter("create_profile").await?;
        let profile = Directory::create_profile(&self.pool, self.caller(), username, display_name)
            .await
            .map_err(rejected)?;
        profile_from_wire(profile)
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> RemoteResult<UserProfile> {
        self.enter("update_profile").await?;
        let profile = Directory::update_profile(
            &self.pool,
            self.caller(),
            update.username.as_deref(),
            update.display_name.as_deref(),
        )
        .await
        .map_err(rejected)?;
        profile_from_wire(profile)
    }

    async fn search_users(&self, query: &SearchQuery) -> RemoteResult<Vec<UserProfile>> {
        self.enter("search_users").await?;
        let results = Directory::search_users(&self.pool, query.as_str())
            .await
            .map_err(rejected)?;
        results.into_iter().map(profile_from_wire).collect()
    }
}

/// Shared store plus one client per principal
pub struct TestDirectory {
    pub pool: StorePool,
}

impl Default for TestDirectory {
    fn default() -> Self {
        TestDirectory {
            pool: create_pool(),
        }
    }
}

impl TestDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adapter(&self, principal: &str) -> Arc<DirectoryAdapter> {
        Arc::new(DirectoryAdapter::new(&self.pool, principal))
    }

    pub fn slow_adapter(&self, principal: &str, latency: Duration) -> Arc<DirectoryAdapter> {
        Arc::new(DirectoryAdapter::new(&self.pool, principal).with_latency(latency))
    }

    /// Client for `principal` together with its adapter, for call counting
    pub fn client(&self, principal: &str) -> (DirectoryClient, Arc<DirectoryAdapter>) {
        let adapter = self.adapter(principal);
        (client_over(adapter.clone()), adapter)
    }

    /// Open a conversation directly in the store, started by `originator`
    pub async fn seed_conversation(&self, originator: &str, other: &str) -> ConversationId {
        let id = chat(originator, other);
        Directory::add_conversation(&self.pool, originator, id.as_str())
            .await
            .expect("seed conversation");
        id
    }

    pub async fn seed_message(&self, sender: &str, id: &ConversationId, text: &str) {
        Directory::send_message(&self.pool, sender, id.as_str(), sender, text)
            .await
            .expect("seed message");
    }

    pub async fn seed_calls(&self, caller: &str, count: usize) {
        for i in 0..count {
            let request = RecordCallRequest {
                from_user: Some(caller.to_string()),
                to_user: Some(format!("peer{}", i)),
                call_type: wire::CallType::Audio,
                duration: 30,
                notes: String::new(),
            };
            Directory::record_call(&self.pool, caller, &request)
                .await
                .expect("seed call");
        }
    }

    pub async fn seed_profile(&self, principal: &str, username: &str, display_name: &str) {
        Directory::create_profile(&self.pool, principal, username, display_name)
            .await
            .expect("seed profile");
    }
}

pub fn client_over(adapter: Arc<DirectoryAdapter>) -> DirectoryClient {
    DirectoryClient::new(adapter, SyncConfig::default())
}
