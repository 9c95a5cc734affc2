/// Directory store layer.
/// Holds conversations, messages, call history and profiles in memory and
/// enforces the business rules whose rejection messages clients match on.

pub mod models;

use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use models::{
    CallLogEntry, Conversation, Message, MessageReply, RecordCallRequest, UserProfile,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Separator between the two principals of a conversation id
pub const SEPARATOR: char = ':';

pub const MIN_SEARCH_LEN: usize = 3;
const MAX_SEARCH_RESULTS: usize = 50;
const RESTRICTED_TERMS: &[&str] = &["admin", "root", "system", "moderator", "support"];

/// Whole directory state, guarded by a single lock
#[derive(Debug, Default)]
pub struct DirectoryState {
    conversations: BTreeMap<String, Conversation>,
    /// principal -> conversation ids, in the order they were added
    memberships: HashMap<String, Vec<String>>,
    messages: HashMap<String, Vec<Message>>,
    /// call id -> (owner principal, entry)
    calls: BTreeMap<u64, (String, CallLogEntry)>,
    next_call_id: u64,
    profiles: HashMap<String, UserProfile>,
    last_timestamp: u64,
}

impl DirectoryState {
    /// Strictly increasing nanosecond clock, so two writes never share a stamp
    fn next_timestamp(&mut self) -> u64 {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn conversation_for(&self, caller: &str, conversation_id: &str) -> StoreResult<&Conversation> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| StoreError::NotFound("Conversation not found".to_string()))?;

        let (a, b) = &conversation.participants;
        if a != caller && b != caller {
            return Err(StoreError::Unauthorized(
                "caller is not a participant of this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }

    fn username_taken(&self, username: &str, except: &str) -> bool {
        self.profiles
            .values()
            .any(|p| p.principal != except && p.username.eq_ignore_ascii_case(username))
    }
}

pub type StorePool = Arc<Mutex<DirectoryState>>;

/// Create an empty store
pub fn create_pool() -> StorePool {
    Arc::new(Mutex::new(DirectoryState::default()))
}

/// Split a conversation id into its two principals.
/// The id must be canonical: exactly one separator, two distinct non-empty
/// halves, lexicographically ordered.
pub fn split_conversation_id(conversation_id: &str) -> StoreResult<(String, String)> {
    let mut parts = conversation_id.split(SEPARATOR);
    let (a, b) = match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => (a, b),
        _ => {
            return Err(StoreError::Invalid(format!(
                "Invalid conversation id: {}",
                conversation_id
            )))
        }
    };

    if a >= b {
        return Err(StoreError::Invalid(format!(
            "Conversation id is not canonical: {}",
            conversation_id
        )));
    }

    Ok((a.to_string(), b.to_string()))
}

pub fn validate_username(username: &str) -> StoreResult<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(StoreError::Invalid(
            "Username must be between 3 and 32 characters".to_string(),
        ));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::Invalid(
            "Username cannot contain special characters".to_string(),
        ));
    }
    let lowered = username.to_ascii_lowercase();
    if RESTRICTED_TERMS.iter().any(|term| lowered.contains(term)) {
        return Err(StoreError::Invalid(
            "Username cannot include restricted terms".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_display_name(display_name: &str) -> StoreResult<()> {
    let len = display_name.trim().chars().count();
    if !(1..=32).contains(&len) {
        return Err(StoreError::Invalid(
            "Display name must be between 1 and 32 characters".to_string(),
        ));
    }
    Ok(())
}

/// Store operations
pub struct Directory;

impl Directory {
    /// Conversation ids the caller participates in
    pub async fn list_conversations(pool: &StorePool, caller: &str) -> StoreResult<Vec<String>> {
        let state = pool.lock().await;
        Ok(state.memberships.get(caller).cloned().unwrap_or_default())
    }

    /// Open a conversation between the caller and the other half of the id
    pub async fn add_conversation(
        pool: &StorePool,
        caller: &str,
        conversation_id: &str,
    ) -> StoreResult<Conversation> {
        let (a, b) = split_conversation_id(conversation_id)?;
        if a != caller && b != caller {
            return Err(StoreError::Unauthorized(
                "caller is not a participant of this conversation".to_string(),
            ));
        }

        let mut state = pool.lock().await;
        if state.conversations.contains_key(conversation_id) {
            return Err(StoreError::AlreadyExists(
                "Conversation already exists".to_string(),
            ));
        }

        let conversation = Conversation {
            id: conversation_id.to_string(),
            participants: (a.clone(), b.clone()),
            originator: caller.to_string(),
            next_message_id: 1,
        };
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        for participant in [a, b] {
            state
                .memberships
                .entry(participant)
                .or_default()
                .push(conversation.id.clone());
        }
        state.messages.insert(conversation.id.clone(), Vec::new());

        log::info!("Conversation {} opened by {}", conversation.id, caller);
        Ok(conversation)
    }

    /// Remove a conversation the caller started, for both participants
    pub async fn remove_conversation(
        pool: &StorePool,
        caller: &str,
        conversation_id: &str,
    ) -> StoreResult<()> {
        let mut state = pool.lock().await;

        let owned = state.memberships.get(caller).map(Vec::as_slice).unwrap_or(&[]);
        if owned.is_empty() {
            return Err(StoreError::NotFound(
                "No conversations found for this caller".to_string(),
            ));
        }
        if !owned.iter().any(|id| id == conversation_id) {
            return Err(StoreError::NotFound("Conversation not found".to_string()));
        }

        let conversation = state.conversation_for(caller, conversation_id)?;
        if conversation.originator != caller {
            return Err(StoreError::Unauthorized(
                "Only the participant who started this conversation can remove it".to_string(),
            ));
        }
        let (a, b) = conversation.participants.clone();

        state.conversations.remove(conversation_id);
        state.messages.remove(conversation_id);
        for participant in [a, b] {
            if let Some(ids) = state.memberships.get_mut(&participant) {
                ids.retain(|id| id != conversation_id);
            }
        }

        log::info!("Conversation {} removed by {}", conversation_id, caller);
        Ok(())
    }

    /// Messages of a conversation, ascending by id
    pub async fn list_messages(
        pool: &StorePool,
        caller: &str,
        conversation_id: &str,
    ) -> StoreResult<Vec<Message>> {
        let state = pool.lock().await;
        state.conversation_for(caller, conversation_id)?;
        Ok(state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Append a message and return its server-assigned id and timestamp
    pub async fn send_message(
        pool: &StorePool,
        caller: &str,
        conversation_id: &str,
        sender: &str,
        text: &str,
    ) -> StoreResult<MessageReply> {
        if text.trim().is_empty() {
            return Err(StoreError::Invalid(
                "Message text cannot be empty".to_string(),
            ));
        }
        if sender != caller {
            return Err(StoreError::Unauthorized(
                "sender does not match caller".to_string(),
            ));
        }

        let mut state = pool.lock().await;
        state.conversation_for(caller, conversation_id)?;
        let timestamp = state.next_timestamp();

        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound("Conversation not found".to_string()))?;
        let message_id = conversation.next_message_id;
        conversation.next_message_id += 1;

        state
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(Message {
                message_id,
                conversation_id: conversation_id.to_string(),
                sender: sender.to_string(),
                text: text.to_string(),
                timestamp,
            });

        Ok(MessageReply {
            message_id,
            timestamp,
        })
    }

    /// Record a finished call in the caller's history
    pub async fn record_call(
        pool: &StorePool,
        caller: &str,
        req: &RecordCallRequest,
    ) -> StoreResult<CallLogEntry> {
        let mut state = pool.lock().await;
        state.next_call_id += 1;
        let entry = CallLogEntry {
            id: state.next_call_id,
            from_user: req.from_user.clone(),
            to_user: req.to_user.clone(),
            call_type: req.call_type,
            duration: req.duration,
            notes: req.notes.clone(),
            timestamp: state.next_timestamp(),
        };
        state
            .calls
            .insert(entry.id, (caller.to_string(), entry.clone()));
        Ok(entry)
    }

    /// Call history of the caller, ascending by id
    pub async fn get_call_history(
        pool: &StorePool,
        caller: &str,
    ) -> StoreResult<Vec<CallLogEntry>> {
        let state = pool.lock().await;
        Ok(state
            .calls
            .values()
            .filter(|(owner, _)| owner == caller)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    pub async fn delete_call_entry(pool: &StorePool, caller: &str, call_id: u64) -> StoreResult<()> {
        let mut state = pool.lock().await;
        let owned = matches!(state.calls.get(&call_id), Some((owner, _)) if owner == caller);
        if !owned {
            return Err(StoreError::NotFound("Call entry not found".to_string()));
        }
        state.calls.remove(&call_id);
        Ok(())
    }

    pub async fn get_profile(pool: &StorePool, principal: &str) -> StoreResult<Option<UserProfile>> {
        let state = pool.lock().await;
        Ok(state.profiles.get(principal).cloned())
    }

    /// Create the caller's profile; one per principal, usernames unique
    pub async fn create_profile(
        pool: &StorePool,
        caller: &str,
        username: &str,
        display_name: &str,
    ) -> StoreResult<UserProfile> {
        let mut state = pool.lock().await;
        if state.profiles.contains_key(caller) {
            return Err(StoreError::AlreadyExists(
                "Profile already exists for this caller".to_string(),
            ));
        }
        validate_username(username)?;
        validate_display_name(display_name)?;
        if state.username_taken(username, caller) {
            return Err(StoreError::AlreadyExists(
                "Username already exists".to_string(),
            ));
        }

        let profile = UserProfile {
            principal: caller.to_string(),
            username: username.to_string(),
            display_name: display_name.trim().to_string(),
        };
        state.profiles.insert(caller.to_string(), profile.clone());

        log::info!("Profile @{} created for {}", username, caller);
        Ok(profile)
    }

    /// Update username and/or display name of the caller's profile
    pub async fn update_profile(
        pool: &StorePool,
        caller: &str,
        username: Option<&str>,
        display_name: Option<&str>,
    ) -> StoreResult<UserProfile> {
        let mut state = pool.lock().await;
        if !state.profiles.contains_key(caller) {
            return Err(StoreError::NotFound("Profile not found".to_string()));
        }

        if let Some(username) = username {
            validate_username(username)?;
            if state.username_taken(username, caller) {
                return Err(StoreError::AlreadyExists(
                    "Username already exists".to_string(),
                ));
            }
        }
        if let Some(display_name) = display_name {
            validate_display_name(display_name)?;
        }

        let profile = state
            .profiles
            .get_mut(caller)
            .ok_or_else(|| StoreError::NotFound("Profile not found".to_string()))?;
        if let Some(username) = username {
            profile.username = username.to_string();
        }
        if let Some(display_name) = display_name {
            profile.display_name = display_name.trim().to_string();
        }
        Ok(profile.clone())
    }

    /// Case-insensitive substring search over usernames and display names
    pub async fn search_users(pool: &StorePool, text: &str) -> StoreResult<Vec<UserProfile>> {
        let needle = text.trim().to_lowercase();
        if needle.chars().count() < MIN_SEARCH_LEN {
            return Err(StoreError::Invalid(
                "Search text must be at least 3 characters".to_string(),
            ));
        }

        let state = pool.lock().await;
        let mut results: Vec<UserProfile> = state
            .profiles
            .values()
            .filter(|p| {
                p.username.to_lowercase().contains(&needle)
                    || p.display_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| a.username.cmp(&b.username));
        results.truncate(MAX_SEARCH_RESULTS);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_conversation_id() {
        assert_eq!(
            split_conversation_id("p1:p2").unwrap(),
            ("p1".to_string(), "p2".to_string())
        );
        assert!(split_conversation_id("p2:p1").is_err());
        assert!(split_conversation_id("p1:p1").is_err());
        assert!(split_conversation_id("p1").is_err());
        assert!(split_conversation_id("a:b:c").is_err());
        assert!(split_conversation_id(":p2").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice_01").is_ok());
        assert_eq!(
            validate_username("al").unwrap_err().to_string(),
            "Username must be between 3 and 32 characters"
        );
        assert_eq!(
            validate_username("alice!").unwrap_err().to_string(),
            "Username cannot contain special characters"
        );
        assert_eq!(
            validate_username("SuperAdmin").unwrap_err().to_string(),
            "Username cannot include restricted terms"
        );
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Alice").is_ok());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"x".repeat(33)).is_err());
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let mut state = DirectoryState::default();
        let t1 = state.next_timestamp();
        let t2 = state.next_timestamp();
        assert!(t2 > t1);
    }

    #[tokio::test]
    async fn test_conversation_visible_to_both_participants() {
        let pool = create_pool();
        Directory::add_conversation(&pool, "p1", "p1:p2").await.unwrap();

        assert_eq!(
            Directory::list_conversations(&pool, "p1").await.unwrap(),
            vec!["p1:p2".to_string()]
        );
        assert_eq!(
            Directory::list_conversations(&pool, "p2").await.unwrap(),
            vec!["p1:p2".to_string()]
        );
    }
}
