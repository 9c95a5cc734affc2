//! Optimistic mutation engine
//!
//! A mutation is applied to the cache before the directory has answered,
//! then reconciled: on success the synthetic data is replaced with what the
//! directory assigned. On a genuine failure each patch is taken back: a key
//! nothing else touched meanwhile gets its exact pre-image, a key shared with
//! other pending mutations only loses this mutation's own entry. Affected
//! keys are force-refreshed in every case.

use crate::cache::{Patch, SnapshotCache};
use crate::error::{ClientError, Result};
use crate::identity::{ConversationId, ParticipantId};
use crate::models::{
    sort_messages, user, ConversationSummary, MediaAttachment, Message, MessageId, MessageKind,
    MessagePreview, MessageReply, ProfileUpdate, UserProfile,
};
use crate::remote::{RemoteError, RemoteStore};
use crate::resource::{ResourceKey, ResourceValue};
use crate::scheduler::Scheduler;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    AddConversation,
    RemoveConversation,
    SendMessage,
    DeleteCallEntry,
    CreateProfile,
    UpdateProfile,
}

impl MutationKind {
    fn is_profile(self) -> bool {
        matches!(self, MutationKind::CreateProfile | MutationKind::UpdateProfile)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Open a conversation with another participant
    AddConversation { other: ParticipantId },
    RemoveConversation { conversation_id: ConversationId },
    SendMessage {
        conversation_id: ConversationId,
        text: String,
        kind: MessageKind,
        media: Option<MediaAttachment>,
    },
    DeleteCallEntry { call_id: u64 },
    CreateProfile { username: String, display_name: String },
    UpdateProfile(ProfileUpdate),
}

impl Mutation {
    pub fn send_text(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Mutation::SendMessage {
            conversation_id,
            text: text.into(),
            kind: MessageKind::Text,
            media: None,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::AddConversation { .. } => MutationKind::AddConversation,
            Mutation::RemoveConversation { .. } => MutationKind::RemoveConversation,
            Mutation::SendMessage { .. } => MutationKind::SendMessage,
            Mutation::DeleteCallEntry { .. } => MutationKind::DeleteCallEntry,
            Mutation::CreateProfile { .. } => MutationKind::CreateProfile,
            Mutation::UpdateProfile(_) => MutationKind::UpdateProfile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Confirmed,
    /// The message as confirmed by the directory
    Sent(Message),
    /// The directory reported the desired state was already in place
    AlreadySatisfied(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Desired state already holds; treated as success
    BenignDuplicate,
    Genuine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    NotOriginator,
    NoConversations,
    UsernameTaken,
    DisplayNameLength,
    UsernameLength,
    RestrictedTerms,
    NotFound,
    Other,
}

impl RejectionReason {
    /// Case-insensitive substring match, first rule wins
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("started") {
            RejectionReason::NotOriginator
        } else if lower.contains("no conversations") {
            RejectionReason::NoConversations
        } else if lower.contains("username already exists") {
            RejectionReason::UsernameTaken
        } else if lower.contains("display name must be between 1 and 32") {
            RejectionReason::DisplayNameLength
        } else if lower.contains("must be between 3 and 32") {
            RejectionReason::UsernameLength
        } else if lower.contains("cannot include") || lower.contains("cannot contain") {
            RejectionReason::RestrictedTerms
        } else if lower.contains("not found") {
            RejectionReason::NotFound
        } else {
            RejectionReason::Other
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            RejectionReason::NotOriginator => {
                "Only the participant who started this conversation can remove it"
            }
            RejectionReason::NoConversations => "You have no conversations yet",
            RejectionReason::UsernameTaken => "That username is already taken",
            RejectionReason::DisplayNameLength => {
                "Display name must be between 1 and 32 characters"
            }
            RejectionReason::UsernameLength => "Username must be between 3 and 32 characters",
            RejectionReason::RestrictedTerms => {
                "Username contains restricted terms or special characters"
            }
            RejectionReason::NotFound => "It no longer exists",
            RejectionReason::Other => "The directory rejected the request",
        }
    }
}

/// A classified refusal from the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: RejectionReason,
    pub message: String,
}

impl Rejection {
    /// Rejection seen outside any mutation, e.g. on a direct read
    pub fn unclassified(message: String) -> Self {
        Rejection {
            kind: RejectionKind::Genuine,
            reason: RejectionReason::from_message(&message),
            message,
        }
    }

    pub fn is_benign(&self) -> bool {
        self.kind == RejectionKind::BenignDuplicate
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason.user_message(), self.message)
    }
}

/// Classify a remote rejection of a mutation of `kind`
pub fn classify(kind: MutationKind, message: &str) -> Rejection {
    let lower = message.to_lowercase();
    let username_collision = kind.is_profile() && lower.contains("username already exists");

    let benign = (lower.contains("already exists") && !username_collision)
        || (kind == MutationKind::AddConversation && lower.contains("unauthorized"));

    if benign {
        Rejection {
            kind: RejectionKind::BenignDuplicate,
            reason: RejectionReason::Other,
            message: message.to_string(),
        }
    } else {
        Rejection {
            kind: RejectionKind::Genuine,
            reason: RejectionReason::from_message(message),
            message: message.to_string(),
        }
    }
}

type GuardKey = (MutationKind, String);

/// Holds a (kind, key) slot for the duration of one mutation
struct InFlightGuard {
    slots: Arc<Mutex<HashSet<GuardKey>>>,
    key: GuardKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Result of the remote call, before reconciliation
enum Dispatched {
    Done,
    Reply(MessageReply),
    Profile(UserProfile),
}

pub struct MutationEngine {
    me: ParticipantId,
    remote: Arc<dyn RemoteStore>,
    cache: Arc<SnapshotCache>,
    scheduler: Scheduler,
    in_flight: Arc<Mutex<HashSet<GuardKey>>>,
}

impl MutationEngine {
    pub fn new(remote: Arc<dyn RemoteStore>, cache: Arc<SnapshotCache>, scheduler: Scheduler) -> Self {
        MutationEngine {
            me: remote.principal().clone(),
            remote,
            cache,
            scheduler,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a mutation of `kind` on `target` is still pending
    pub fn is_in_flight(&self, kind: MutationKind, target: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(kind, target.to_string()))
    }

    fn acquire(&self, kind: MutationKind, target: String) -> Result<InFlightGuard> {
        let mut slots = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (kind, target);
        if !slots.insert(key.clone()) {
            return Err(ClientError::MutationInProgress(format!("{:?} {}", key.0, key.1)));
        }
        Ok(InFlightGuard {
            slots: self.in_flight.clone(),
            key,
        })
    }

    pub async fn apply(&self, mutation: Mutation) -> Result<MutationOutcome> {
        let kind = mutation.kind();
        let target = self.validate(&mutation)?;
        let _guard = self.acquire(kind, target)?;

        let affected = self.affected_keys(&mutation);
        let (provisional, patches) = self.patch(&mutation);

        let result = self.dispatch(&mutation).await;
        let outcome = match result {
            Ok(dispatched) => Ok(self.reconcile(&mutation, provisional, dispatched)),
            Err(RemoteError::Rejected(message)) => {
                let rejection = classify(kind, &message);
                if rejection.is_benign() {
                    log::info!("{:?} already satisfied: {}", kind, message);
                    Ok(MutationOutcome::AlreadySatisfied(message))
                } else {
                    log::warn!("{:?} rejected, rolling back: {}", kind, message);
                    self.rollback(&mutation, provisional.as_ref(), patches);
                    Err(ClientError::Rejected(rejection))
                }
            }
            Err(RemoteError::Transport(message)) => {
                log::warn!("{:?} failed in transport, rolling back: {}", kind, message);
                self.rollback(&mutation, provisional.as_ref(), patches);
                Err(ClientError::Transport(message))
            }
        };

        for key in &affected {
            self.scheduler.refresh(key);
        }
        outcome
    }

    /// Local checks; returns the in-flight guard target
    fn validate(&self, mutation: &Mutation) -> Result<String> {
        match mutation {
            Mutation::AddConversation { other } => {
                Ok(ConversationId::canonicalize(&self.me, other)?.to_string())
            }
            Mutation::RemoveConversation { conversation_id } => {
                conversation_id.other_participant(&self.me)?;
                Ok(conversation_id.to_string())
            }
            Mutation::SendMessage {
                conversation_id,
                text,
                ..
            } => {
                conversation_id.other_participant(&self.me)?;
                if text.trim().is_empty() {
                    return Err(ClientError::Validation(
                        "Message text cannot be empty".to_string(),
                    ));
                }
                Ok(conversation_id.to_string())
            }
            Mutation::DeleteCallEntry { call_id } => Ok(call_id.to_string()),
            Mutation::CreateProfile {
                username,
                display_name,
            } => {
                user::validate_username(username)?;
                user::validate_display_name(display_name)?;
                Ok(self.me.to_string())
            }
            Mutation::UpdateProfile(update) => {
                update.validate()?;
                Ok(self.me.to_string())
            }
        }
    }

    fn affected_keys(&self, mutation: &Mutation) -> Vec<ResourceKey> {
        let conversations = ResourceKey::Conversations(self.me.clone());
        match mutation {
            Mutation::AddConversation { .. } | Mutation::RemoveConversation { .. } => {
                vec![conversations]
            }
            Mutation::SendMessage {
                conversation_id, ..
            } => vec![ResourceKey::Messages(conversation_id.clone()), conversations],
            Mutation::DeleteCallEntry { .. } => vec![ResourceKey::CallHistory],
            Mutation::CreateProfile { .. } | Mutation::UpdateProfile(_) => {
                vec![ResourceKey::Profile(self.me.clone())]
            }
        }
    }

    /// Apply the synthetic change; returns the provisional message of a send
    /// and one record per patched key
    fn patch(&self, mutation: &Mutation) -> (Option<Message>, Vec<Patch>) {
        let me = &self.me;
        let conversations = ResourceKey::Conversations(me.clone());
        match mutation {
            Mutation::AddConversation { other } => {
                let Ok(summary) = ConversationId::canonicalize(me, other)
                    .and_then(|id| ConversationSummary::from_id(id, me))
                else {
                    return (None, Vec::new());
                };
                let patch = self.cache.patch(&conversations, |value| {
                    if let Some(ResourceValue::Conversations(list)) = value {
                        if !list.iter().any(|c| c.id == summary.id) {
                            list.push(summary);
                        }
                    }
                });
                (None, vec![patch])
            }
            Mutation::RemoveConversation { conversation_id } => {
                let patch = self.cache.patch(&conversations, |value| {
                    if let Some(ResourceValue::Conversations(list)) = value {
                        list.retain(|c| &c.id != conversation_id);
                    }
                });
                (None, vec![patch])
            }
            Mutation::SendMessage {
                conversation_id,
                text,
                kind,
                media,
            } => {
                let message = Message::provisional(
                    conversation_id.clone(),
                    me.clone(),
                    text.clone(),
                    *kind,
                    media.clone(),
                );
                let pending = message.clone();
                let messages = self
                    .cache
                    .patch(&ResourceKey::Messages(conversation_id.clone()), |value| {
                        if let Some(ResourceValue::Messages(list)) = value {
                            list.push(pending);
                            sort_messages(list);
                        }
                    });
                let preview = preview_of(&message);
                let summaries = self.cache.patch(&conversations, |value| {
                    if let Some(ResourceValue::Conversations(list)) = value {
                        if let Some(summary) = list.iter_mut().find(|c| &c.id == conversation_id) {
                            summary.last_message_preview = Some(preview);
                        }
                    }
                });
                (Some(message), vec![messages, summaries])
            }
            Mutation::DeleteCallEntry { call_id } => {
                let patch = self.cache.patch(&ResourceKey::CallHistory, |value| {
                    if let Some(ResourceValue::CallHistory(list)) = value {
                        list.retain(|entry| entry.id != *call_id);
                    }
                });
                (None, vec![patch])
            }
            Mutation::CreateProfile {
                username,
                display_name,
            } => {
                let profile = UserProfile {
                    principal: me.clone(),
                    username: username.clone(),
                    display_name: display_name.trim().to_string(),
                };
                let patch = self.cache.patch(&ResourceKey::Profile(me.clone()), |value| {
                    *value = Some(ResourceValue::Profile(Some(profile)));
                });
                (None, vec![patch])
            }
            Mutation::UpdateProfile(update) => {
                let patch = self.cache.patch(&ResourceKey::Profile(me.clone()), |value| {
                    if let Some(ResourceValue::Profile(Some(profile))) = value {
                        update.apply_to(profile);
                    }
                });
                (None, vec![patch])
            }
        }
    }

    async fn dispatch(&self, mutation: &Mutation) -> std::result::Result<Dispatched, RemoteError> {
        let remote = self.remote.as_ref();
        match mutation {
            Mutation::AddConversation { other } => {
                let id = ConversationId::canonicalize(&self.me, other)
                    .map_err(|e| RemoteError::Rejected(e.to_string()))?;
                remote.add_conversation(&id).await?;
                Ok(Dispatched::Done)
            }
            Mutation::RemoveConversation { conversation_id } => {
                remote.remove_conversation(conversation_id).await?;
                Ok(Dispatched::Done)
            }
            Mutation::SendMessage {
                conversation_id,
                text,
                ..
            } => {
                let reply = remote.send_message(conversation_id, &self.me, text).await?;
                Ok(Dispatched::Reply(reply))
            }
            Mutation::DeleteCallEntry { call_id } => {
                remote.delete_call_entry(*call_id).await?;
                Ok(Dispatched::Done)
            }
            Mutation::CreateProfile {
                username,
                display_name,
            } => {
                let profile = remote.create_profile(username, display_name.trim()).await?;
                Ok(Dispatched::Profile(profile))
            }
            Mutation::UpdateProfile(update) => {
                let profile = remote.update_profile(update).await?;
                Ok(Dispatched::Profile(profile))
            }
        }
    }

    /// Substitute authoritative data for the synthetic patch
    fn reconcile(
        &self,
        mutation: &Mutation,
        provisional: Option<Message>,
        dispatched: Dispatched,
    ) -> MutationOutcome {
        match (mutation, dispatched) {
            (Mutation::SendMessage { conversation_id, .. }, Dispatched::Reply(reply)) => {
                let Some(mut message) = provisional else {
                    return MutationOutcome::Confirmed;
                };
                let provisional_id = message.id;
                message.confirm(&reply);
                let confirmed = message.clone();

                self.cache
                    .patch(&ResourceKey::Messages(conversation_id.clone()), |value| {
                        if let Some(ResourceValue::Messages(list)) = value {
                            replace_provisional(list, provisional_id, &reply);
                        }
                    });
                log::debug!(
                    "Message {} confirmed in {}",
                    reply.message_id,
                    conversation_id
                );
                MutationOutcome::Sent(confirmed)
            }
            (_, Dispatched::Profile(profile)) => {
                self.cache
                    .patch(&ResourceKey::Profile(self.me.clone()), |value| {
                        *value = Some(ResourceValue::Profile(Some(profile)));
                    });
                MutationOutcome::Confirmed
            }
            _ => MutationOutcome::Confirmed,
        }
    }

    fn rollback(&self, mutation: &Mutation, provisional: Option<&Message>, patches: Vec<Patch>) {
        for patch in patches {
            let before = patch.before().cloned();
            self.cache.undo(patch, |value| {
                if let Some(value) = value {
                    unpatch(&self.me, mutation, provisional, before.as_ref(), value);
                }
            });
        }
    }
}

fn preview_of(message: &Message) -> MessagePreview {
    MessagePreview {
        text: message.text.clone(),
        timestamp_nanos: message.timestamp_nanos,
        is_video: message.kind == MessageKind::Video,
    }
}

/// Take back only what `mutation` itself changed in `value`, leaving changes
/// of other pending mutations and of pulls in place
fn unpatch(
    me: &ParticipantId,
    mutation: &Mutation,
    provisional: Option<&Message>,
    before: Option<&ResourceValue>,
    value: &mut ResourceValue,
) {
    match (mutation, value) {
        (Mutation::AddConversation { other }, ResourceValue::Conversations(list)) => {
            let Ok(added) = ConversationId::canonicalize(me, other) else {
                return;
            };
            let existed = before
                .and_then(ResourceValue::as_conversations)
                .is_some_and(|old| old.iter().any(|c| c.id == added));
            if !existed {
                list.retain(|c| c.id != added);
            }
        }
        (Mutation::RemoveConversation { conversation_id }, ResourceValue::Conversations(list)) => {
            if list.iter().any(|c| &c.id == conversation_id) {
                return;
            }
            let removed = before
                .and_then(ResourceValue::as_conversations)
                .and_then(|old| old.iter().position(|c| &c.id == conversation_id).map(|i| (i, &old[i])));
            if let Some((index, summary)) = removed {
                list.insert(index.min(list.len()), summary.clone());
            }
        }
        (Mutation::SendMessage { .. }, ResourceValue::Messages(list)) => {
            if let Some(message) = provisional {
                list.retain(|m| m.id != message.id);
            }
        }
        (Mutation::SendMessage { conversation_id, .. }, ResourceValue::Conversations(list)) => {
            let Some(message) = provisional else {
                return;
            };
            let synthetic = preview_of(message);
            let previous = before
                .and_then(ResourceValue::as_conversations)
                .and_then(|old| old.iter().find(|c| &c.id == conversation_id))
                .and_then(|c| c.last_message_preview.clone());
            if let Some(summary) = list.iter_mut().find(|c| &c.id == conversation_id) {
                if summary.last_message_preview.as_ref() == Some(&synthetic) {
                    summary.last_message_preview = previous;
                }
            }
        }
        (Mutation::DeleteCallEntry { call_id }, ResourceValue::CallHistory(list)) => {
            if list.iter().any(|entry| entry.id == *call_id) {
                return;
            }
            let deleted = before
                .and_then(ResourceValue::as_call_history)
                .and_then(|old| old.iter().find(|entry| entry.id == *call_id));
            if let Some(entry) = deleted {
                let index = list.partition_point(|e| e.id < entry.id);
                list.insert(index, entry.clone());
            }
        }
        // Someone else rewrote the profile since; the forced refresh settles it
        _ => {}
    }
}

fn replace_provisional(list: &mut Vec<Message>, provisional_id: MessageId, reply: &MessageReply) {
    let confirmed_id = MessageId::Confirmed(reply.message_id);
    // A pull may already have brought the confirmed copy in
    if list.iter().any(|m| m.id == confirmed_id) {
        list.retain(|m| m.id != provisional_id);
    } else if let Some(message) = list.iter_mut().find(|m| m.id == provisional_id) {
        message.confirm(reply);
    }
    sort_messages(list);
}
