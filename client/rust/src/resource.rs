//! Resource keys and the values cached under them
//!
//! A key is the unit of subscription, pull and invalidation. Each key names
//! one remote read; the value it pulls is stored whole in the cache.

use crate::config::SyncConfig;
use crate::identity::{ConversationId, ParticipantId};
use crate::models::{CallLogEntry, ConversationSummary, Message, SearchQuery, UserProfile};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Conversations,
    Messages,
    CallHistory,
    Profile,
    UserSearch,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// Conversation list as seen by a participant
    Conversations(ParticipantId),
    Messages(ConversationId),
    /// Call history of the bound caller
    CallHistory,
    Profile(ParticipantId),
    UserSearch(SearchQuery),
}

impl ResourceKey {
    pub fn class(&self) -> ResourceClass {
        match self {
            ResourceKey::Conversations(_) => ResourceClass::Conversations,
            ResourceKey::Messages(_) => ResourceClass::Messages,
            ResourceKey::CallHistory => ResourceClass::CallHistory,
            ResourceKey::Profile(_) => ResourceClass::Profile,
            ResourceKey::UserSearch(_) => ResourceClass::UserSearch,
        }
    }

    /// Freshness window of this key
    pub fn ttl(&self, sync: &SyncConfig) -> Duration {
        sync.ttl(self.class())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Conversations(p) => write!(f, "conversations({})", p),
            ResourceKey::Messages(id) => write!(f, "messages({})", id),
            ResourceKey::CallHistory => f.write_str("call-history"),
            ResourceKey::Profile(p) => write!(f, "profile({})", p),
            ResourceKey::UserSearch(q) => write!(f, "search({})", q.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceValue {
    Conversations(Vec<ConversationSummary>),
    Messages(Vec<Message>),
    CallHistory(Vec<CallLogEntry>),
    /// `None` when the principal has no profile yet
    Profile(Option<UserProfile>),
    UserSearch(Vec<UserProfile>),
}

impl ResourceValue {
    pub fn class(&self) -> ResourceClass {
        match self {
            ResourceValue::Conversations(_) => ResourceClass::Conversations,
            ResourceValue::Messages(_) => ResourceClass::Messages,
            ResourceValue::CallHistory(_) => ResourceClass::CallHistory,
            ResourceValue::Profile(_) => ResourceClass::Profile,
            ResourceValue::UserSearch(_) => ResourceClass::UserSearch,
        }
    }

    pub fn as_conversations(&self) -> Option<&[ConversationSummary]> {
        match self {
            ResourceValue::Conversations(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_messages(&self) -> Option<&[Message]> {
        match self {
            ResourceValue::Messages(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_call_history(&self) -> Option<&[CallLogEntry]> {
        match self {
            ResourceValue::CallHistory(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<Option<&UserProfile>> {
        match self {
            ResourceValue::Profile(profile) => Some(profile.as_ref()),
            _ => None,
        }
    }

    pub fn as_search_results(&self) -> Option<&[UserProfile]> {
        match self {
            ResourceValue::UserSearch(list) => Some(list),
            _ => None,
        }
    }
}
