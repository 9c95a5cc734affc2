/// Data models for the duochat client.
/// Defines conversations, messages, call log entries and profiles.

pub mod call;
pub mod conversation;
pub mod message;
pub mod user;

pub use call::{CallLogEntry, CallRecord, CallType};
pub use conversation::{ConversationSummary, MessagePreview, OtherParticipant};
pub use message::{sort_messages, MediaAttachment, Message, MessageId, MessageKind, MessageReply};
pub use user::{ProfileUpdate, SearchQuery, UserProfile};

use chrono::{DateTime, TimeZone, Utc};

/// Convert a nanosecond Unix timestamp into a UTC date
pub fn nanos_to_datetime(nanos: u64) -> DateTime<Utc> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    Utc.timestamp_opt(secs, subsec)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Current time as nanoseconds since the Unix epoch
pub fn now_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}
