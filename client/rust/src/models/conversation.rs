/// Conversation summary model.
/// One entry of a participant's conversation list.

use crate::error::Result;
use crate::identity::{ConversationId, ParticipantId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherParticipant {
    pub id: ParticipantId,
    pub display_handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub text: String,
    pub timestamp_nanos: u64,
    pub is_video: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub other_participant: OtherParticipant,
    pub last_message_preview: Option<MessagePreview>,
    pub unread_count: u32,
}

impl ConversationSummary {
    /// Build a summary from an id alone, as seen by `me`.
    /// The remote list carries ids only, so the handle falls back to a
    /// short label and there is no preview yet.
    pub fn from_id(id: ConversationId, me: &ParticipantId) -> Result<Self> {
        let other = id.other_participant(me)?;
        Ok(ConversationSummary {
            other_participant: OtherParticipant {
                display_handle: other.short_label(),
                id: other,
            },
            id,
            last_message_preview: None,
            unread_count: 0,
        })
    }
}
