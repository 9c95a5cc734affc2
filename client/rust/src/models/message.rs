/// Message model for the duochat client.
/// Represents a message in a two-party conversation, either confirmed by the
/// directory or provisional while an optimistic send is pending.

use crate::identity::{ConversationId, ParticipantId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::now_nanos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    /// Server-assigned, increasing per conversation
    Confirmed(u64),
    /// Client-generated placeholder until the send settles
    Provisional(Uuid),
}

impl MessageId {
    pub fn provisional() -> Self {
        MessageId::Provisional(Uuid::new_v4())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, MessageId::Provisional(_))
    }

    pub fn confirmed(&self) -> Option<u64> {
        match self {
            MessageId::Confirmed(id) => Some(*id),
            MessageId::Provisional(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    pub media_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: ParticipantId,
    pub text: String,
    pub timestamp_nanos: u64,
    pub kind: MessageKind,
    pub media: Option<MediaAttachment>,
}

impl Message {
    /// Create a provisional message for an optimistic send
    pub fn provisional(
        conversation_id: ConversationId,
        sender_id: ParticipantId,
        text: String,
        kind: MessageKind,
        media: Option<MediaAttachment>,
    ) -> Self {
        Message {
            id: MessageId::provisional(),
            conversation_id,
            sender_id,
            text,
            timestamp_nanos: now_nanos(),
            kind,
            media,
        }
    }

    /// Create a message as listed by the directory (already confirmed)
    pub fn from_server(
        id: u64,
        conversation_id: ConversationId,
        sender_id: ParticipantId,
        text: String,
        timestamp_nanos: u64,
    ) -> Self {
        Message {
            id: MessageId::Confirmed(id),
            conversation_id,
            sender_id,
            text,
            timestamp_nanos,
            kind: MessageKind::Text,
            media: None,
        }
    }

    /// Swap the provisional id for the one the directory assigned
    pub fn confirm(&mut self, reply: &MessageReply) {
        self.id = MessageId::Confirmed(reply.message_id);
        self.timestamp_nanos = reply.timestamp_nanos;
    }

    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }
}

/// Directory acknowledgement of a sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
    pub message_id: u64,
    pub timestamp_nanos: u64,
}

fn compare(a: &Message, b: &Message) -> Ordering {
    match (a.id, b.id) {
        (MessageId::Confirmed(x), MessageId::Confirmed(y)) => {
            x.cmp(&y).then(a.timestamp_nanos.cmp(&b.timestamp_nanos))
        }
        (MessageId::Confirmed(_), MessageId::Provisional(_)) => Ordering::Less,
        (MessageId::Provisional(_), MessageId::Confirmed(_)) => Ordering::Greater,
        (MessageId::Provisional(_), MessageId::Provisional(_)) => {
            a.timestamp_nanos.cmp(&b.timestamp_nanos)
        }
    }
}

/// Order messages by confirmed id, then provisional ones by timestamp
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(compare);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> ConversationId {
        ConversationId::parse("p1:p2").unwrap()
    }

    fn sender() -> ParticipantId {
        ParticipantId::new("p1").unwrap()
    }

    #[test]
    fn test_provisional_message() {
        let msg = Message::provisional(
            conversation(),
            sender(),
            "hello".to_string(),
            MessageKind::Text,
            None,
        );
        assert!(msg.is_provisional());
        assert!(msg.id.confirmed().is_none());
    }

    #[test]
    fn test_message_confirm() {
        let mut msg = Message::provisional(
            conversation(),
            sender(),
            "hello".to_string(),
            MessageKind::Text,
            None,
        );
        msg.confirm(&MessageReply {
            message_id: 7,
            timestamp_nanos: 42,
        });

        assert_eq!(msg.id, MessageId::Confirmed(7));
        assert_eq!(msg.timestamp_nanos, 42);
        assert!(!msg.is_provisional());
    }

    #[test]
    fn test_sort_messages() {
        let pending = Message::provisional(
            conversation(),
            sender(),
            "pending".to_string(),
            MessageKind::Text,
            None,
        );
        let mut messages = vec![
            pending,
            Message::from_server(3, conversation(), sender(), "c".into(), 30),
            Message::from_server(1, conversation(), sender(), "a".into(), 10),
            Message::from_server(2, conversation(), sender(), "b".into(), 20),
        ];
        sort_messages(&mut messages);

        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "pending"]);
    }

    #[test]
    fn test_message_kind_wire_format() {
        assert_eq!(serde_json::to_string(&MessageKind::Video).unwrap(), "\"video\"");
    }
}
