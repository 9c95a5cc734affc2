//! Participant and conversation identifiers
//!
//! A conversation between two participants is addressed by an id derived
//! from the unordered pair: `min(a, b) + ":" + max(a, b)`. The id is never
//! stored separately from the pairing, so both sides always compute the
//! same value.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the two participants of a conversation id
pub const SEPARATOR: char = ':';

const MAX_PARTICIPANT_LEN: usize = 128;
const LABEL_PREFIX_LEN: usize = 8;

/// Opaque identifier of one party, issued by the authentication boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if !is_valid_participant(&id) {
            return Err(ClientError::InvalidArgument(format!(
                "invalid participant id: {:?}",
                id
            )));
        }
        Ok(ParticipantId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short label used until a profile is known: first 8 chars + "..."
    pub fn short_label(&self) -> String {
        short_label(&self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self> {
        ParticipantId::new(value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

fn is_valid_participant(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PARTICIPANT_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn short_label(text: &str) -> String {
    let prefix: String = text.chars().take(LABEL_PREFIX_LEN).collect();
    format!("{}...", prefix)
}

/// Canonical identifier of the conversation between two participants
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    /// Derive the id of the conversation between `a` and `b`.
    /// Fails with `InvalidArgument` when both are the same participant.
    pub fn canonicalize(a: &ParticipantId, b: &ParticipantId) -> Result<Self> {
        if a == b {
            return Err(ClientError::InvalidArgument(format!(
                "cannot open a conversation with oneself ({})",
                a
            )));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(ConversationId(format!("{}{}{}", low, SEPARATOR, high)))
    }

    /// Validate an id received from outside the client
    pub fn parse(text: &str) -> Result<Self> {
        let (a, b) = decode_str(text)?;
        // Re-derive so that a non-canonical ordering is rejected too
        let canonical = ConversationId::canonicalize(&a, &b)?;
        if canonical.0 != text {
            return Err(ClientError::MalformedId(format!(
                "{} is not in canonical order",
                text
            )));
        }
        Ok(canonical)
    }

    /// Split the id back into its two participants, lower one first
    pub fn decode(&self) -> Result<(ParticipantId, ParticipantId)> {
        decode_str(&self.0)
    }

    /// The participant of this conversation that is not `me`
    pub fn other_participant(&self, me: &ParticipantId) -> Result<ParticipantId> {
        let (a, b) = self.decode()?;
        if &a == me {
            Ok(b)
        } else if &b == me {
            Ok(a)
        } else {
            Err(ClientError::NotAParticipant {
                conversation: self.0.clone(),
                participant: me.to_string(),
            })
        }
    }

    pub fn involves(&self, participant: &ParticipantId) -> bool {
        self.decode()
            .map(|(a, b)| &a == participant || &b == participant)
            .unwrap_or(false)
    }

    /// Label shown for a conversation nobody has resolved a profile for yet
    pub fn display_label(&self, fallback: &str) -> String {
        match self.decode() {
            Ok((first, _)) => first.short_label(),
            Err(_) => fallback.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConversationId {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self> {
        ConversationId::parse(&value)
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

fn decode_str(text: &str) -> Result<(ParticipantId, ParticipantId)> {
    let mut parts = text.split(SEPARATOR);
    let (a, b) = match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => (a, b),
        _ => {
            return Err(ClientError::MalformedId(format!(
                "{:?} must contain exactly one '{}'",
                text, SEPARATOR
            )))
        }
    };

    let a = ParticipantId::new(a).map_err(|_| {
        ClientError::MalformedId(format!("{:?} has an invalid first participant", text))
    })?;
    let b = ParticipantId::new(b).map_err(|_| {
        ClientError::MalformedId(format!("{:?} has an invalid second participant", text))
    })?;
    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    #[test]
    fn test_canonicalize_is_symmetric() {
        let pairs = [
            ("p1", "p2"),
            ("zeta", "alpha"),
            ("rrkah-fqaaa-aaaaa-aaaaq-cai", "aaaaa-aa"),
            ("A", "a"),
            ("user_10", "user_9"),
        ];
        for (a, b) in pairs {
            let ab = ConversationId::canonicalize(&pid(a), &pid(b)).unwrap();
            let ba = ConversationId::canonicalize(&pid(b), &pid(a)).unwrap();
            assert_eq!(ab, ba, "canonicalize must ignore argument order");

            let (x, y) = ab.decode().unwrap();
            let mut decoded = vec![x.as_str().to_string(), y.as_str().to_string()];
            let mut expected = vec![a.to_string(), b.to_string()];
            decoded.sort();
            expected.sort();
            assert_eq!(decoded, expected);
        }
    }

    #[test]
    fn test_canonicalize_self_is_invalid() {
        let err = ConversationId::canonicalize(&pid("p1"), &pid("p1")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn test_p1_p2_scenario() {
        let id = ConversationId::canonicalize(&pid("p2"), &pid("p1")).unwrap();
        assert_eq!(id.as_str(), "p1:p2");
        assert_eq!(id.other_participant(&pid("p2")).unwrap(), pid("p1"));
        assert_eq!(id.other_participant(&pid("p1")).unwrap(), pid("p2"));
    }

    #[test]
    fn test_other_participant_for_outsider() {
        let id = ConversationId::parse("p1:p2").unwrap();
        let err = id.other_participant(&pid("p3")).unwrap_err();
        assert!(matches!(err, ClientError::NotAParticipant { .. }));
        assert!(!id.involves(&pid("p3")));
        assert!(id.involves(&pid("p1")));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["p1", "p1:p2:p3", ":p2", "p1:", "", "p 1:p2", "p2:p1", "p1:p1"] {
            assert!(
                ConversationId::parse(text).is_err(),
                "{:?} should be rejected",
                text
            );
        }
        let err = ConversationId::parse("p1:p2:p3").unwrap_err();
        assert!(matches!(err, ClientError::MalformedId(_)));
    }

    #[test]
    fn test_participant_validation() {
        assert!(ParticipantId::new("rrkah-fqaaa-aaaaa-aaaaq-cai").is_ok());
        assert!(ParticipantId::new("").is_err());
        assert!(ParticipantId::new("a:b").is_err());
        assert!(ParticipantId::new("a b").is_err());
        assert!(ParticipantId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn test_display_label() {
        let id = ConversationId::parse("abcdefghijk:zz").unwrap();
        assert_eq!(id.display_label("Chat"), "abcdefgh...");
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let id: ConversationId = serde_json::from_str("\"p1:p2\"").unwrap();
        assert_eq!(id.as_str(), "p1:p2");
        assert!(serde_json::from_str::<ConversationId>("\"p1\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1:p2\"");
    }
}
