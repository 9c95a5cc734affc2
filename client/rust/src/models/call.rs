/// Call log model.
/// Entries are created by the directory after a call completes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Audio,
    Webcam,
    Stream,
}

impl std::str::FromStr for CallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(CallType::Audio),
            "webcam" | "video" => Ok(CallType::Webcam),
            "stream" => Ok(CallType::Stream),
            other => Err(format!("unknown call type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub id: u64,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub call_type: CallType,
    pub duration_seconds: u64,
    pub notes: String,
    pub timestamp_nanos: u64,
}

/// A finished call to be recorded in the caller's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub call_type: CallType,
    pub duration_seconds: u64,
    pub notes: String,
}

impl CallLogEntry {
    /// Duration rendered as m:ss
    pub fn duration_label(&self) -> String {
        format!("{}:{:02}", self.duration_seconds / 60, self.duration_seconds % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_type_parse() {
        assert_eq!("Audio".parse::<CallType>().unwrap(), CallType::Audio);
        assert_eq!("video".parse::<CallType>().unwrap(), CallType::Webcam);
        assert!("fax".parse::<CallType>().is_err());
    }

    #[test]
    fn test_duration_label() {
        let entry = CallLogEntry {
            id: 1,
            from_user: Some("alice".into()),
            to_user: None,
            call_type: CallType::Audio,
            duration_seconds: 125,
            notes: String::new(),
            timestamp_nanos: 0,
        };
        assert_eq!(entry.duration_label(), "2:05");
    }
}
