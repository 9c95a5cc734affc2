/// User profile model for the duochat client.
/// Holds the shape checks applied before a profile change or a directory
/// search leaves the client.

use crate::error::{ClientError, Result};
use crate::identity::ParticipantId;
use serde::{Deserialize, Serialize};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const DISPLAY_NAME_MAX_LEN: usize = 32;
pub const MIN_SEARCH_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub principal: ParticipantId,
    pub username: String,
    pub display_name: String,
}

impl UserProfile {
    /// Handle shown to other users
    pub fn handle(&self) -> String {
        format!("@{}", self.username)
    }
}

/// Check a username: 3–32 characters, ASCII alphanumeric or underscore
pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ClientError::Validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ClientError::Validation(
            "Username cannot contain special characters".to_string(),
        ));
    }
    Ok(())
}

/// Check a display name: 1–32 characters once trimmed
pub fn validate_display_name(display_name: &str) -> Result<()> {
    let len = display_name.trim().chars().count();
    if len == 0 || len > DISPLAY_NAME_MAX_LEN {
        return Err(ClientError::Validation(format!(
            "Display name must be between 1 and {} characters",
            DISPLAY_NAME_MAX_LEN
        )));
    }
    Ok(())
}

/// Partial profile change; at least one field must be set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<()> {
        if self.username.is_none() && self.display_name.is_none() {
            return Err(ClientError::Validation(
                "Profile update must change the username or the display name".to_string(),
            ));
        }
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        if let Some(display_name) = &self.display_name {
            validate_display_name(display_name)?;
        }
        Ok(())
    }

    /// Apply the change to a cached profile
    pub fn apply_to(&self, profile: &mut UserProfile) {
        if let Some(username) = &self.username {
            profile.username = username.clone();
        }
        if let Some(display_name) = &self.display_name {
            profile.display_name = display_name.trim().to_string();
        }
    }
}

/// Directory search text, trimmed and at least three characters long
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchQuery(String);

impl SearchQuery {
    pub fn new(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_SEARCH_LEN {
            return Err(ClientError::Validation(format!(
                "Search text must be at least {} characters",
                MIN_SEARCH_LEN
            )));
        }
        Ok(SearchQuery(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
