// Core domain types shared across all Roomline crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted message body, in characters.
pub const MAX_BODY_CHARS: usize = 4000;

/// A chat message between two marketplace users.
///
/// Immutable once persisted, except `is_read`, which transitions
/// false → true exactly once and never reverts. Messages are never
/// deleted by the messaging subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The other participant of this message, from `user`'s perspective.
    pub fn counterpart_of(&self, user: Uuid) -> Uuid {
        if self.sender_id == user {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    /// Whether `user` is the sender or the receiver.
    pub fn involves(&self, user: Uuid) -> bool {
        self.sender_id == user || self.receiver_id == user
    }
}

/// The slice of the marketplace user directory the chat UI needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// One row of the chat-list screen, derived per request and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub counterpart: UserProfile,
    pub online: bool,
    pub unread_count: u64,
    pub last_message: Message,
}

/// Rejection reasons for a message body, checked before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyValidationError {
    #[error("message body must not be empty")]
    Empty,
    #[error("message body exceeds {MAX_BODY_CHARS} characters")]
    TooLong,
}

/// Validate a message body before sending or persisting it.
pub fn validate_body(body: &str) -> Result<(), BodyValidationError> {
    if body.trim().is_empty() {
        return Err(BodyValidationError::Empty);
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(BodyValidationError::TooLong);
    }
    Ok(())
}
