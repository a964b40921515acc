//! Identifier types for the communication bus.

use super::BusDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Uuid> for MessageId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum length for a topic name.
const MAX_TOPIC_LENGTH: usize = 100;

/// Validated pub/sub topic (e.g. `workflow.escalation`).
///
/// Topics are trimmed, lowercased, and restricted to `[a-z0-9_.]`, with
/// dots separating namespace segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicName(String);

impl TopicName {
    /// Creates a validated topic name.
    ///
    /// # Errors
    ///
    /// Returns [`BusDomainError::EmptyTopic`] when empty after trimming or
    /// [`BusDomainError::InvalidTopic`] for characters outside `[a-z0-9_.]`
    /// or over-length values.
    pub fn new(value: impl Into<String>) -> Result<Self, BusDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(BusDomainError::EmptyTopic);
        }

        let is_valid = normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.');

        if normalized.len() > MAX_TOPIC_LENGTH || !is_valid {
            return Err(BusDomainError::InvalidTopic(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the topic as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TopicName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
