//! Message urgency tiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raised when parsing an unknown priority value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown priority: {0}")]
pub struct ParsePriorityError(u8);

/// One of five urgency tiers governing dequeue order.
///
/// Lower numeric value means higher urgency: a receiver's CRITICAL queue
/// is drained before HIGH, HIGH before MEDIUM, and so on down to INFO.
/// The derived ordering matches (`Critical` compares lowest).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Immediate attention (escalations, cancellation signals).
    Critical,
    /// Urgent coordination traffic.
    High,
    /// Normal task dispatch.
    Medium,
    /// Deferred work.
    Low,
    /// Advisory traffic, drained last.
    Info,
}

impl Priority {
    /// All priorities, most urgent first.
    pub const ALL: [Self; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    /// Returns the numeric urgency level (1 = most urgent).
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
            Self::Info => 5,
        }
    }

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Priority {
    type Error = ParsePriorityError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Critical),
            2 => Ok(Self::High),
            3 => Ok(Self::Medium),
            4 => Ok(Self::Low),
            5 => Ok(Self::Info),
            other => Err(ParsePriorityError(other)),
        }
    }
}
