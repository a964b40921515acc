//! Domain validation errors for the communication bus.

use thiserror::Error;

/// Validation failures raised by bus domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusDomainError {
    /// Message type was empty after trimming.
    #[error("message type must not be empty")]
    EmptyMessageType,

    /// Topic name was empty after trimming.
    #[error("topic must not be empty")]
    EmptyTopic,

    /// Topic name failed validation.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Message timeout must be positive.
    #[error("message timeout must not be zero")]
    ZeroTimeout,
}
