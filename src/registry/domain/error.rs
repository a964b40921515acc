//! Domain validation errors for the agent registry.

use thiserror::Error;

/// Validation failures raised by registry domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryDomainError {
    /// Agent name was empty after trimming.
    #[error("agent name must not be empty")]
    EmptyAgentName,

    /// Agent name contained characters outside `[a-z0-9_]`.
    #[error("invalid agent name: {0}")]
    InvalidAgentName(String),

    /// Agent name exceeded the maximum length.
    #[error("agent name too long: {0}")]
    AgentNameTooLong(String),

    /// Category name was empty after trimming.
    #[error("category must not be empty")]
    EmptyCategory,

    /// Category name failed validation.
    #[error("invalid category: {0}")]
    InvalidCategory(String),

    /// Descriptor version was empty.
    #[error("agent version must not be empty")]
    EmptyVersion,
}
