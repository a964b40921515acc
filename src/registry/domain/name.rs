//! Validated name types for the agent registry.

use super::RegistryDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for an agent or category name.
const MAX_NAME_LENGTH: usize = 100;

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn is_valid_segment(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Validated, lowercase alphanumeric-plus-underscores agent identifier.
///
/// Agent names are the unique routing keys of the pipeline: the registry
/// indexes descriptors by them and the bus addresses receiver queues with
/// them (e.g. `contract_writer`, `security_auditor`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentName(String);

impl AgentName {
    /// Creates a validated agent name.
    ///
    /// The input is trimmed and lowercased. Only characters in `[a-z0-9_]`
    /// are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::EmptyAgentName`] when the value is
    /// empty after trimming, [`RegistryDomainError::InvalidAgentName`] when
    /// it contains characters outside `[a-z0-9_]`, or
    /// [`RegistryDomainError::AgentNameTooLong`] when it exceeds 100
    /// characters.
    pub fn new(value: impl Into<String>) -> Result<Self, RegistryDomainError> {
        let raw = value.into();
        let normalized = normalize(&raw);

        if normalized.is_empty() {
            return Err(RegistryDomainError::EmptyAgentName);
        }

        if normalized.len() > MAX_NAME_LENGTH {
            return Err(RegistryDomainError::AgentNameTooLong(raw));
        }

        if !is_valid_segment(&normalized) {
            return Err(RegistryDomainError::InvalidAgentName(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the agent name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AgentName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated capability category (e.g. `codegen`, `analysis`, `docs`).
///
/// Categories group agents by task domain; the registry keeps a
/// per-category index in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryName(String);

impl CategoryName {
    /// Creates a validated category name.
    ///
    /// Validation rules match [`AgentName`]: trimmed, lowercased, and
    /// restricted to `[a-z0-9_]`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::EmptyCategory`] when empty after
    /// trimming or [`RegistryDomainError::InvalidCategory`] for characters
    /// outside `[a-z0-9_]` or over-length values.
    pub fn new(value: impl Into<String>) -> Result<Self, RegistryDomainError> {
        let raw = value.into();
        let normalized = normalize(&raw);

        if normalized.is_empty() {
            return Err(RegistryDomainError::EmptyCategory);
        }

        if normalized.len() > MAX_NAME_LENGTH || !is_valid_segment(&normalized) {
            return Err(RegistryDomainError::InvalidCategory(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the category name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CategoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
