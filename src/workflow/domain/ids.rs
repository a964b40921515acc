//! Identifier types for the workflow domain.

use super::WorkflowDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    /// Creates a new random workflow identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a workflow identifier from an existing UUID.
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

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum length for author-chosen workflow identifiers.
const MAX_ID_LENGTH: usize = 100;

fn is_valid_identifier(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Author-chosen step identifier, unique within one workflow.
///
/// Step ids come from workflow definitions and double as file stems in
/// the persisted layout, so they are restricted to `[a-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Creates a validated step identifier.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::EmptyStepId`] when empty after
    /// trimming or [`WorkflowDomainError::InvalidStepId`] for characters
    /// outside `[a-z0-9_-]` or over-length values.
    pub fn new(value: impl Into<String>) -> Result<Self, WorkflowDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(WorkflowDomainError::EmptyStepId);
        }

        if normalized.len() > MAX_ID_LENGTH || !is_valid_identifier(&normalized) {
            return Err(WorkflowDomainError::InvalidStepId(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the step id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of an independently trackable subset of a workflow's steps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentName(String);

impl FragmentName {
    /// Creates a validated fragment name.
    ///
    /// Validation rules match [`StepId`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::EmptyFragmentName`] when empty after
    /// trimming or [`WorkflowDomainError::InvalidFragmentName`] otherwise.
    pub fn new(value: impl Into<String>) -> Result<Self, WorkflowDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(WorkflowDomainError::EmptyFragmentName);
        }

        if normalized.len() > MAX_ID_LENGTH || !is_valid_identifier(&normalized) {
            return Err(WorkflowDomainError::InvalidFragmentName(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the fragment name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
