//! Step and workflow lifecycle state machines.
//!
//! Both machines only move forward. `can_transition` encodes every legal
//! edge; aggregates reject anything else, so a status can never regress.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raised when parsing an unknown step status representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown step status: {0}")]
pub struct ParseStepStatusError(String);

/// Raised when parsing an unknown workflow status representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown workflow status: {0}")]
pub struct ParseWorkflowStatusError(String);

/// Lifecycle state of one workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting for its dependencies.
    Pending,
    /// Dependencies satisfied; eligible for dispatch.
    Ready,
    /// Dispatched to an agent.
    Running,
    /// Failed with attempts remaining; waiting out the backoff delay.
    Retrying,
    /// Finished successfully.
    Succeeded,
    /// Failed with no attempts remaining.
    Failed,
    /// Skipped: either declared optional and exhausted, or cancelled.
    Skipped,
}

impl StepStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Returns whether the status is an end state.
    ///
    /// `Failed` counts as terminal here; the retry edge out of it is
    /// guarded separately by the step's attempt budget.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Returns whether the status satisfies dependents.
    #[must_use]
    pub const fn is_terminal_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Returns whether the state machine allows the given move.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Ready)
                | (Self::Pending, Self::Skipped)
                | (Self::Ready, Self::Running)
                | (Self::Ready, Self::Skipped)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Skipped)
                | (Self::Failed, Self::Retrying)
                | (Self::Failed, Self::Skipped)
                | (Self::Retrying, Self::Ready)
                | (Self::Retrying, Self::Skipped)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StepStatus {
    type Error = ParseStepStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "running" => Ok(Self::Running),
            "retrying" => Ok(Self::Retrying),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(ParseStepStatusError(value.to_owned())),
        }
    }
}

/// Lifecycle state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Submitted but not started.
    Pending,
    /// Steps are being scheduled.
    Running,
    /// Suspended for human intervention.
    Paused,
    /// Every required step reached terminal success.
    Completed,
    /// A required step exhausted its attempts.
    Failed,
    /// Externally cancelled.
    Cancelled,
}

impl WorkflowStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns whether the status is an immutable end state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns whether the state machine allows the given move.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Paused)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
                | (Self::Paused, Self::Running)
                | (Self::Paused, Self::Cancelled)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for WorkflowStatus {
    type Error = ParseWorkflowStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseWorkflowStatusError(value.to_owned())),
        }
    }
}
