//! Agent execution contract and task envelope types.

use crate::registry::domain::AgentDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message type of a step dispatch request.
pub const TASK_DISPATCH: &str = "task.dispatch";

/// Message type of a step execution reply.
pub const TASK_RESULT: &str = "task.result";

/// Task handed to an agent for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// What kind of work is requested.
    pub task_type: String,
    /// Task parameters from the workflow definition.
    pub parameters: Value,
    /// Accumulated workflow context (results of completed steps).
    pub context: Value,
}

impl TaskRequest {
    /// Creates a task request.
    #[must_use]
    pub fn new(task_type: impl Into<String>, parameters: Value, context: Value) -> Self {
        Self {
            task_type: task_type.into(),
            parameters,
            context,
        }
    }
}

/// Result of one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task completed; `result` carries its product.
    Success {
        /// The produced result document.
        result: Value,
    },
    /// The task failed; `error` explains why.
    Failure {
        /// Human-readable failure description.
        error: String,
    },
}

impl TaskOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub const fn success(result: Value) -> Self {
        Self::Success { result }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Returns whether the outcome is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Health tier reported by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The agent is operational.
    Healthy,
    /// The agent works but with reduced capacity.
    Degraded,
    /// The agent cannot take work.
    Unhealthy,
}

impl HealthStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamped health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealth {
    status: HealthStatus,
    checked_at: DateTime<Utc>,
    message: Option<String>,
}

impl AgentHealth {
    /// Creates a health report.
    #[must_use]
    pub const fn new(status: HealthStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            status,
            checked_at,
            message: None,
        }
    }

    /// Creates a `healthy` report.
    #[must_use]
    pub const fn healthy(checked_at: DateTime<Utc>) -> Self {
        Self::new(HealthStatus::Healthy, checked_at)
    }

    /// Creates an `unhealthy` report with details.
    #[must_use]
    pub fn unhealthy(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, checked_at).with_message(message)
    }

    /// Adds an explanatory message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let normalized = message.into().trim().to_owned();
        if !normalized.is_empty() {
            self.message = Some(normalized);
        }
        self
    }

    /// Returns the health tier.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Returns when the check ran.
    #[must_use]
    pub const fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Returns the optional detail message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Contract every pluggable agent implementation satisfies.
///
/// All calls are asynchronous from the core's point of view; the
/// descriptor returned by `describe` is what the implementation registers
/// under, checked at registration time rather than call time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Agent: Send + Sync {
    /// Executes one task and reports its outcome.
    async fn execute(&self, task: TaskRequest) -> TaskOutcome;

    /// Reports the agent's current health.
    async fn health_check(&self) -> AgentHealth;

    /// Returns the capability descriptor this agent registers under.
    fn describe(&self) -> AgentDescriptor;
}
