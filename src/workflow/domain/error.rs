//! Domain validation errors for workflow scheduling.

use super::{StepId, StepStatus, WorkflowStatus};
use thiserror::Error;

/// Validation and state-machine failures raised by workflow domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowDomainError {
    /// Workflow name was empty after trimming.
    #[error("workflow name must not be empty")]
    EmptyWorkflowName,

    /// Step id was empty after trimming.
    #[error("step id must not be empty")]
    EmptyStepId,

    /// Step id contained characters outside `[a-z0-9_-]`.
    #[error("invalid step id: {0}")]
    InvalidStepId(String),

    /// Fragment name was empty after trimming.
    #[error("fragment name must not be empty")]
    EmptyFragmentName,

    /// Fragment name failed validation.
    #[error("invalid fragment name: {0}")]
    InvalidFragmentName(String),

    /// Two steps share one id within a workflow.
    #[error("duplicate step id: {0}")]
    DuplicateStepId(StepId),

    /// A step depends on an id that is not part of the workflow.
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency {
        /// The declaring step.
        step: StepId,
        /// The unknown dependency.
        dependency: StepId,
    },

    /// The step graph contains a cycle.
    #[error("dependency cycle involving step: {0}")]
    DependencyCycle(StepId),

    /// A fragment names a member step that does not exist.
    #[error("fragment names unknown member step: {0}")]
    UnknownFragmentMember(StepId),

    /// A step was declared with zero allowed attempts.
    #[error("step {0} must allow at least one attempt")]
    ZeroMaxAttempts(StepId),

    /// A step status transition would regress the state machine.
    #[error("step {step} cannot move from {from} to {to}")]
    InvalidStepTransition {
        /// The step being transitioned.
        step: StepId,
        /// Its current status.
        from: StepStatus,
        /// The rejected target status.
        to: StepStatus,
    },

    /// A workflow status transition would regress the state machine.
    #[error("workflow cannot move from {from} to {to}")]
    InvalidWorkflowTransition {
        /// The current status.
        from: WorkflowStatus,
        /// The rejected target status.
        to: WorkflowStatus,
    },

    /// A step was dispatched beyond its attempt budget.
    #[error("step {0} has no attempts left")]
    AttemptsExhausted(StepId),

    /// A workflow operation referenced an unknown step.
    #[error("workflow has no step: {0}")]
    UnknownStep(StepId),
}
