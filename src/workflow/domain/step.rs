//! One schedulable unit of work within a workflow.

use super::{StepDefinition, StepId, StepStatus, WorkflowDomainError};
use serde_json::Value;
use std::time::Duration;

/// A single unit of work bound to one agent and one task type.
///
/// # Invariants
///
/// - Status only moves along the edges [`StepStatus::can_transition`]
///   allows.
/// - `attempt_count` never exceeds `max_attempts`; `begin` counts the
///   attempt and refuses dispatch past the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    id: StepId,
    agent_ref: String,
    task_type: String,
    parameters: Value,
    depends_on: Vec<StepId>,
    optional: bool,
    status: StepStatus,
    attempt_count: u32,
    max_attempts: u32,
    timeout: Duration,
    result: Option<Value>,
    error: Option<String>,
}

/// Parameter object for restoring a persisted step.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredStepData {
    /// Persisted lifecycle status.
    pub status: StepStatus,
    /// Persisted attempt count.
    pub attempt_count: u32,
    /// Persisted success result, if any.
    pub result: Option<Value>,
    /// Persisted last error, if any.
    pub error: Option<String>,
}

impl WorkflowStep {
    /// Builds a step from its definition entry.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::ZeroMaxAttempts`] when the
    /// definition allows no attempts, or an id validation error for the
    /// step id or a dependency id.
    pub fn from_definition(definition: &StepDefinition) -> Result<Self, WorkflowDomainError> {
        let id = StepId::new(&definition.id)?;
        if definition.max_attempts == 0 {
            return Err(WorkflowDomainError::ZeroMaxAttempts(id));
        }
        let depends_on = definition
            .depends_on
            .iter()
            .map(StepId::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id,
            agent_ref: definition.agent.clone(),
            task_type: definition.task.clone(),
            parameters: definition.parameters.clone(),
            depends_on,
            optional: definition.optional,
            status: StepStatus::Pending,
            attempt_count: 0,
            max_attempts: definition.max_attempts,
            timeout: Duration::from_secs(definition.timeout_secs.max(1)),
            result: None,
            error: None,
        })
    }

    /// Returns the step identifier.
    #[must_use]
    pub const fn id(&self) -> &StepId {
        &self.id
    }

    /// Returns the agent name or specialization this step is bound to.
    #[must_use]
    pub fn agent_ref(&self) -> &str {
        &self.agent_ref
    }

    /// Returns the task type handed to the agent.
    #[must_use]
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Returns the task parameters.
    #[must_use]
    pub const fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Returns the ids of steps that must finish first.
    #[must_use]
    pub fn depends_on(&self) -> &[StepId] {
        &self.depends_on
    }

    /// Returns whether failure of this step may be skipped over.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> StepStatus {
        self.status
    }

    /// Returns how many dispatch attempts have been made.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Returns the attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the per-attempt response timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the success result, if recorded.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Returns the last recorded error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns whether a failed step still has attempts left.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        matches!(self.status, StepStatus::Failed) && self.attempt_count < self.max_attempts
    }

    fn transition(&mut self, to: StepStatus) -> Result<(), WorkflowDomainError> {
        if !self.status.can_transition(to) {
            return Err(WorkflowDomainError::InvalidStepTransition {
                step: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Marks the step dispatchable once its dependencies are satisfied.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidStepTransition`] when the
    /// step is not `Pending` or `Retrying`.
    pub fn mark_ready(&mut self) -> Result<(), WorkflowDomainError> {
        self.transition(StepStatus::Ready)
    }

    /// Counts an attempt and moves the step into execution.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::AttemptsExhausted`] when the budget
    /// is spent, or [`WorkflowDomainError::InvalidStepTransition`] when
    /// the step is not `Ready`.
    pub fn begin(&mut self) -> Result<(), WorkflowDomainError> {
        if self.attempt_count >= self.max_attempts {
            return Err(WorkflowDomainError::AttemptsExhausted(self.id.clone()));
        }
        self.transition(StepStatus::Running)?;
        self.attempt_count += 1;
        Ok(())
    }

    /// Records a successful attempt.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidStepTransition`] when the
    /// step is not `Running`.
    pub fn succeed(&mut self, result: Value) -> Result<(), WorkflowDomainError> {
        self.transition(StepStatus::Succeeded)?;
        self.result = Some(result);
        self.error = None;
        Ok(())
    }

    /// Records a failed attempt (execution error or timeout).
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidStepTransition`] when the
    /// step is not `Running`.
    pub fn record_failure(&mut self, error: impl Into<String>) -> Result<(), WorkflowDomainError> {
        self.transition(StepStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Moves a failed step into its backoff wait.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::AttemptsExhausted`] when no attempts
    /// remain, or [`WorkflowDomainError::InvalidStepTransition`] when the
    /// step is not `Failed`.
    pub fn begin_retry(&mut self) -> Result<(), WorkflowDomainError> {
        if self.attempt_count >= self.max_attempts {
            return Err(WorkflowDomainError::AttemptsExhausted(self.id.clone()));
        }
        self.transition(StepStatus::Retrying)
    }

    /// Skips the step (optional failure or cancellation).
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidStepTransition`] when the
    /// step is already in a different end state.
    pub fn skip(&mut self) -> Result<(), WorkflowDomainError> {
        self.transition(StepStatus::Skipped)
    }

    /// Restores persisted lifecycle fields on a freshly built step.
    ///
    /// This is persistence reconstruction, not a state-machine move; the
    /// transition guards are deliberately bypassed.
    pub fn restore(&mut self, data: RestoredStepData) {
        self.status = data.status;
        self.attempt_count = data.attempt_count.min(self.max_attempts);
        self.result = data.result;
        self.error = data.error;
    }
}
