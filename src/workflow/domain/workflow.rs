//! The Workflow aggregate root.

use super::{
    Fragment, FragmentName, FragmentProgress, RestoredStepData, StepId, StepStatus,
    WorkflowDefinition, WorkflowDomainError, WorkflowId, WorkflowStatus, WorkflowStep,
    validate_step_graph,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::{Map, Value};

/// A directed acyclic graph of steps representing one end-to-end job.
///
/// Mutated only through guarded transitions; terminal workflow states are
/// immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    id: WorkflowId,
    name: String,
    steps: Vec<WorkflowStep>,
    fragments: Vec<Fragment>,
    status: WorkflowStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Builds and validates a workflow from its definition.
    ///
    /// Validation covers the step graph (unique ids, known dependencies,
    /// no cycles) and fragment membership; agent resolution is the
    /// engine's concern.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError`] for an empty name, invalid ids, a
    /// malformed graph, or a fragment naming an unknown member.
    pub fn from_definition(
        definition: &WorkflowDefinition,
        clock: &impl Clock,
    ) -> Result<Self, WorkflowDomainError> {
        let name = definition.name.trim().to_owned();
        if name.is_empty() {
            return Err(WorkflowDomainError::EmptyWorkflowName);
        }

        let steps = definition
            .steps
            .iter()
            .map(WorkflowStep::from_definition)
            .collect::<Result<Vec<_>, _>>()?;
        validate_step_graph(&steps)?;

        let mut fragments = Vec::with_capacity(definition.fragments.len());
        for (fragment_name, members) in &definition.fragments {
            let fragment_name = FragmentName::new(fragment_name)?;
            let mut member_ids = Vec::with_capacity(members.len());
            for member in members {
                let member_id = StepId::new(member)?;
                if !steps.iter().any(|step| step.id() == &member_id) {
                    return Err(WorkflowDomainError::UnknownFragmentMember(member_id));
                }
                member_ids.push(member_id);
            }
            fragments.push(Fragment::new(fragment_name, member_ids));
        }

        let timestamp = clock.utc();
        Ok(Self {
            id: WorkflowId::new(),
            name,
            steps,
            fragments,
            status: WorkflowStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Replaces the generated id with a persisted one.
    ///
    /// Used when reconstructing a workflow from stored progress.
    #[must_use]
    pub const fn with_id(mut self, id: WorkflowId) -> Self {
        self.id = id;
        self
    }

    /// Returns the workflow identifier.
    #[must_use]
    pub const fn id(&self) -> WorkflowId {
        self.id
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all steps in definition order.
    #[must_use]
    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    /// Returns the fragments.
    #[must_use]
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Returns the workflow status.
    #[must_use]
    pub const fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest lifecycle timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Looks up a step by id.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.id() == id)
    }

    fn step_mut(&mut self, id: &StepId) -> Result<&mut WorkflowStep, WorkflowDomainError> {
        self.steps
            .iter_mut()
            .find(|step| step.id() == id)
            .ok_or_else(|| WorkflowDomainError::UnknownStep(id.clone()))
    }

    fn transition(
        &mut self,
        to: WorkflowStatus,
        clock: &impl Clock,
    ) -> Result<(), WorkflowDomainError> {
        if !self.status.can_transition(to) {
            return Err(WorkflowDomainError::InvalidWorkflowTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.touch(clock);
        Ok(())
    }

    /// Starts the workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidWorkflowTransition`] unless
    /// the workflow is `Pending`.
    pub fn start(&mut self, clock: &impl Clock) -> Result<(), WorkflowDomainError> {
        self.transition(WorkflowStatus::Running, clock)
    }

    /// Suspends a running workflow for human intervention.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidWorkflowTransition`] unless
    /// the workflow is `Running`.
    pub fn pause(&mut self, clock: &impl Clock) -> Result<(), WorkflowDomainError> {
        self.transition(WorkflowStatus::Paused, clock)
    }

    /// Resumes a paused workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidWorkflowTransition`] unless
    /// the workflow is `Paused`.
    pub fn resume_paused(&mut self, clock: &impl Clock) -> Result<(), WorkflowDomainError> {
        self.transition(WorkflowStatus::Running, clock)
    }

    /// Completes the workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidWorkflowTransition`] unless
    /// the workflow is `Running`.
    pub fn complete(&mut self, clock: &impl Clock) -> Result<(), WorkflowDomainError> {
        self.transition(WorkflowStatus::Completed, clock)
    }

    /// Fails the workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidWorkflowTransition`] unless
    /// the workflow is `Running`.
    pub fn fail(&mut self, clock: &impl Clock) -> Result<(), WorkflowDomainError> {
        self.transition(WorkflowStatus::Failed, clock)
    }

    /// Cancels the workflow and skips every step not yet in an end state.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::InvalidWorkflowTransition`] when the
    /// workflow is already terminal.
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<(), WorkflowDomainError> {
        self.transition(WorkflowStatus::Cancelled, clock)?;
        for step in &mut self.steps {
            if step.status().can_transition(StepStatus::Skipped) {
                step.skip()?;
            }
        }
        Ok(())
    }

    /// Marks a step dispatchable.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::UnknownStep`] or a step transition
    /// error.
    pub fn mark_step_ready(
        &mut self,
        id: &StepId,
        clock: &impl Clock,
    ) -> Result<(), WorkflowDomainError> {
        self.step_mut(id)?.mark_ready()?;
        self.touch(clock);
        Ok(())
    }

    /// Counts an attempt and moves a step into execution.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::UnknownStep`] or a step transition
    /// error.
    pub fn begin_step(
        &mut self,
        id: &StepId,
        clock: &impl Clock,
    ) -> Result<(), WorkflowDomainError> {
        self.step_mut(id)?.begin()?;
        self.touch(clock);
        Ok(())
    }

    /// Records a step success.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::UnknownStep`] or a step transition
    /// error.
    pub fn succeed_step(
        &mut self,
        id: &StepId,
        result: Value,
        clock: &impl Clock,
    ) -> Result<(), WorkflowDomainError> {
        self.step_mut(id)?.succeed(result)?;
        self.touch(clock);
        Ok(())
    }

    /// Records a step failure.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::UnknownStep`] or a step transition
    /// error.
    pub fn fail_step(
        &mut self,
        id: &StepId,
        error: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), WorkflowDomainError> {
        self.step_mut(id)?.record_failure(error)?;
        self.touch(clock);
        Ok(())
    }

    /// Moves a failed step into its backoff wait.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::UnknownStep`] or a step transition
    /// error.
    pub fn retry_step(
        &mut self,
        id: &StepId,
        clock: &impl Clock,
    ) -> Result<(), WorkflowDomainError> {
        self.step_mut(id)?.begin_retry()?;
        self.touch(clock);
        Ok(())
    }

    /// Skips a step.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::UnknownStep`] or a step transition
    /// error.
    pub fn skip_step(
        &mut self,
        id: &StepId,
        clock: &impl Clock,
    ) -> Result<(), WorkflowDomainError> {
        self.step_mut(id)?.skip()?;
        self.touch(clock);
        Ok(())
    }

    /// Restores persisted lifecycle fields on a step.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::UnknownStep`] for an unknown id.
    pub fn restore_step(
        &mut self,
        id: &StepId,
        data: RestoredStepData,
    ) -> Result<(), WorkflowDomainError> {
        self.step_mut(id)?.restore(data);
        Ok(())
    }

    /// Returns whether all of a step's dependencies satisfy dependents.
    #[must_use]
    pub fn dependencies_satisfied(&self, step: &WorkflowStep) -> bool {
        step.depends_on().iter().all(|dependency| {
            self.step(dependency)
                .is_some_and(|dep| dep.status().is_terminal_success())
        })
    }

    /// Returns pending steps whose dependencies are satisfied.
    #[must_use]
    pub fn ready_candidates(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|step| step.status() == StepStatus::Pending)
            .filter(|step| self.dependencies_satisfied(step))
            .map(|step| step.id().clone())
            .collect()
    }

    /// Returns steps currently eligible for dispatch.
    #[must_use]
    pub fn dispatchable_steps(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|step| step.status() == StepStatus::Ready)
            .map(|step| step.id().clone())
            .collect()
    }

    /// Returns whether any step is waiting out a retry backoff.
    #[must_use]
    pub fn has_retrying_steps(&self) -> bool {
        self.steps
            .iter()
            .any(|step| step.status() == StepStatus::Retrying)
    }

    /// Returns whether every required step reached terminal success.
    #[must_use]
    pub fn all_required_terminal_success(&self) -> bool {
        self.steps
            .iter()
            .filter(|step| !step.is_optional())
            .all(|step| step.status().is_terminal_success())
    }

    /// Returns the first required step that failed for good, if any.
    #[must_use]
    pub fn required_failure(&self) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .find(|step| !step.is_optional() && step.status() == StepStatus::Failed && !step.can_retry())
    }

    /// Returns the accumulated context: results of succeeded steps keyed
    /// by step id.
    #[must_use]
    pub fn context_snapshot(&self) -> Value {
        let mut context = Map::new();
        for step in &self.steps {
            if let Some(result) = step.result() {
                context.insert(step.id().to_string(), result.clone());
            }
        }
        Value::Object(context)
    }

    /// Derives progress counters for every fragment.
    #[must_use]
    pub fn fragment_progress(&self) -> Vec<FragmentProgress> {
        self.fragments
            .iter()
            .map(|fragment| fragment.progress(self.steps.iter()))
            .collect()
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
