//! The workflow engine: dependency-ordered dispatch with retry, backoff,
//! and escalation.
//!
//! One coordinating scheduler drives many concurrently in-flight step
//! executions. Each dispatch is a bus request running as its own task in
//! a [`JoinSet`]; the engine suspends on the next finished dispatch (or a
//! pause/cancel signal), never on any single agent. Global and per-agent
//! semaphores bound how much work is in flight at once.

use crate::agent::{TASK_DISPATCH, TaskOutcome, TaskRequest};
use crate::bus::domain::{Message, Priority, TopicName};
use crate::bus::services::{BusError, CommunicationBus};
use crate::config::{BackoffPolicy, ConfigError};
use crate::registry::domain::AgentName;
use crate::registry::services::{AgentRegistry, RegistryError};
use crate::store::domain::{StepRecord, WorkflowRecord};
use crate::store::ports::{StateRepository, StateStoreError};
use crate::workflow::domain::{
    FragmentProgress, RestoredStepData, StepId, StepStatus, Workflow, WorkflowDefinition,
    WorkflowDomainError, WorkflowId, WorkflowStatus, WorkflowStep,
};
use mockable::Clock;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The submitted definition failed structural validation.
    #[error("workflow validation failed: {0}")]
    Validation(#[from] WorkflowDomainError),

    /// A step's agent reference did not resolve.
    #[error("agent resolution failed for step {step}: {source}")]
    AgentResolution {
        /// The step whose agent could not be resolved.
        step: StepId,
        /// The underlying registry error.
        source: RegistryError,
    },

    /// Bus interaction failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// State persistence failed.
    #[error(transparent)]
    Store(#[from] StateStoreError),

    /// Engine configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A document could not be rendered or parsed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No workflow with the given id is known.
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(WorkflowId),

    /// Persisted progress could not be interpreted.
    #[error("corrupt persisted progress: {0}")]
    CorruptProgress(String),
}

/// Policy knobs for the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Steps allowed in flight at once across the whole workflow.
    pub max_concurrent_steps: usize,
    /// Steps allowed in flight at once per resolved agent.
    pub per_agent_concurrency: usize,
    /// Backoff schedule between retry attempts of one step.
    pub retry_backoff: BackoffPolicy,
    /// Topic the engine publishes human-intervention escalations on.
    pub escalation_topic: String,
}

impl EngineConfig {
    /// Validates field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for out-of-range fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.max_concurrent_steps",
                reason: "must allow at least one step in flight".to_owned(),
            });
        }
        if self.per_agent_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.per_agent_concurrency",
                reason: "must allow at least one step per agent".to_owned(),
            });
        }
        if TopicName::new(&self.escalation_topic).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "engine.escalation_topic",
                reason: format!("not a valid topic: {}", self.escalation_topic),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: 8,
            per_agent_concurrency: 2,
            retry_backoff: BackoffPolicy::default(),
            escalation_topic: "workflow.escalation".to_owned(),
        }
    }
}

/// Per-step outcome in a run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// The step identifier.
    pub step_id: StepId,
    /// Final status of the step.
    pub status: StepStatus,
    /// Dispatch attempts made.
    pub attempt_count: u32,
    /// Last error, when the step failed.
    pub error: Option<String>,
    /// Result payload, when the step succeeded.
    pub result: Option<Value>,
}

/// Outcome summary of one workflow run.
///
/// Failed runs name the failing steps with their last error and attempt
/// counts; results of steps that succeeded stay available regardless of
/// the overall outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowReport {
    /// The workflow identifier.
    pub workflow_id: WorkflowId,
    /// The workflow name.
    pub name: String,
    /// Final workflow status.
    pub status: WorkflowStatus,
    /// Per-step outcomes in definition order.
    pub steps: Vec<StepReport>,
    /// Per-fragment progress counters.
    pub fragments: Vec<FragmentProgress>,
}

impl WorkflowReport {
    fn from_workflow(workflow: &Workflow) -> Self {
        Self {
            workflow_id: workflow.id(),
            name: workflow.name().to_owned(),
            status: workflow.status(),
            steps: workflow
                .steps()
                .iter()
                .map(|step| StepReport {
                    step_id: step.id().clone(),
                    status: step.status(),
                    attempt_count: step.attempt_count(),
                    error: step.error().map(str::to_owned),
                    result: step.result().cloned(),
                })
                .collect(),
            fragments: workflow.fragment_progress(),
        }
    }

    /// Returns whether every required step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    /// Returns the steps that failed for good.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<&StepReport> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Failed)
            .collect()
    }
}

#[derive(Debug)]
enum EngineEvent {
    Finished {
        step_id: StepId,
        outcome: Result<Value, String>,
    },
    RetryDue(StepId),
}

#[derive(Debug, PartialEq, Eq)]
enum LoopSignal {
    Continue,
    Halt,
}

#[derive(Debug)]
struct EngineControls {
    cancel: watch::Sender<bool>,
    pause: watch::Sender<bool>,
}

/// The workflow scheduler.
pub struct WorkflowEngine<S, C>
where
    S: StateRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    registry: Arc<AgentRegistry<C>>,
    bus: Arc<CommunicationBus<C>>,
    store: Arc<S>,
    config: EngineConfig,
    escalation_topic: TopicName,
    engine_party: AgentName,
    clock: Arc<C>,
    controls: Mutex<HashMap<WorkflowId, Arc<EngineControls>>>,
}

impl<S, C> WorkflowEngine<S, C>
where
    S: StateRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an engine over the given registry, bus, and store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the configuration is out
    /// of range.
    pub fn new(
        registry: Arc<AgentRegistry<C>>,
        bus: Arc<CommunicationBus<C>>,
        store: Arc<S>,
        config: EngineConfig,
        clock: Arc<C>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let escalation_topic =
            TopicName::new(&config.escalation_topic).map_err(|err| ConfigError::InvalidValue {
                field: "engine.escalation_topic",
                reason: err.to_string(),
            })?;
        let engine_party =
            AgentName::new("workflow_engine").map_err(|err| ConfigError::InvalidValue {
                field: "engine.party",
                reason: err.to_string(),
            })?;
        Ok(Self {
            registry,
            bus,
            store,
            config,
            escalation_topic,
            engine_party,
            clock,
            controls: Mutex::new(HashMap::new()),
        })
    }

    /// Validates, schedules, and drives a workflow to an end state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] or
    /// [`EngineError::AgentResolution`] before execution starts, and
    /// persistence or bus errors raised while driving.
    pub async fn run(&self, definition: WorkflowDefinition) -> EngineResult<WorkflowReport> {
        let mut workflow = Workflow::from_definition(&definition, &*self.clock)?;
        self.verify_agents(&workflow)?;
        workflow.start(&*self.clock)?;
        tracing::info!(workflow = %workflow.id(), name = workflow.name(), "workflow started");

        // Controls are registered before the first persist so a caller
        // that discovered the id through the store can already address it.
        let controls = self.register_controls(workflow.id());
        let outcome = async {
            self.persist_workflow(&workflow, &definition).await?;
            self.drive(&mut workflow, &definition, &controls).await
        }
        .await;
        self.unregister_controls(workflow.id());
        outcome?;

        tracing::info!(
            workflow = %workflow.id(),
            status = %workflow.status(),
            "workflow settled"
        );
        Ok(WorkflowReport::from_workflow(&workflow))
    }

    /// Requests cancellation of a running workflow.
    ///
    /// Steps already running are allowed to finish; their results are
    /// discarded and every non-terminal step is marked skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorkflow`] when no run with the id
    /// is active.
    pub fn cancel(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        let controls = self.find_controls(workflow_id)?;
        controls.cancel.send_replace(true);
        Ok(())
    }

    /// Suspends dispatching for a running workflow.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorkflow`] when no run with the id
    /// is active.
    pub fn pause(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        let controls = self.find_controls(workflow_id)?;
        controls.pause.send_replace(true);
        Ok(())
    }

    /// Resumes dispatching for a paused workflow.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorkflow`] when no run with the id
    /// is active.
    pub fn resume_paused(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        let controls = self.find_controls(workflow_id)?;
        controls.pause.send_replace(false);
        Ok(())
    }

    /// Reloads a persisted workflow and drives its unfinished steps.
    ///
    /// Steps already in a terminal state keep their recorded outcome;
    /// interrupted steps are re-evaluated for dispatch with their attempt
    /// counts preserved, rather than restarted from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorkflow`] when nothing was
    /// persisted under the id, or [`EngineError::CorruptProgress`] when
    /// the stored records cannot be interpreted.
    pub async fn resume(&self, workflow_id: WorkflowId) -> EngineResult<WorkflowReport> {
        let progress = self
            .store
            .load_workflow_progress(workflow_id.into_inner())
            .await?
            .ok_or(EngineError::UnknownWorkflow(workflow_id))?;
        let definition: WorkflowDefinition =
            serde_json::from_value(progress.workflow.definition.clone())?;
        let persisted_status = WorkflowStatus::try_from(progress.workflow.status.as_str())
            .map_err(|err| EngineError::CorruptProgress(err.to_string()))?;

        let mut workflow =
            Workflow::from_definition(&definition, &*self.clock)?.with_id(workflow_id);
        self.restore_steps(&mut workflow, &progress.steps)?;

        if persisted_status.is_terminal() {
            let mut report = WorkflowReport::from_workflow(&workflow);
            report.status = persisted_status;
            return Ok(report);
        }

        self.verify_agents(&workflow)?;
        workflow.start(&*self.clock)?;
        tracing::info!(workflow = %workflow.id(), "workflow resumed");

        let controls = self.register_controls(workflow.id());
        let outcome = async {
            self.persist_workflow(&workflow, &definition).await?;
            self.drive(&mut workflow, &definition, &controls).await
        }
        .await;
        self.unregister_controls(workflow.id());
        outcome?;
        Ok(WorkflowReport::from_workflow(&workflow))
    }

    /// Resumes every persisted workflow that never reached an end state.
    ///
    /// # Errors
    ///
    /// Returns the first persistence or interpretation error raised.
    pub async fn resume_incomplete(&self) -> EngineResult<Vec<WorkflowReport>> {
        let mut reports = Vec::new();
        for record in self.store.list_workflows().await? {
            let status = WorkflowStatus::try_from(record.status.as_str())
                .map_err(|err| EngineError::CorruptProgress(err.to_string()))?;
            if status.is_terminal() {
                continue;
            }
            reports.push(self.resume(WorkflowId::from_uuid(record.workflow_id)).await?);
        }
        Ok(reports)
    }

    fn verify_agents(&self, workflow: &Workflow) -> EngineResult<()> {
        for step in workflow.steps() {
            self.registry
                .resolve(step.agent_ref())
                .map_err(|source| EngineError::AgentResolution {
                    step: step.id().clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn register_controls(&self, workflow_id: WorkflowId) -> Arc<EngineControls> {
        let controls = Arc::new(EngineControls {
            cancel: watch::channel(false).0,
            pause: watch::channel(false).0,
        });
        if let Ok(mut map) = self.controls.lock() {
            map.insert(workflow_id, Arc::clone(&controls));
        }
        controls
    }

    fn unregister_controls(&self, workflow_id: WorkflowId) {
        if let Ok(mut map) = self.controls.lock() {
            map.remove(&workflow_id);
        }
    }

    fn find_controls(&self, workflow_id: WorkflowId) -> EngineResult<Arc<EngineControls>> {
        self.controls
            .lock()
            .ok()
            .and_then(|map| map.get(&workflow_id).cloned())
            .ok_or(EngineError::UnknownWorkflow(workflow_id))
    }

    async fn drive(
        &self,
        workflow: &mut Workflow,
        definition: &WorkflowDefinition,
        controls: &Arc<EngineControls>,
    ) -> EngineResult<()> {
        let global = Arc::new(Semaphore::new(self.config.max_concurrent_steps));
        let mut per_agent: HashMap<String, Arc<Semaphore>> = HashMap::new();
        let mut inflight: JoinSet<EngineEvent> = JoinSet::new();
        let mut cancel_rx = controls.cancel.subscribe();
        let mut pause_rx = controls.pause.subscribe();

        loop {
            if *cancel_rx.borrow() {
                return self
                    .settle_cancellation(workflow, definition, &mut inflight)
                    .await;
            }
            if *pause_rx.borrow() {
                self.hold_while_paused(workflow, definition, &mut pause_rx, &mut cancel_rx)
                    .await?;
                continue;
            }

            self.promote_ready(workflow).await?;
            self.dispatch_ready(workflow, &global, &mut per_agent, &mut inflight)
                .await?;

            if inflight.is_empty() {
                if workflow.dispatchable_steps().is_empty()
                    && workflow.ready_candidates().is_empty()
                {
                    break;
                }
                continue;
            }

            tokio::select! {
                joined = inflight.join_next() => {
                    let Some(event) = flatten_join(joined) else { continue };
                    let signal = self.apply_event(workflow, event, &mut inflight).await?;
                    if signal == LoopSignal::Halt {
                        self.drain_after_failure(workflow, &mut inflight).await?;
                        self.persist_workflow(workflow, definition).await?;
                        return Ok(());
                    }
                }
                _ = cancel_rx.changed() => {}
                _ = pause_rx.changed() => {}
            }
        }

        self.settle_completion(workflow, definition).await
    }

    async fn promote_ready(&self, workflow: &mut Workflow) -> EngineResult<()> {
        for step_id in workflow.ready_candidates() {
            workflow.mark_step_ready(&step_id, &*self.clock)?;
            self.persist_step(workflow, &step_id).await?;
        }
        Ok(())
    }

    async fn dispatch_ready(
        &self,
        workflow: &mut Workflow,
        global: &Arc<Semaphore>,
        per_agent: &mut HashMap<String, Arc<Semaphore>>,
        inflight: &mut JoinSet<EngineEvent>,
    ) -> EngineResult<()> {
        for step_id in workflow.dispatchable_steps() {
            let Ok(global_permit) = Arc::clone(global).try_acquire_owned() else {
                break;
            };

            let agent_ref = workflow
                .step(&step_id)
                .map(|step| step.agent_ref().to_owned())
                .ok_or_else(|| WorkflowDomainError::UnknownStep(step_id.clone()))?;
            let resolved = match self.registry.resolve(&agent_ref) {
                Ok(descriptor) => descriptor.name().clone(),
                Err(err) => {
                    // The agent vanished between validation and dispatch;
                    // count the attempt and let retry policy handle it.
                    workflow.begin_step(&step_id, &*self.clock)?;
                    self.persist_step(workflow, &step_id).await?;
                    let reason = err.to_string();
                    inflight.spawn(async move {
                        EngineEvent::Finished {
                            step_id,
                            outcome: Err(reason),
                        }
                    });
                    continue;
                }
            };

            let agent_semaphore = Arc::clone(
                per_agent
                    .entry(resolved.to_string())
                    .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_agent_concurrency))),
            );
            let Ok(agent_permit) = agent_semaphore.try_acquire_owned() else {
                continue;
            };

            let (task_type, parameters, timeout) = {
                let step = workflow
                    .step(&step_id)
                    .ok_or_else(|| WorkflowDomainError::UnknownStep(step_id.clone()))?;
                (
                    step.task_type().to_owned(),
                    step.parameters().clone(),
                    step.timeout(),
                )
            };
            let context = workflow.context_snapshot();
            workflow.begin_step(&step_id, &*self.clock)?;
            self.persist_step(workflow, &step_id).await?;
            tracing::info!(
                workflow = %workflow.id(),
                step = %step_id,
                agent = %resolved,
                "step dispatched"
            );

            let payload = serde_json::to_value(TaskRequest::new(task_type, parameters, context))?;
            let message = Message::new(
                self.engine_party.clone(),
                resolved,
                TASK_DISPATCH,
                Priority::Medium,
                payload,
                &*self.clock,
            )
            .and_then(|message| message.with_timeout(timeout))
            .map_err(BusError::from)?;

            let bus = Arc::clone(&self.bus);
            inflight.spawn(async move {
                let _permits = (global_permit, agent_permit);
                let outcome = match bus.request(message).await {
                    Ok(reply) => match serde_json::from_value::<TaskOutcome>(reply.into_payload())
                    {
                        Ok(TaskOutcome::Success { result }) => Ok(result),
                        Ok(TaskOutcome::Failure { error }) => Err(error),
                        Err(err) => Err(format!("malformed agent outcome: {err}")),
                    },
                    Err(err) => Err(err.to_string()),
                };
                EngineEvent::Finished { step_id, outcome }
            });
        }
        Ok(())
    }

    async fn apply_event(
        &self,
        workflow: &mut Workflow,
        event: EngineEvent,
        inflight: &mut JoinSet<EngineEvent>,
    ) -> EngineResult<LoopSignal> {
        match event {
            EngineEvent::RetryDue(step_id) => {
                workflow.mark_step_ready(&step_id, &*self.clock)?;
                self.persist_step(workflow, &step_id).await?;
                Ok(LoopSignal::Continue)
            }
            EngineEvent::Finished {
                step_id,
                outcome: Ok(result),
            } => {
                workflow.succeed_step(&step_id, result, &*self.clock)?;
                self.persist_step(workflow, &step_id).await?;
                tracing::info!(workflow = %workflow.id(), step = %step_id, "step succeeded");
                Ok(LoopSignal::Continue)
            }
            EngineEvent::Finished {
                step_id,
                outcome: Err(error),
            } => self.apply_failure(workflow, step_id, &error, inflight).await,
        }
    }

    async fn apply_failure(
        &self,
        workflow: &mut Workflow,
        step_id: StepId,
        error: &str,
        inflight: &mut JoinSet<EngineEvent>,
    ) -> EngineResult<LoopSignal> {
        workflow.fail_step(&step_id, error, &*self.clock)?;
        self.persist_step(workflow, &step_id).await?;

        let (can_retry, optional, attempts) = {
            let step = workflow
                .step(&step_id)
                .ok_or_else(|| WorkflowDomainError::UnknownStep(step_id.clone()))?;
            (step.can_retry(), step.is_optional(), step.attempt_count())
        };

        if can_retry {
            workflow.retry_step(&step_id, &*self.clock)?;
            self.persist_step(workflow, &step_id).await?;
            let delay = self.config.retry_backoff.delay_for_attempt(attempts);
            tracing::warn!(
                workflow = %workflow.id(),
                step = %step_id,
                attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error,
                "step failed, retrying after backoff"
            );
            inflight.spawn(async move {
                tokio::time::sleep(delay).await;
                EngineEvent::RetryDue(step_id)
            });
            return Ok(LoopSignal::Continue);
        }

        if optional {
            workflow.skip_step(&step_id, &*self.clock)?;
            self.persist_step(workflow, &step_id).await?;
            tracing::warn!(
                workflow = %workflow.id(),
                step = %step_id,
                error,
                "optional step exhausted attempts, skipped"
            );
            return Ok(LoopSignal::Continue);
        }

        tracing::error!(
            workflow = %workflow.id(),
            step = %step_id,
            attempts,
            error,
            "required step exhausted attempts"
        );
        self.escalate(workflow, &step_id, error, attempts)?;
        workflow.fail(&*self.clock)?;
        Ok(LoopSignal::Halt)
    }

    fn escalate(
        &self,
        workflow: &Workflow,
        step_id: &StepId,
        error: &str,
        attempts: u32,
    ) -> EngineResult<()> {
        let message = Message::publication(
            self.engine_party.clone(),
            "human_intervention",
            Priority::Critical,
            json!({
                "workflow_id": workflow.id(),
                "workflow": workflow.name(),
                "step": step_id,
                "error": error,
                "attempts": attempts,
            }),
            &*self.clock,
        )
        .map_err(BusError::from)?;
        let delivered = self.bus.publish(&self.escalation_topic, &message)?;
        tracing::error!(
            workflow = %workflow.id(),
            step = %step_id,
            subscribers = delivered,
            "human intervention escalated"
        );
        Ok(())
    }

    /// Records outcomes of dispatches that were already in flight when
    /// the workflow failed; partial results stay inspectable.
    async fn drain_after_failure(
        &self,
        workflow: &mut Workflow,
        inflight: &mut JoinSet<EngineEvent>,
    ) -> EngineResult<()> {
        while let Some(joined) = inflight.join_next().await {
            let Some(event) = flatten_join(Some(joined)) else {
                continue;
            };
            match event {
                EngineEvent::Finished {
                    step_id,
                    outcome: Ok(result),
                } => {
                    workflow.succeed_step(&step_id, result, &*self.clock)?;
                    self.persist_step(workflow, &step_id).await?;
                }
                EngineEvent::Finished {
                    step_id,
                    outcome: Err(error),
                } => {
                    workflow.fail_step(&step_id, &error, &*self.clock)?;
                    self.persist_step(workflow, &step_id).await?;
                    let optional = workflow
                        .step(&step_id)
                        .is_some_and(WorkflowStep::is_optional);
                    if optional {
                        workflow.skip_step(&step_id, &*self.clock)?;
                        self.persist_step(workflow, &step_id).await?;
                    }
                }
                EngineEvent::RetryDue(_) => {}
            }
        }
        Ok(())
    }

    async fn settle_cancellation(
        &self,
        workflow: &mut Workflow,
        definition: &WorkflowDefinition,
        inflight: &mut JoinSet<EngineEvent>,
    ) -> EngineResult<()> {
        // Running steps finish on their own time; their results are
        // discarded and every non-terminal step ends up skipped.
        while let Some(joined) = inflight.join_next().await {
            drop(joined);
        }
        workflow.cancel(&*self.clock)?;
        for step_id in workflow.steps().iter().map(|s| s.id().clone()).collect::<Vec<_>>() {
            self.persist_step(workflow, &step_id).await?;
        }
        self.persist_workflow(workflow, definition).await?;
        tracing::info!(workflow = %workflow.id(), "workflow cancelled");
        Ok(())
    }

    async fn hold_while_paused(
        &self,
        workflow: &mut Workflow,
        definition: &WorkflowDefinition,
        pause_rx: &mut watch::Receiver<bool>,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> EngineResult<()> {
        workflow.pause(&*self.clock)?;
        self.persist_workflow(workflow, definition).await?;
        tracing::info!(workflow = %workflow.id(), "workflow paused");

        loop {
            tokio::select! {
                changed = pause_rx.changed() => {
                    if changed.is_err() || !*pause_rx.borrow() {
                        break;
                    }
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        break;
                    }
                }
            }
        }

        if !*cancel_rx.borrow() {
            workflow.resume_paused(&*self.clock)?;
            self.persist_workflow(workflow, definition).await?;
            tracing::info!(workflow = %workflow.id(), "workflow resumed from pause");
        }
        Ok(())
    }

    async fn settle_completion(
        &self,
        workflow: &mut Workflow,
        definition: &WorkflowDefinition,
    ) -> EngineResult<()> {
        if workflow.status() == WorkflowStatus::Running {
            if workflow.all_required_terminal_success() {
                workflow.complete(&*self.clock)?;
            } else {
                workflow.fail(&*self.clock)?;
            }
        }
        self.persist_workflow(workflow, definition).await
    }

    fn restore_steps(
        &self,
        workflow: &mut Workflow,
        records: &[StepRecord],
    ) -> EngineResult<()> {
        for record in records {
            let step_id = StepId::new(&record.step_id)?;
            let status = StepStatus::try_from(record.status.as_str())
                .map_err(|err| EngineError::CorruptProgress(err.to_string()))?;
            let max_attempts = workflow
                .step(&step_id)
                .map(WorkflowStep::max_attempts)
                .ok_or_else(|| {
                    EngineError::CorruptProgress(format!("record for unknown step: {step_id}"))
                })?;

            let restored_status = if status.is_terminal_success() {
                status
            } else if status == StepStatus::Failed && record.attempt_count >= max_attempts {
                StepStatus::Failed
            } else {
                // Interrupted mid-flight: re-evaluate for dispatch with
                // the attempt count preserved.
                StepStatus::Pending
            };
            workflow.restore_step(
                &step_id,
                RestoredStepData {
                    status: restored_status,
                    attempt_count: record.attempt_count,
                    result: record.result.clone(),
                    error: record.error.clone(),
                },
            )?;
        }
        Ok(())
    }

    async fn persist_workflow(
        &self,
        workflow: &Workflow,
        definition: &WorkflowDefinition,
    ) -> EngineResult<()> {
        let record = WorkflowRecord {
            workflow_id: workflow.id().into_inner(),
            name: workflow.name().to_owned(),
            status: workflow.status().as_str().to_owned(),
            definition: serde_json::to_value(definition)?,
            updated_at: self.clock.utc(),
        };
        self.store.save_workflow_record(&record).await?;
        Ok(())
    }

    async fn persist_step(&self, workflow: &Workflow, step_id: &StepId) -> EngineResult<()> {
        let step = workflow
            .step(step_id)
            .ok_or_else(|| WorkflowDomainError::UnknownStep(step_id.clone()))?;
        let record = StepRecord {
            step_id: step.id().to_string(),
            status: step.status().as_str().to_owned(),
            attempt_count: step.attempt_count(),
            result: step.result().cloned(),
            error: step.error().map(str::to_owned),
            recorded_at: self.clock.utc(),
        };
        self.store
            .save_step_result(workflow.id().into_inner(), &record)
            .await?;
        Ok(())
    }
}

fn flatten_join(
    joined: Option<Result<EngineEvent, tokio::task::JoinError>>,
) -> Option<EngineEvent> {
    match joined {
        Some(Ok(event)) => Some(event),
        Some(Err(err)) => {
            tracing::error!(error = %err, "dispatch task ended abnormally");
            None
        }
        None => None,
    }
}
