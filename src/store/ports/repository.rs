//! State persistence port.

use crate::registry::domain::AgentName;
use crate::store::domain::{AgentState, ContextEntry, StepRecord, WorkflowProgress, WorkflowRecord};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Result type for state store operations.
pub type StateStoreResult<T> = Result<T, StateStoreError>;

/// Durable state persistence contract.
///
/// Writes for the same agent are serialized by implementations; writes
/// for different agents proceed independently. Snapshot writes are atomic
/// so a crash never leaves a torn state file behind.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Persists an agent state snapshot, superseding the previous one.
    async fn save_agent_state(&self, state: &AgentState) -> StateStoreResult<()>;

    /// Loads the latest state snapshot for an agent.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::AgentStateNotFound`] on first run.
    async fn load_agent_state(&self, agent_id: &AgentName) -> StateStoreResult<AgentState>;

    /// Appends a context entry to the agent's bounded history.
    ///
    /// Once the configured retention is reached, the oldest entries are
    /// evicted first.
    async fn append_context(
        &self,
        agent_id: &AgentName,
        entry: ContextEntry,
    ) -> StateStoreResult<()>;

    /// Loads the retained context history, oldest first.
    async fn load_context(&self, agent_id: &AgentName) -> StateStoreResult<Vec<ContextEntry>>;

    /// Persists a workflow header, superseding the previous one.
    async fn save_workflow_record(&self, record: &WorkflowRecord) -> StateStoreResult<()>;

    /// Persists a step outcome, superseding any record for the same step.
    async fn save_step_result(
        &self,
        workflow_id: Uuid,
        record: &StepRecord,
    ) -> StateStoreResult<()>;

    /// Loads a workflow header with all recorded step outcomes.
    ///
    /// Returns `Ok(None)` when the workflow was never persisted.
    async fn load_workflow_progress(
        &self,
        workflow_id: Uuid,
    ) -> StateStoreResult<Option<WorkflowProgress>>;

    /// Lists all persisted workflow headers.
    async fn list_workflows(&self) -> StateStoreResult<Vec<WorkflowRecord>>;
}

/// Errors returned by state repository implementations.
#[derive(Debug, Clone, Error)]
pub enum StateStoreError {
    /// No snapshot has been written for the agent yet.
    #[error("no persisted state for agent: {0}")]
    AgentStateNotFound(AgentName),

    /// Persisted data could not be parsed or rendered.
    #[error("invalid persisted state: {0}")]
    Serialization(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("state persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StateStoreError {
    /// Wraps a parse or render error.
    pub fn serialization(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Serialization(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
