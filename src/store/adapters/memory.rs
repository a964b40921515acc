//! In-memory state store for tests.

use crate::registry::domain::AgentName;
use crate::store::domain::{AgentState, ContextEntry, StepRecord, WorkflowProgress, WorkflowRecord};
use crate::store::ports::{StateRepository, StateStoreError, StateStoreResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct StoreState {
    agent_states: HashMap<AgentName, AgentState>,
    contexts: HashMap<AgentName, VecDeque<ContextEntry>>,
    workflows: HashMap<Uuid, WorkflowRecord>,
    step_records: HashMap<Uuid, Vec<StepRecord>>,
}

/// Thread-safe in-memory state repository.
#[derive(Debug)]
pub struct InMemoryStateStore {
    retention: usize,
    state: RwLock<StoreState>,
}

impl InMemoryStateStore {
    /// Creates an empty store retaining `retention` context entries per
    /// agent.
    #[must_use]
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            state: RwLock::new(StoreState::default()),
        }
    }

    fn read_state(&self) -> StateStoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|err| StateStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write_state(&self) -> StateStoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|err| StateStoreError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl StateRepository for InMemoryStateStore {
    async fn save_agent_state(&self, state: &AgentState) -> StateStoreResult<()> {
        let mut store = self.write_state()?;
        store
            .agent_states
            .insert(state.agent_id().clone(), state.clone());
        Ok(())
    }

    async fn load_agent_state(&self, agent_id: &AgentName) -> StateStoreResult<AgentState> {
        let store = self.read_state()?;
        store
            .agent_states
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StateStoreError::AgentStateNotFound(agent_id.clone()))
    }

    async fn append_context(
        &self,
        agent_id: &AgentName,
        entry: ContextEntry,
    ) -> StateStoreResult<()> {
        let mut store = self.write_state()?;
        let history = store.contexts.entry(agent_id.clone()).or_default();
        history.push_back(entry);
        while history.len() > self.retention {
            history.pop_front();
        }
        Ok(())
    }

    async fn load_context(&self, agent_id: &AgentName) -> StateStoreResult<Vec<ContextEntry>> {
        let store = self.read_state()?;
        Ok(store
            .contexts
            .get(agent_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_workflow_record(&self, record: &WorkflowRecord) -> StateStoreResult<()> {
        let mut store = self.write_state()?;
        store.workflows.insert(record.workflow_id, record.clone());
        Ok(())
    }

    async fn save_step_result(
        &self,
        workflow_id: Uuid,
        record: &StepRecord,
    ) -> StateStoreResult<()> {
        let mut store = self.write_state()?;
        let records = store.step_records.entry(workflow_id).or_default();
        if let Some(existing) = records.iter_mut().find(|r| r.step_id == record.step_id) {
            *existing = record.clone();
        } else {
            records.push(record.clone());
        }
        Ok(())
    }

    async fn load_workflow_progress(
        &self,
        workflow_id: Uuid,
    ) -> StateStoreResult<Option<WorkflowProgress>> {
        let store = self.read_state()?;
        let Some(workflow) = store.workflows.get(&workflow_id).cloned() else {
            return Ok(None);
        };
        let steps = store
            .step_records
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default();
        Ok(Some(WorkflowProgress { workflow, steps }))
    }

    async fn list_workflows(&self) -> StateStoreResult<Vec<WorkflowRecord>> {
        let store = self.read_state()?;
        Ok(store.workflows.values().cloned().collect())
    }
}
