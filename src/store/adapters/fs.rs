//! Filesystem state store built on capability-scoped directories.
//!
//! Layout under the store root:
//!
//! ```text
//! agents/<agent_id>/state.json          latest snapshot
//! agents/<agent_id>/context/<seq>.json  bounded context history
//! workflows/<workflow_id>/workflow.json workflow header
//! workflows/<workflow_id>/steps/<step_id>.json
//! ```
//!
//! Every document write lands in a temporary sibling first and is renamed
//! into place, so a crash never leaves a torn file. Writes for one agent
//! are serialized behind a per-agent lock; different agents write
//! independently.

use crate::registry::domain::AgentName;
use crate::store::domain::{AgentState, ContextEntry, StepRecord, WorkflowProgress, WorkflowRecord};
use crate::store::ports::{StateRepository, StateStoreError, StateStoreResult};
use async_trait::async_trait;
use cap_std::fs_utf8::Dir;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn write_atomic(dir: &Dir, file_name: &str, contents: &str) -> std::io::Result<()> {
    let temp_name = format!("{file_name}.tmp");
    dir.write(&temp_name, contents.as_bytes())?;
    dir.rename(&temp_name, dir, file_name)
}

fn write_document<T: Serialize>(dir: &Dir, file_name: &str, value: &T) -> StateStoreResult<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(StateStoreError::serialization)?;
    write_atomic(dir, file_name, &rendered).map_err(StateStoreError::persistence)
}

fn read_document<T: DeserializeOwned>(dir: &Dir, file_name: &str) -> StateStoreResult<Option<T>> {
    let raw = match dir.read_to_string(file_name) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StateStoreError::persistence(err)),
    };
    let value = serde_json::from_str(&raw).map_err(StateStoreError::serialization)?;
    Ok(Some(value))
}

/// Lists the `.json` file stems of a directory.
fn json_stems(dir: &Dir) -> StateStoreResult<Vec<String>> {
    let mut stems = Vec::new();
    let entries = dir.entries().map_err(StateStoreError::persistence)?;
    for entry in entries {
        let entry = entry.map_err(StateStoreError::persistence)?;
        let file_name = entry.file_name().map_err(StateStoreError::persistence)?;
        if let Some(stem) = file_name.strip_suffix(".json") {
            stems.push(stem.to_owned());
        }
    }
    stems.sort();
    Ok(stems)
}

/// State repository persisting JSON documents under a directory handle.
#[derive(Debug)]
pub struct FsStateStore {
    root: Dir,
    retention: usize,
    agent_locks: Mutex<HashMap<AgentName, Arc<tokio::sync::Mutex<()>>>>,
}

impl FsStateStore {
    /// Creates a store rooted at the given directory handle, retaining
    /// `retention` context entries per agent.
    #[must_use]
    pub fn new(root: Dir, retention: usize) -> Self {
        Self {
            root,
            retention: retention.max(1),
            agent_locks: Mutex::new(HashMap::new()),
        }
    }

    fn agent_lock(&self, agent_id: &AgentName) -> StateStoreResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .agent_locks
            .lock()
            .map_err(|err| StateStoreError::persistence(std::io::Error::other(err.to_string())))?;
        Ok(Arc::clone(locks.entry(agent_id.clone()).or_default()))
    }

    fn open_or_create(&self, path: &str) -> StateStoreResult<Dir> {
        self.root
            .create_dir_all(path)
            .map_err(StateStoreError::persistence)?;
        self.root.open_dir(path).map_err(StateStoreError::persistence)
    }

    fn open_existing(&self, path: &str) -> StateStoreResult<Option<Dir>> {
        match self.root.open_dir(path) {
            Ok(dir) => Ok(Some(dir)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StateStoreError::persistence(err)),
        }
    }

    fn context_sequences(dir: &Dir) -> StateStoreResult<Vec<u64>> {
        let mut sequences: Vec<u64> = json_stems(dir)?
            .iter()
            .filter_map(|stem| stem.parse().ok())
            .collect();
        sequences.sort_unstable();
        Ok(sequences)
    }
}

#[async_trait]
impl StateRepository for FsStateStore {
    async fn save_agent_state(&self, state: &AgentState) -> StateStoreResult<()> {
        let lock = self.agent_lock(state.agent_id())?;
        let _guard = lock.lock().await;
        let dir = self.open_or_create(&format!("agents/{}", state.agent_id()))?;
        write_document(&dir, "state.json", state)
    }

    async fn load_agent_state(&self, agent_id: &AgentName) -> StateStoreResult<AgentState> {
        let Some(dir) = self.open_existing(&format!("agents/{agent_id}"))? else {
            return Err(StateStoreError::AgentStateNotFound(agent_id.clone()));
        };
        read_document(&dir, "state.json")?
            .ok_or_else(|| StateStoreError::AgentStateNotFound(agent_id.clone()))
    }

    async fn append_context(
        &self,
        agent_id: &AgentName,
        entry: ContextEntry,
    ) -> StateStoreResult<()> {
        let lock = self.agent_lock(agent_id)?;
        let _guard = lock.lock().await;
        let dir = self.open_or_create(&format!("agents/{agent_id}/context"))?;
        let mut sequences = Self::context_sequences(&dir)?;
        let next = sequences.last().map_or(0, |last| last + 1);
        write_document(&dir, &format!("{next:06}.json"), &entry)?;
        sequences.push(next);

        let excess = sequences.len().saturating_sub(self.retention);
        for stale in sequences.iter().take(excess) {
            dir.remove_file(format!("{stale:06}.json"))
                .map_err(StateStoreError::persistence)?;
        }
        Ok(())
    }

    async fn load_context(&self, agent_id: &AgentName) -> StateStoreResult<Vec<ContextEntry>> {
        let Some(dir) = self.open_existing(&format!("agents/{agent_id}/context"))? else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for sequence in Self::context_sequences(&dir)? {
            if let Some(entry) = read_document(&dir, &format!("{sequence:06}.json"))? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn save_workflow_record(&self, record: &WorkflowRecord) -> StateStoreResult<()> {
        let dir = self.open_or_create(&format!("workflows/{}", record.workflow_id))?;
        write_document(&dir, "workflow.json", record)
    }

    async fn save_step_result(
        &self,
        workflow_id: Uuid,
        record: &StepRecord,
    ) -> StateStoreResult<()> {
        let dir = self.open_or_create(&format!("workflows/{workflow_id}/steps"))?;
        write_document(&dir, &format!("{}.json", record.step_id), record)
    }

    async fn load_workflow_progress(
        &self,
        workflow_id: Uuid,
    ) -> StateStoreResult<Option<WorkflowProgress>> {
        let Some(dir) = self.open_existing(&format!("workflows/{workflow_id}"))? else {
            return Ok(None);
        };
        let Some(workflow) = read_document::<WorkflowRecord>(&dir, "workflow.json")? else {
            return Ok(None);
        };
        let mut steps = Vec::new();
        if let Some(steps_dir) = self.open_existing(&format!("workflows/{workflow_id}/steps"))? {
            for stem in json_stems(&steps_dir)? {
                if let Some(record) = read_document(&steps_dir, &format!("{stem}.json"))? {
                    steps.push(record);
                }
            }
        }
        Ok(Some(WorkflowProgress { workflow, steps }))
    }

    async fn list_workflows(&self) -> StateStoreResult<Vec<WorkflowRecord>> {
        let Some(dir) = self.open_existing("workflows")? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        let entries = dir.entries().map_err(StateStoreError::persistence)?;
        for entry in entries {
            let entry = entry.map_err(StateStoreError::persistence)?;
            let file_name = entry.file_name().map_err(StateStoreError::persistence)?;
            let Some(workflow_dir) = self.open_existing(&format!("workflows/{file_name}"))? else {
                continue;
            };
            if let Some(record) = read_document(&workflow_dir, "workflow.json")? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
