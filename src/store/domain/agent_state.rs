//! Persisted per-agent state snapshot.

use crate::registry::domain::AgentName;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One timestamped entry of an agent's working memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The recorded content.
    pub entry: Value,
}

/// Cumulative execution counters for an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Tasks that completed successfully.
    pub tasks_succeeded: u64,
    /// Tasks that ended in failure.
    pub tasks_failed: u64,
    /// Total time spent executing, in milliseconds.
    pub total_execution_ms: u64,
}

/// Snapshot of an agent's working state between tasks.
///
/// Written by the agent runner after each executed step and read back for
/// crash recovery and warm-start context. The in-snapshot memory is
/// bounded: [`AgentState::remember`] evicts the oldest entries first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    agent_id: AgentName,
    current_task: Option<String>,
    context: Value,
    memory: Vec<ContextEntry>,
    metrics: AgentMetrics,
    updated_at: DateTime<Utc>,
}

impl AgentState {
    /// Creates an empty state snapshot for an agent.
    #[must_use]
    pub fn new(agent_id: AgentName, clock: &impl Clock) -> Self {
        Self {
            agent_id,
            current_task: None,
            context: Value::Null,
            memory: Vec::new(),
            metrics: AgentMetrics::default(),
            updated_at: clock.utc(),
        }
    }

    /// Returns the owning agent's name.
    #[must_use]
    pub const fn agent_id(&self) -> &AgentName {
        &self.agent_id
    }

    /// Returns the task currently being executed, if any.
    #[must_use]
    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref()
    }

    /// Returns the warm-start context document.
    #[must_use]
    pub const fn context(&self) -> &Value {
        &self.context
    }

    /// Returns the bounded working memory, oldest first.
    #[must_use]
    pub fn memory(&self) -> &[ContextEntry] {
        &self.memory
    }

    /// Returns the cumulative execution counters.
    #[must_use]
    pub const fn metrics(&self) -> AgentMetrics {
        self.metrics
    }

    /// Returns when the snapshot last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Marks a task as in progress.
    pub fn begin_task(&mut self, task: impl Into<String>, clock: &impl Clock) {
        self.current_task = Some(task.into());
        self.touch(clock);
    }

    /// Clears the in-progress task and counts a success.
    pub fn record_success(&mut self, elapsed: Duration, clock: &impl Clock) {
        self.current_task = None;
        self.metrics.tasks_succeeded += 1;
        self.add_execution_time(elapsed);
        self.touch(clock);
    }

    /// Clears the in-progress task and counts a failure.
    pub fn record_failure(&mut self, elapsed: Duration, clock: &impl Clock) {
        self.current_task = None;
        self.metrics.tasks_failed += 1;
        self.add_execution_time(elapsed);
        self.touch(clock);
    }

    /// Replaces the warm-start context document.
    pub fn set_context(&mut self, context: Value, clock: &impl Clock) {
        self.context = context;
        self.touch(clock);
    }

    /// Appends a memory entry, evicting the oldest beyond `retention`.
    pub fn remember(&mut self, entry: Value, retention: usize, clock: &impl Clock) {
        self.memory.push(ContextEntry {
            recorded_at: clock.utc(),
            entry,
        });
        let excess = self.memory.len().saturating_sub(retention.max(1));
        if excess > 0 {
            self.memory.drain(..excess);
        }
        self.touch(clock);
    }

    fn add_execution_time(&mut self, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.metrics.total_execution_ms = self.metrics.total_execution_ms.saturating_add(millis);
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
