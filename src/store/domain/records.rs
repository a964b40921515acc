//! Persisted workflow progress records.
//!
//! The store keeps workflow state in its storage representation (status
//! strings, opaque definition documents) so it stays independent of the
//! scheduler's domain types; the engine converts on the way in and out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Persisted outcome of one workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step identifier, unique within its workflow.
    pub step_id: String,
    /// Storage representation of the step status.
    pub status: String,
    /// Dispatch attempts made so far.
    pub attempt_count: u32,
    /// Result payload of a successful attempt.
    pub result: Option<Value>,
    /// Last error of a failed attempt.
    pub error: Option<String>,
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

/// Persisted workflow header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Workflow identifier.
    pub workflow_id: Uuid,
    /// Workflow name from its definition.
    pub name: String,
    /// Storage representation of the workflow status.
    pub status: String,
    /// The submitted definition document, kept for resumption.
    pub definition: Value,
    /// When the record was written.
    pub updated_at: DateTime<Utc>,
}

/// A workflow header with all persisted step records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    /// The persisted workflow header.
    pub workflow: WorkflowRecord,
    /// Persisted step outcomes, one per recorded step.
    pub steps: Vec<StepRecord>,
}
