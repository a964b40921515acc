//! Domain types for the state store.

mod agent_state;
mod records;

pub use agent_state::{AgentMetrics, AgentState, ContextEntry};
pub use records::{StepRecord, WorkflowProgress, WorkflowRecord};
