//! The workflow scheduling service.

mod engine;

pub use engine::{EngineConfig, EngineError, EngineResult, StepReport, WorkflowEngine, WorkflowReport};
