//! Serde shape of a submitted workflow definition.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const fn default_max_attempts() -> u32 {
    3
}

const fn default_timeout_secs() -> u64 {
    60
}

/// One step of a workflow definition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step identifier, unique within the workflow.
    pub id: String,
    /// Agent name or specialization the step is bound to.
    pub agent: String,
    /// Task type handed to the agent.
    pub task: String,
    /// Task parameters, passed through verbatim.
    #[serde(default)]
    pub parameters: Value,
    /// Ids of steps that must finish first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether failure of this step may be skipped over.
    #[serde(default)]
    pub optional: bool,
    /// Dispatch attempts allowed before the step fails for good.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds the engine waits for the agent's response per attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// A submitted workflow definition document.
///
/// Structural validation (duplicate ids, unknown dependencies, cycles)
/// happens at submission, not at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Human-readable workflow name.
    pub name: String,
    /// The steps to schedule.
    pub steps: Vec<StepDefinition>,
    /// Optional named subsets of step ids tracked as fragments.
    #[serde(default)]
    pub fragments: BTreeMap<String, Vec<String>>,
}

impl WorkflowDefinition {
    /// Parses a definition document from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] when the document does not
    /// parse; malformed definitions are fatal at load, never silently
    /// ignored.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}
