//! Orchestration services for the agent registry.

mod registry;

pub use registry::{AgentRegistry, AgentResolution, DiscoveryReport, RegistryError, RegistryResult};
