//! Durable state for agents and workflows.
//!
//! Crash-recoverable persistence of per-agent state snapshots, bounded
//! context history, step results, and workflow progress. The workflow
//! engine reads this store on startup to resume in-flight work instead of
//! restarting it. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
