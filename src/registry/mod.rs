//! Agent capability catalog for the coordination core.
//!
//! Agents announce themselves through explicit registration (or a manifest
//! document a collaborator reports); the registry indexes descriptors by
//! name, category, and specialization, orders declared dependencies, and
//! rejects conflicting registrations. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
