//! Inter-agent communication bus.
//!
//! Typed message passing between named parties with five urgency tiers,
//! FIFO order within a tier, request/response correlation, and topic
//! pub/sub with configurable delivery guarantees. The module follows
//! hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The bus service in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
