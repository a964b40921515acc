//! Port contracts for the state store.

mod repository;

pub use repository::{StateRepository, StateStoreError, StateStoreResult};
