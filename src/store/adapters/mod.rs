//! Adapter implementations of the state store ports.

mod fs;
mod memory;

pub use fs::FsStateStore;
pub use memory::InMemoryStateStore;
