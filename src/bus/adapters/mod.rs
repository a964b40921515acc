//! Adapter implementations of the bus ports.

mod static_address;

pub use static_address::StaticAddressBook;
