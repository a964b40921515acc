//! Port contracts for the communication bus.

mod address_book;

pub use address_book::AddressBook;
