//! Domain types for the communication bus.

mod delivery;
mod error;
mod ids;
mod message;
mod priority;

pub use delivery::DeliveryGuarantee;
pub use error::BusDomainError;
pub use ids::{MessageId, TopicName};
pub use message::Message;
pub use priority::{ParsePriorityError, Priority};
