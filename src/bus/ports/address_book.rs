//! Receiver address validation port.

use crate::registry::domain::AgentName;
use crate::registry::services::AgentRegistry;
use mockable::Clock;

/// Answers whether a receiver name is a known party.
///
/// The bus checks every `send` against this before enqueueing, so a typo
/// in a receiver name fails at send time instead of queueing into the
/// void. The agent registry is the production implementation.
pub trait AddressBook: Send + Sync {
    /// Returns whether the name can receive messages.
    fn contains(&self, name: &AgentName) -> bool;
}

impl<C> AddressBook for AgentRegistry<C>
where
    C: Clock + Send + Sync,
{
    fn contains(&self, name: &AgentName) -> bool {
        self.is_registered(name)
    }
}
