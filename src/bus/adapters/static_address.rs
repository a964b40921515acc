//! Fixed address book for tests and standalone bus use.

use crate::bus::ports::AddressBook;
use crate::registry::domain::AgentName;
use std::collections::HashSet;

/// Address book over a fixed set of names.
#[derive(Debug, Clone, Default)]
pub struct StaticAddressBook {
    names: HashSet<AgentName>,
}

impl StaticAddressBook {
    /// Creates an address book over the given names.
    #[must_use]
    pub fn new(names: impl IntoIterator<Item = AgentName>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }
}

impl AddressBook for StaticAddressBook {
    fn contains(&self, name: &AgentName) -> bool {
        self.names.contains(name)
    }
}
