//! Persisted registry catalog document.

use super::{AgentDescriptor, AgentName, CategoryName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted shape of the registry: descriptors keyed by name plus the
/// per-category name lists in their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCatalog {
    #[serde(default)]
    agents: BTreeMap<AgentName, AgentDescriptor>,
    #[serde(default)]
    categories: BTreeMap<CategoryName, Vec<AgentName>>,
}

impl RegistryCatalog {
    /// Creates a catalog document from its parts.
    #[must_use]
    pub const fn new(
        agents: BTreeMap<AgentName, AgentDescriptor>,
        categories: BTreeMap<CategoryName, Vec<AgentName>>,
    ) -> Self {
        Self { agents, categories }
    }

    /// Returns the descriptors keyed by agent name.
    #[must_use]
    pub const fn agents(&self) -> &BTreeMap<AgentName, AgentDescriptor> {
        &self.agents
    }

    /// Returns the category index (names in insertion order).
    #[must_use]
    pub const fn categories(&self) -> &BTreeMap<CategoryName, Vec<AgentName>> {
        &self.categories
    }

    /// Returns the number of catalogued agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns whether the catalog holds no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Consumes the catalog into its parts.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<AgentName, AgentDescriptor>,
        BTreeMap<CategoryName, Vec<AgentName>>,
    ) {
        (self.agents, self.categories)
    }
}
