//! Agent capability descriptor.

use super::{AgentName, CategoryName, RegistryDomainError};
use serde::{Deserialize, Serialize};

const fn default_enabled() -> bool {
    true
}

/// Capability descriptor an agent implementation registers under.
///
/// Descriptors are the registry's unit of cataloguing: a unique name, the
/// capability category the agent serves, optional specializations within
/// that category, a version string, and the names of other agents it
/// depends on. A descriptor is replaced only by re-registration and
/// removed only by explicit deregistration.
///
/// Empty `specializations` and `dependencies` serialize as empty sequences,
/// never as nulls, and missing fields deserialize to empty sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    name: AgentName,
    category: CategoryName,
    #[serde(default)]
    specializations: Vec<String>,
    version: String,
    #[serde(default)]
    dependencies: Vec<AgentName>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

impl AgentDescriptor {
    /// Creates an enabled descriptor with no specializations or
    /// dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::EmptyVersion`] when the version is
    /// empty after trimming.
    pub fn new(
        name: AgentName,
        category: CategoryName,
        version: impl Into<String>,
    ) -> Result<Self, RegistryDomainError> {
        let normalized_version = version.into().trim().to_owned();
        if normalized_version.is_empty() {
            return Err(RegistryDomainError::EmptyVersion);
        }
        Ok(Self {
            name,
            category,
            specializations: Vec::new(),
            version: normalized_version,
            dependencies: Vec::new(),
            enabled: true,
        })
    }

    /// Sets the specializations, normalized to trimmed lowercase with
    /// empty entries dropped.
    #[must_use]
    pub fn with_specializations(
        mut self,
        specializations: impl IntoIterator<Item = String>,
    ) -> Self {
        self.specializations = specializations
            .into_iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    /// Sets the declared dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = AgentName>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    /// Marks the descriptor as disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns the unique agent name.
    #[must_use]
    pub const fn name(&self) -> &AgentName {
        &self.name
    }

    /// Returns the capability category.
    #[must_use]
    pub const fn category(&self) -> &CategoryName {
        &self.category
    }

    /// Returns the specializations within the category.
    #[must_use]
    pub fn specializations(&self) -> &[String] {
        &self.specializations
    }

    /// Returns the version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the names of agents this agent depends on.
    #[must_use]
    pub fn dependencies(&self) -> &[AgentName] {
        &self.dependencies
    }

    /// Returns whether the agent is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether the descriptor declares the given specialization.
    #[must_use]
    pub fn has_specialization(&self, specialization: &str) -> bool {
        self.specializations
            .iter()
            .any(|s| s == specialization)
    }
}
