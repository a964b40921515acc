//! The agent registry service.
//!
//! Catalogs capability descriptors, indexes them by category and
//! specialization, merges collaborator-reported manifests, and orders
//! declared dependencies. Mutation is single-writer: all writes go through
//! one write lock, and readers clone values out of a read lock so they
//! always observe a consistent snapshot.

use crate::registry::domain::{
    AgentDescriptor, AgentName, CategoryName, RegistryCatalog, RegistryDomainError,
};
use crate::registry::ports::{CatalogError, CatalogRepository, ManifestError, ManifestSource};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Result type for registry service operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by the registry service.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An agent with the same name is already registered.
    #[error("duplicate agent: {0}")]
    DuplicateAgent(AgentName),

    /// No enabled agent matched the name or specialization.
    #[error("no agent matches name or specialization: {0}")]
    AgentNotFound(String),

    /// A dependency chain loops back on itself.
    #[error("dependency cycle involving agent: {0}")]
    DependencyCycle(AgentName),

    /// A declared dependency is absent from the registry or disabled.
    #[error("missing or disabled dependency {dependency} required by {agent}")]
    MissingDependency {
        /// The agent declaring the dependency.
        agent: AgentName,
        /// The absent or disabled dependency.
        dependency: AgentName,
    },

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] RegistryDomainError),

    /// Catalog persistence failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A manifest source failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The registry lock was poisoned by a panicking writer.
    #[error("registry state unavailable: {0}")]
    Internal(String),
}

/// Outcome of agent resolution for callers that branch instead of failing.
///
/// Replaces the fallback-agent-on-failure pattern: resolution yields either
/// a concrete descriptor or an explicit `Unavailable` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentResolution {
    /// An enabled agent matched the query.
    Registered(AgentDescriptor),
    /// Nothing usable matched the query.
    Unavailable {
        /// The original query.
        query: String,
        /// Why resolution failed.
        reason: String,
    },
}

impl AgentResolution {
    /// Returns the descriptor when resolution succeeded.
    #[must_use]
    pub const fn registered(&self) -> Option<&AgentDescriptor> {
        match self {
            Self::Registered(descriptor) => Some(descriptor),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Summary of a discovery merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Names imported into the catalog.
    pub imported: Vec<AgentName>,
    /// Names skipped because they were already registered.
    pub skipped: Vec<AgentName>,
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    descriptor: AgentDescriptor,
    registered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<AgentName, RegistryEntry>,
    category_index: HashMap<CategoryName, Vec<AgentName>>,
    specialization_index: HashMap<String, Vec<AgentName>>,
}

impl RegistryState {
    fn insert(&mut self, descriptor: AgentDescriptor, registered_at: DateTime<Utc>) {
        let name = descriptor.name().clone();
        self.category_index
            .entry(descriptor.category().clone())
            .or_default()
            .push(name.clone());
        for specialization in descriptor.specializations() {
            self.specialization_index
                .entry(specialization.clone())
                .or_default()
                .push(name.clone());
        }
        self.entries.insert(
            name,
            RegistryEntry {
                descriptor,
                registered_at,
            },
        );
    }

    fn remove(&mut self, name: &AgentName) -> Option<RegistryEntry> {
        let entry = self.entries.remove(name)?;
        if let Some(names) = self.category_index.get_mut(entry.descriptor.category()) {
            names.retain(|n| n != name);
        }
        for specialization in entry.descriptor.specializations() {
            if let Some(names) = self.specialization_index.get_mut(specialization) {
                names.retain(|n| n != name);
            }
        }
        Some(entry)
    }
}

/// Agent capability catalog with single-writer mutation semantics.
#[derive(Debug)]
pub struct AgentRegistry<C>
where
    C: Clock + Send + Sync,
{
    state: RwLock<RegistryState>,
    clock: Arc<C>,
}

impl<C> AgentRegistry<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            clock,
        }
    }

    fn read_state(&self) -> RegistryResult<RwLockReadGuard<'_, RegistryState>> {
        self.state
            .read()
            .map_err(|err| RegistryError::Internal(err.to_string()))
    }

    fn write_state(&self) -> RegistryResult<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|err| RegistryError::Internal(err.to_string()))
    }

    /// Registers a new descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateAgent`] when the name is already
    /// registered; use [`AgentRegistry::register_overwriting`] to replace.
    pub fn register(&self, descriptor: AgentDescriptor) -> RegistryResult<()> {
        let mut state = self.write_state()?;
        if state.entries.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateAgent(descriptor.name().clone()));
        }
        tracing::info!(agent = %descriptor.name(), category = %descriptor.category(), "registered agent");
        state.insert(descriptor, self.clock.utc());
        Ok(())
    }

    /// Registers a descriptor, replacing any existing entry of the same
    /// name.
    ///
    /// Returns the replaced descriptor, if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Internal`] when the registry state is
    /// unavailable.
    pub fn register_overwriting(
        &self,
        descriptor: AgentDescriptor,
    ) -> RegistryResult<Option<AgentDescriptor>> {
        let mut state = self.write_state()?;
        let previous = state.remove(descriptor.name()).map(|e| e.descriptor);
        tracing::info!(agent = %descriptor.name(), replaced = previous.is_some(), "registered agent");
        state.insert(descriptor, self.clock.utc());
        Ok(previous)
    }

    /// Removes a descriptor from the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] when the name is not
    /// registered.
    pub fn deregister(&self, name: &AgentName) -> RegistryResult<AgentDescriptor> {
        let mut state = self.write_state()?;
        let entry = state
            .remove(name)
            .ok_or_else(|| RegistryError::AgentNotFound(name.to_string()))?;
        tracing::info!(agent = %name, "deregistered agent");
        Ok(entry.descriptor)
    }

    /// Merges collaborator-reported manifests into the catalog.
    ///
    /// A manifest entry is imported only when its name is not already
    /// registered; registered entries are never overwritten by discovery.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Manifest`] when a source fails to load.
    pub async fn discover(
        &self,
        sources: &[Arc<dyn ManifestSource>],
    ) -> RegistryResult<DiscoveryReport> {
        let mut report = DiscoveryReport::default();
        for source in sources {
            let manifests = source.load_manifests().await?;
            let mut state = self.write_state()?;
            for manifest in manifests {
                for descriptor in manifest.into_descriptors() {
                    let name = descriptor.name().clone();
                    if state.entries.contains_key(&name) {
                        report.skipped.push(name);
                        continue;
                    }
                    state.insert(descriptor, self.clock.utc());
                    report.imported.push(name);
                }
            }
        }
        tracing::info!(
            imported = report.imported.len(),
            skipped = report.skipped.len(),
            "manifest discovery merged"
        );
        Ok(report)
    }

    /// Resolves an enabled descriptor by name, falling back to
    /// specialization lookup.
    ///
    /// Name matches win over specialization matches; among specialization
    /// matches, registration order decides.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] when nothing enabled
    /// matches.
    pub fn resolve(&self, query: &str) -> RegistryResult<AgentDescriptor> {
        let state = self.read_state()?;
        if let Ok(name) = AgentName::new(query)
            && let Some(entry) = state.entries.get(&name)
            && entry.descriptor.is_enabled()
        {
            return Ok(entry.descriptor.clone());
        }

        let specialization = query.trim().to_ascii_lowercase();
        if let Some(names) = state.specialization_index.get(&specialization) {
            for name in names {
                if let Some(entry) = state.entries.get(name)
                    && entry.descriptor.is_enabled()
                {
                    return Ok(entry.descriptor.clone());
                }
            }
        }

        tracing::debug!(query, "agent resolution failed");
        Err(RegistryError::AgentNotFound(query.to_owned()))
    }

    /// Resolves a descriptor, reporting failure as an explicit
    /// [`AgentResolution::Unavailable`] variant instead of an error.
    #[must_use]
    pub fn resolve_or_unavailable(&self, query: &str) -> AgentResolution {
        match self.resolve(query) {
            Ok(descriptor) => AgentResolution::Registered(descriptor),
            Err(RegistryError::AgentNotFound(_)) => {
                let reason = if self.is_registered_disabled(query) {
                    "agent is registered but disabled".to_owned()
                } else {
                    "no agent or specialization matches".to_owned()
                };
                AgentResolution::Unavailable {
                    query: query.to_owned(),
                    reason,
                }
            }
            Err(err) => AgentResolution::Unavailable {
                query: query.to_owned(),
                reason: err.to_string(),
            },
        }
    }

    fn is_registered_disabled(&self, query: &str) -> bool {
        let Ok(name) = AgentName::new(query) else {
            return false;
        };
        self.read_state()
            .ok()
            .and_then(|state| {
                state
                    .entries
                    .get(&name)
                    .map(|entry| !entry.descriptor.is_enabled())
            })
            .unwrap_or(false)
    }

    /// Topologically orders the dependency closure of a descriptor.
    ///
    /// The returned sequence lists dependencies before their dependents and
    /// ends with the descriptor itself.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DependencyCycle`] when the dependency graph
    /// loops, or [`RegistryError::MissingDependency`] when a declared
    /// dependency is absent or disabled.
    pub fn resolve_dependencies(
        &self,
        descriptor: &AgentDescriptor,
    ) -> RegistryResult<Vec<AgentDescriptor>> {
        let state = self.read_state()?;
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        let mut ordered = Vec::new();
        visit_dependencies(&state, descriptor, &mut visiting, &mut visited, &mut ordered)?;
        Ok(ordered)
    }

    /// Returns all enabled descriptors in a category, registration order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Internal`] when the registry state is
    /// unavailable.
    pub fn list_by_category(&self, category: &CategoryName) -> RegistryResult<Vec<AgentDescriptor>> {
        let state = self.read_state()?;
        let Some(names) = state.category_index.get(category) else {
            return Ok(Vec::new());
        };
        let descriptors = names
            .iter()
            .filter_map(|name| state.entries.get(name))
            .filter(|entry| entry.descriptor.is_enabled())
            .map(|entry| entry.descriptor.clone())
            .collect();
        Ok(descriptors)
    }

    /// Returns every registered descriptor regardless of enablement.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Internal`] when the registry state is
    /// unavailable.
    pub fn list_all(&self) -> RegistryResult<Vec<AgentDescriptor>> {
        let state = self.read_state()?;
        Ok(state
            .entries
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect())
    }

    /// Returns whether a name is registered (enabled or not).
    #[must_use]
    pub fn is_registered(&self, name: &AgentName) -> bool {
        self.read_state()
            .map(|state| state.entries.contains_key(name))
            .unwrap_or(false)
    }

    /// Returns when the named agent was registered.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] for unregistered names.
    pub fn registered_at(&self, name: &AgentName) -> RegistryResult<DateTime<Utc>> {
        let state = self.read_state()?;
        state
            .entries
            .get(name)
            .map(|entry| entry.registered_at)
            .ok_or_else(|| RegistryError::AgentNotFound(name.to_string()))
    }

    /// Snapshots the catalog into its persisted document shape.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Internal`] when the registry state is
    /// unavailable.
    pub fn snapshot(&self) -> RegistryResult<RegistryCatalog> {
        let state = self.read_state()?;
        let agents: BTreeMap<_, _> = state
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.descriptor.clone()))
            .collect();
        let categories: BTreeMap<_, _> = state
            .category_index
            .iter()
            .filter(|(_, names)| !names.is_empty())
            .map(|(category, names)| (category.clone(), names.clone()))
            .collect();
        Ok(RegistryCatalog::new(agents, categories))
    }

    /// Replaces the registry contents with a persisted catalog document.
    ///
    /// Category insertion order is restored from the catalog's category
    /// lists; agents absent from every list are appended afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Internal`] when the registry state is
    /// unavailable.
    pub fn restore(&self, catalog: RegistryCatalog) -> RegistryResult<()> {
        let now = self.clock.utc();
        let (mut agents, categories) = catalog.into_parts();
        let mut fresh = RegistryState::default();
        for names in categories.values() {
            for name in names {
                if let Some(descriptor) = agents.remove(name) {
                    fresh.insert(descriptor, now);
                }
            }
        }
        for (_, descriptor) in agents {
            fresh.insert(descriptor, now);
        }
        let mut state = self.write_state()?;
        *state = fresh;
        Ok(())
    }

    /// Persists the current catalog through a repository.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Catalog`] when persistence fails.
    pub async fn persist(&self, repository: &dyn CatalogRepository) -> RegistryResult<()> {
        let catalog = self.snapshot()?;
        repository.save(&catalog).await?;
        Ok(())
    }

    /// Seeds the registry from a persisted catalog, if one exists.
    ///
    /// Returns whether a catalog was found.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Catalog`] when loading fails.
    pub async fn restore_from(&self, repository: &dyn CatalogRepository) -> RegistryResult<bool> {
        match repository.load().await? {
            Some(catalog) => {
                self.restore(catalog)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn visit_dependencies(
    state: &RegistryState,
    descriptor: &AgentDescriptor,
    visiting: &mut HashSet<AgentName>,
    visited: &mut HashSet<AgentName>,
    ordered: &mut Vec<AgentDescriptor>,
) -> RegistryResult<()> {
    visiting.insert(descriptor.name().clone());
    for dependency in descriptor.dependencies() {
        if visiting.contains(dependency) {
            return Err(RegistryError::DependencyCycle(dependency.clone()));
        }
        if visited.contains(dependency) {
            continue;
        }
        let entry = state
            .entries
            .get(dependency)
            .filter(|entry| entry.descriptor.is_enabled())
            .ok_or_else(|| RegistryError::MissingDependency {
                agent: descriptor.name().clone(),
                dependency: dependency.clone(),
            })?;
        let next = entry.descriptor.clone();
        visit_dependencies(state, &next, visiting, visited, ordered)?;
    }
    visiting.remove(descriptor.name());
    visited.insert(descriptor.name().clone());
    ordered.push(descriptor.clone());
    Ok(())
}
