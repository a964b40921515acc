//! In-memory registry adapters.

use crate::registry::domain::RegistryCatalog;
use crate::registry::ports::{
    AgentManifest, CatalogError, CatalogRepository, CatalogResult, ManifestResult, ManifestSource,
};
use async_trait::async_trait;
use std::sync::RwLock;

/// Thread-safe in-memory catalog repository.
#[derive(Debug, Default)]
pub struct InMemoryCatalogRepository {
    state: RwLock<Option<RegistryCatalog>>,
}

impl InMemoryCatalogRepository {
    /// Creates an empty in-memory catalog repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn load(&self) -> CatalogResult<Option<RegistryCatalog>> {
        let state = self.state.read().map_err(|err| {
            CatalogError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.clone())
    }

    async fn save(&self, catalog: &RegistryCatalog) -> CatalogResult<()> {
        let mut state = self.state.write().map_err(|err| {
            CatalogError::persistence(std::io::Error::other(err.to_string()))
        })?;
        *state = Some(catalog.clone());
        Ok(())
    }
}

/// Manifest source backed by a fixed, compiled-in table.
///
/// This is the registration path for agents linked into the same binary:
/// their descriptors are declared once at startup instead of discovered by
/// scanning source trees.
#[derive(Debug, Clone, Default)]
pub struct StaticManifestSource {
    manifests: Vec<AgentManifest>,
}

impl StaticManifestSource {
    /// Creates a source over a fixed manifest table.
    #[must_use]
    pub fn new(manifests: Vec<AgentManifest>) -> Self {
        Self { manifests }
    }
}

#[async_trait]
impl ManifestSource for StaticManifestSource {
    async fn load_manifests(&self) -> ManifestResult<Vec<AgentManifest>> {
        Ok(self.manifests.clone())
    }
}
