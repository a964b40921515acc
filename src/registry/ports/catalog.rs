//! Catalog persistence port.

use crate::registry::domain::RegistryCatalog;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for catalog persistence operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog document persistence contract.
///
/// The registry snapshots its full state into a [`RegistryCatalog`] and
/// reloads it at startup; implementations only need whole-document load
/// and save.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Loads the persisted catalog.
    ///
    /// Returns `Ok(None)` when no catalog has been saved yet.
    async fn load(&self) -> CatalogResult<Option<RegistryCatalog>>;

    /// Persists the catalog, superseding any previous document.
    async fn save(&self, catalog: &RegistryCatalog) -> CatalogResult<()>;
}

/// Errors returned by catalog repository implementations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// The persisted document could not be parsed or rendered.
    #[error("invalid catalog document: {0}")]
    Serialization(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("catalog persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl CatalogError {
    /// Wraps a parse or render error.
    pub fn serialization(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Serialization(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
