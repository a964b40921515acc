//! Collaborator-reported agent manifest port.
//!
//! Agent implementations announce their capabilities either through a
//! direct registration call or through a manifest a collaborator reports
//! (a manifest file dropped next to the deployment, or a table compiled
//! into the binary). A [`ManifestSource`] yields those manifests for the
//! registry's discovery merge.

use crate::registry::domain::AgentDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for manifest loading.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// One collaborator-reported manifest: where it came from and the
/// descriptors it announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentManifest {
    origin: String,
    descriptors: Vec<AgentDescriptor>,
}

impl AgentManifest {
    /// Creates a manifest from an origin label and its descriptors.
    #[must_use]
    pub fn new(origin: impl Into<String>, descriptors: Vec<AgentDescriptor>) -> Self {
        Self {
            origin: origin.into(),
            descriptors,
        }
    }

    /// Returns where the manifest was reported from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the announced descriptors.
    #[must_use]
    pub fn descriptors(&self) -> &[AgentDescriptor] {
        &self.descriptors
    }

    /// Consumes the manifest into its descriptors.
    #[must_use]
    pub fn into_descriptors(self) -> Vec<AgentDescriptor> {
        self.descriptors
    }
}

/// Source of collaborator-reported agent manifests.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Loads all manifests this source knows about.
    async fn load_manifests(&self) -> ManifestResult<Vec<AgentManifest>>;
}

/// Errors returned by manifest sources.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// The source could not be read.
    #[error("unreadable manifest source: {0}")]
    Unreadable(Arc<dyn std::error::Error + Send + Sync>),

    /// A manifest document failed to parse.
    #[error("malformed manifest {origin}: {source}")]
    Malformed {
        /// Which manifest failed.
        origin: String,
        /// The underlying parse failure.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl ManifestError {
    /// Wraps a read error.
    pub fn unreadable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unreadable(Arc::new(err))
    }

    /// Wraps a parse error for a named manifest.
    pub fn malformed(
        origin: impl Into<String>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Malformed {
            origin: origin.into(),
            source: Arc::new(err),
        }
    }
}
