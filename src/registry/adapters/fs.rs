//! Filesystem registry adapters built on capability-scoped directories.

use crate::registry::domain::{AgentDescriptor, RegistryCatalog};
use crate::registry::ports::{
    AgentManifest, CatalogError, CatalogRepository, CatalogResult, ManifestError, ManifestResult,
    ManifestSource,
};
use async_trait::async_trait;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;

/// File name the catalog document is stored under.
const CATALOG_FILE: &str = "catalog.json";

/// Suffix used while writing, renamed over the real file on completion.
const TEMP_SUFFIX: &str = ".tmp";

/// Catalog repository persisting a single JSON document in a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write never leaves a torn catalog on disk.
#[derive(Debug)]
pub struct FsCatalogRepository {
    dir: Dir,
}

impl FsCatalogRepository {
    /// Creates a repository rooted at the given directory handle.
    #[must_use]
    pub const fn new(dir: Dir) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl CatalogRepository for FsCatalogRepository {
    async fn load(&self) -> CatalogResult<Option<RegistryCatalog>> {
        let raw = match self.dir.read_to_string(CATALOG_FILE) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CatalogError::persistence(err)),
        };
        let catalog = serde_json::from_str(&raw).map_err(CatalogError::serialization)?;
        Ok(Some(catalog))
    }

    async fn save(&self, catalog: &RegistryCatalog) -> CatalogResult<()> {
        let rendered =
            serde_json::to_string_pretty(catalog).map_err(CatalogError::serialization)?;
        let temp_name = format!("{CATALOG_FILE}{TEMP_SUFFIX}");
        self.dir
            .write(&temp_name, rendered.as_bytes())
            .map_err(CatalogError::persistence)?;
        self.dir
            .rename(&temp_name, &self.dir, CATALOG_FILE)
            .map_err(CatalogError::persistence)?;
        Ok(())
    }
}

/// On-disk manifest document shape.
#[derive(Debug, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    agents: Vec<AgentDescriptor>,
}

/// Manifest source scanning a directory of `*.json` manifest files.
///
/// Each collaborator drops one manifest file naming the agents it
/// provides; the file name becomes the manifest origin.
#[derive(Debug)]
pub struct FsManifestSource {
    dir: Dir,
}

impl FsManifestSource {
    /// Creates a source over the given manifest directory handle.
    #[must_use]
    pub const fn new(dir: Dir) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl ManifestSource for FsManifestSource {
    async fn load_manifests(&self) -> ManifestResult<Vec<AgentManifest>> {
        let mut manifests = Vec::new();
        let entries = self.dir.entries().map_err(ManifestError::unreadable)?;
        for entry in entries {
            let entry = entry.map_err(ManifestError::unreadable)?;
            let file_name = entry.file_name().map_err(ManifestError::unreadable)?;
            if !file_name.ends_with(".json") {
                continue;
            }
            let raw = self
                .dir
                .read_to_string(&file_name)
                .map_err(ManifestError::unreadable)?;
            let document: ManifestDocument = serde_json::from_str(&raw)
                .map_err(|err| ManifestError::malformed(&file_name, err))?;
            manifests.push(AgentManifest::new(file_name, document.agents));
        }
        manifests.sort_by(|a, b| a.origin().cmp(b.origin()));
        Ok(manifests)
    }
}
