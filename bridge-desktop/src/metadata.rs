//! Remote metadata providers for desktop hosts.

use std::path::PathBuf;

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    metadata::{RemoteMetadataProvider, RemoteResourceMetadata},
};
use tokio::fs;
use tracing::debug;

/// Provider that returns a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataProvider {
    resources: Vec<RemoteResourceMetadata>,
}

impl StaticMetadataProvider {
    pub fn new(resources: Vec<RemoteResourceMetadata>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl RemoteMetadataProvider for StaticMetadataProvider {
    async fn fetch(&self) -> Result<Vec<RemoteResourceMetadata>> {
        Ok(self.resources.clone())
    }
}

/// Provider that reads a JSON manifest on every fetch.
///
/// The manifest is an array of `{"name": ..., "locator": ...}` objects.
#[derive(Debug, Clone)]
pub struct ManifestMetadataProvider {
    path: PathBuf,
}

impl ManifestMetadataProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RemoteMetadataProvider for ManifestMetadataProvider {
    async fn fetch(&self) -> Result<Vec<RemoteResourceMetadata>> {
        let raw = fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BridgeError::NotFound(self.path.clone())
            } else {
                BridgeError::Io(e)
            }
        })?;

        let resources: Vec<RemoteResourceMetadata> = serde_json::from_slice(&raw)
            .map_err(|e| BridgeError::Serialization(format!("{}: {e}", self.path.display())))?;

        debug!(path = ?self.path, count = resources.len(), "Loaded resource manifest");
        Ok(resources)
    }
}
