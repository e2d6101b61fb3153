//! Local file store abstraction.
//!
//! Downloaded resources live in a single store-owned directory. The store
//! decides where a resource name lands on disk; the core never builds paths
//! itself.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;

/// Local file store
///
/// - Desktop: a directory under the user's downloads folder
/// - Mobile: the app's external files directory
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::LocalFileStore;
///
/// async fn purge(store: &dyn LocalFileStore) -> Result<()> {
///     for path in store.list().await? {
///         store.delete(&path).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LocalFileStore: Send + Sync {
    /// Maps a resource name to its local path.
    ///
    /// Idempotent. Creates missing parent directories but never the file.
    async fn resolve(&self, name: &str) -> Result<PathBuf>;

    /// Lists files currently present in the store.
    async fn list(&self) -> Result<Vec<PathBuf>>;

    /// Deletes a file.
    ///
    /// Fails with [`BridgeError::NotFound`](crate::BridgeError::NotFound) if
    /// the path does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.list().await?.iter().any(|entry| entry == path))
    }
}
