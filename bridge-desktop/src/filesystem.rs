//! Local file store implementation using Tokio

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::LocalFileStore,
};
use tokio::fs;
use tracing::debug;

const STORE_DIR_NAME: &str = "download-cache";

/// Tokio-based local file store.
///
/// Every resource name resolves to a file directly inside one root
/// directory, so everything `resolve` hands out is visible to `list`.
/// Names with separators or relative components are rejected.
#[derive(Debug, Clone)]
pub struct TokioFileStore {
    root: PathBuf,
}

impl TokioFileStore {
    /// Store rooted at `<downloads>/download-cache`, falling back to the
    /// system temp directory when the platform reports no downloads folder.
    pub fn new() -> Self {
        let root = dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join(STORE_DIR_NAME);

        Self { root }
    }

    /// Store rooted at an explicit directory.
    pub fn with_directory(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map_io_error(path: &Path, e: std::io::Error) -> BridgeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            BridgeError::NotFound(path.to_path_buf())
        } else {
            BridgeError::Io(e)
        }
    }

    fn validate_name(name: &str) -> Result<&Path> {
        let relative = Path::new(name);
        let mut components = relative.components();
        let single_file = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );

        if name.is_empty() || !single_file {
            return Err(BridgeError::OperationFailed(format!(
                "Invalid resource name: {name:?}"
            )));
        }
        Ok(relative)
    }
}

impl Default for TokioFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalFileStore for TokioFileStore {
    async fn resolve(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.join(Self::validate_name(name)?);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io_error(parent, e))?;
        }

        debug!(path = ?path, "Resolved resource path");
        Ok(path)
    }

    async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        debug!(root = ?self.root, count = files.len(), "Listed local files");
        Ok(files)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }
}
