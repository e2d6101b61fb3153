//! Declared remote resources and the provider that lists them.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const FILE_SCHEME: &str = "file://";

/// Opaque URI identifying a resource on the remote side or a file reported by
/// the download subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interprets the locator as a local file reference.
    ///
    /// A `file://` scheme prefix is stripped; anything else is taken as a
    /// plain path.
    pub fn to_file_path(&self) -> PathBuf {
        let raw = self.0.strip_prefix(FILE_SCHEME).unwrap_or(&self.0);
        PathBuf::from(raw)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A downloadable resource as declared by the remote side.
///
/// `locator` is the unique key across a declared set; two entries with the
/// same locator describe the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteResourceMetadata {
    pub name: String,
    pub locator: Locator,
}

impl RemoteResourceMetadata {
    pub fn new(name: impl Into<String>, locator: impl Into<Locator>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }
}

/// Supplies the declared list of downloadable resources.
///
/// A failure here is a top-level synchronization failure, never a
/// per-resource error.
#[async_trait]
pub trait RemoteMetadataProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RemoteResourceMetadata>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_locator_strips_scheme() {
        let locator = Locator::new("file://x/A");
        assert_eq!(locator.to_file_path(), PathBuf::from("x/A"));
    }

    #[test]
    fn test_plain_locator_is_a_path() {
        let locator = Locator::new("/var/cache/A");
        assert_eq!(locator.to_file_path(), PathBuf::from("/var/cache/A"));
    }

    #[test]
    fn test_metadata_serializes_locator_as_string() {
        let metadata = RemoteResourceMetadata::new("A", "https://host/a.bin");
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "A", "locator": "https://host/a.bin" })
        );
    }
}
