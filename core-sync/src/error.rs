use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to fetch remote metadata: {0}")]
    MetadataFetch(#[source] BridgeError),

    #[error("Download subsystem error: {0}")]
    Subsystem(#[source] BridgeError),

    #[error("Local file store error: {0}")]
    FileStore(#[source] BridgeError),

    /// The resource is not part of the published snapshot.
    #[error("Unknown resource: {locator}")]
    UnknownResource { locator: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
