//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `LocalFileStore` using `tokio::fs`, rooted under the user's downloads
//!   folder
//! - `RemoteMetadataProvider` backed by a JSON manifest on disk, or by a
//!   fixed in-memory list
//!
//! The download subsystem has no desktop default; hosts supply their own
//! adapter.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ManifestMetadataProvider, TokioFileStore};
//!
//! let store = TokioFileStore::new();
//! let provider = ManifestMetadataProvider::new("resources.json");
//! ```

mod filesystem;
mod metadata;

pub use filesystem::TokioFileStore;
pub use metadata::{ManifestMetadataProvider, StaticMetadataProvider};
