//! # Host Bridge Traits
//!
//! Collaborator contracts that the download cache core consumes but does not
//! implement.
//!
//! ## Overview
//!
//! The core reconciles a declared set of remote resources against two pieces
//! of platform state it does not own: the platform's download-transfer service
//! and the local file store. Each is injected as a trait object so the core
//! never reaches for an ambient singleton.
//!
//! ## Traits
//!
//! - [`LocalFileStore`](storage::LocalFileStore) - Maps resource names to local
//!   paths, lists and deletes downloaded files
//! - [`DownloadSubsystem`](download::DownloadSubsystem) - Enqueues transfers,
//!   reports transfer records, removes records
//! - [`RemoteMetadataProvider`](metadata::RemoteMetadataProvider) - Supplies the
//!   declared list of downloadable resources
//!
//! ## Platform Requirements
//!
//! | Capability | Desktop | Mobile |
//! |------------|---------|--------|
//! | `LocalFileStore` | `bridge-desktop::TokioFileStore` | host adapter |
//! | `DownloadSubsystem` | host adapter | platform download manager |
//! | `RemoteMetadataProvider` | `bridge-desktop::ManifestMetadataProvider` | host adapter |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the failing path or
//! identifier in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so that download observers running
//! on different tasks can share one adapter instance.

pub mod download;
pub mod error;
pub mod metadata;
pub mod storage;

pub use error::BridgeError;

pub use download::{DownloadRecord, DownloadSubsystem, RecordId, RecordStatus};
pub use metadata::{Locator, RemoteMetadataProvider, RemoteResourceMetadata};
pub use storage::LocalFileStore;
