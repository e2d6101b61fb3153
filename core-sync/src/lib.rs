//! # Download Cache Synchronization
//!
//! Keeps a per-resource cache status in line with what the download
//! subsystem reports.
//!
//! ## Components
//!
//! - **Cache State** (`state`): `CacheState` per resource and the
//!   `DownloadError` taxonomy translated from native failure codes
//! - **Publisher** (`publisher`): single-writer holder of the current
//!   snapshot, fanned out to subscribers over a watch channel
//! - **Engine** (`engine`): reconciliation against subsystem records and the
//!   download/delete lifecycle
//! - **Observer** (`observer`): per-download polling task that settles the
//!   terminal state

pub mod engine;
pub mod error;
pub mod observer;
pub mod publisher;
pub mod state;

pub use engine::{Reconciliation, SyncConfig, SynchronizationEngine};
pub use error::{Result, SyncError};
pub use observer::{DownloadObserver, DownloadTracker, ObserverOutcome};
pub use publisher::{
    CacheSnapshot, CacheStatePublisher, CacheStateSubscription, SyncState, UpdateOutcome,
};
pub use state::{CacheState, DownloadError};
