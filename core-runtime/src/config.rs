//! # Core Configuration Module
//!
//! Builder-based configuration for the download cache core.
//!
//! ## Overview
//!
//! The builder collects the injected bridges and the tuning knobs of the
//! synchronization engine, then validates them in one place so that a
//! misconfigured host fails at startup rather than on the first download.
//!
//! ## Required Dependencies
//!
//! - `DownloadSubsystem` - the platform's transfer service
//! - `RemoteMetadataProvider` - the declared resource list
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `LocalFileStore` - desktop default: `TokioFileStore` rooted at
//!   `downloads_dir` (or the user's downloads folder)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .download_subsystem(Arc::new(MyDownloadManager::new()))
//!     .metadata_provider(Arc::new(MyCatalog::new()))
//!     .poll_interval(Duration::from_millis(1500))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! A missing required bridge produces [`Error::CapabilityMissing`] naming the
//! capability and what to inject. Out-of-range settings produce
//! [`Error::Config`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{DownloadSubsystem, LocalFileStore, RemoteMetadataProvider};

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Default period between two observer polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of consecutive failed polls before an observer gives up.
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 5;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Core configuration for the download cache.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Platform download-transfer service (required)
    pub download_subsystem: Arc<dyn DownloadSubsystem>,

    /// Source of the declared resource list (required)
    pub metadata_provider: Arc<dyn RemoteMetadataProvider>,

    /// Local file store (optional with desktop default)
    pub file_store: Option<Arc<dyn LocalFileStore>>,

    /// Root directory for the desktop default file store
    pub downloads_dir: Option<PathBuf>,

    /// Period between two polls of an in-flight download
    pub poll_interval: Duration,

    /// Consecutive failed polls tolerated by an observer
    pub max_poll_failures: u32,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,

    /// Suppress republishing when an update leaves the state unchanged
    pub distinct_updates: bool,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("download_subsystem", &"DownloadSubsystem { ... }")
            .field("metadata_provider", &"RemoteMetadataProvider { ... }")
            .field(
                "file_store",
                &self.file_store.as_ref().map(|_| "LocalFileStore { ... }"),
            )
            .field("downloads_dir", &self.downloads_dir)
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_failures", &self.max_poll_failures)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("distinct_updates", &self.distinct_updates)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the tuning parameters.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval < MIN_POLL_INTERVAL || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(Error::Config(format!(
                "Poll interval must be between {:?} and {:?}, got {:?}",
                MIN_POLL_INTERVAL, MAX_POLL_INTERVAL, self.poll_interval
            )));
        }

        if self.max_poll_failures == 0 {
            return Err(Error::Config(
                "max_poll_failures must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if let Some(dir) = &self.downloads_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config(
                    "Downloads directory cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Returns the configured file store, or the platform default.
    pub fn resolve_file_store(&self) -> Result<Arc<dyn LocalFileStore>> {
        match &self.file_store {
            Some(store) => Ok(Arc::clone(store)),
            None => provide_default_file_store(self.downloads_dir.as_ref()),
        }
    }
}

fn download_subsystem_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "DownloadSubsystem".to_string(),
        message: "DownloadSubsystem implementation is required to enqueue and observe transfers. \
                 Android: wrap the platform DownloadManager. \
                 Desktop: inject an adapter over your transfer service."
            .to_string(),
    }
}

fn metadata_provider_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "RemoteMetadataProvider".to_string(),
        message: "RemoteMetadataProvider implementation is required to know which resources exist. \
                 Desktop: use bridge_desktop::ManifestMetadataProvider or StaticMetadataProvider."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_store(downloads_dir: Option<&PathBuf>) -> Result<Arc<dyn LocalFileStore>> {
    use bridge_desktop::TokioFileStore;

    let store = match downloads_dir {
        Some(dir) => TokioFileStore::with_directory(dir.clone()),
        None => TokioFileStore::new(),
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_store(_downloads_dir: Option<&PathBuf>) -> Result<Arc<dyn LocalFileStore>> {
    Err(Error::CapabilityMissing {
        capability: "LocalFileStore".to_string(),
        message: "LocalFileStore implementation is required to place downloaded files. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileStore. \
                 Mobile: inject a store over the app's external files directory."
            .to_string(),
    })
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    download_subsystem: Option<Arc<dyn DownloadSubsystem>>,
    metadata_provider: Option<Arc<dyn RemoteMetadataProvider>>,
    file_store: Option<Arc<dyn LocalFileStore>>,
    downloads_dir: Option<PathBuf>,
    poll_interval: Option<Duration>,
    max_poll_failures: Option<u32>,
    event_buffer_size: Option<usize>,
    distinct_updates: bool,
}

impl CoreConfigBuilder {
    pub fn download_subsystem(mut self, subsystem: Arc<dyn DownloadSubsystem>) -> Self {
        self.download_subsystem = Some(subsystem);
        self
    }

    pub fn metadata_provider(mut self, provider: Arc<dyn RemoteMetadataProvider>) -> Self {
        self.metadata_provider = Some(provider);
        self
    }

    pub fn file_store(mut self, store: Arc<dyn LocalFileStore>) -> Self {
        self.file_store = Some(store);
        self
    }

    /// Root of the default desktop file store. Ignored when a file store is
    /// injected.
    pub fn downloads_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.downloads_dir = Some(path.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_poll_failures(mut self, failures: u32) -> Self {
        self.max_poll_failures = Some(failures);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn distinct_updates(mut self, enabled: bool) -> Self {
        self.distinct_updates = enabled;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<CoreConfig> {
        let download_subsystem = self
            .download_subsystem
            .ok_or_else(download_subsystem_missing_error)?;
        let metadata_provider = self
            .metadata_provider
            .ok_or_else(metadata_provider_missing_error)?;

        let config = CoreConfig {
            download_subsystem,
            metadata_provider,
            file_store: self.file_store,
            downloads_dir: self.downloads_dir,
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            max_poll_failures: self.max_poll_failures.unwrap_or(DEFAULT_MAX_POLL_FAILURES),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            distinct_updates: self.distinct_updates,
        };

        config.validate()?;

        Ok(config)
    }
}
