//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (download
//! subsystem, metadata provider, local file store) into the synchronization
//! engine and runs the initial reconciliation in the background. Desktop
//! hosts typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) to get a default file store and manifest-backed
//! metadata provider.
//!
//! ```ignore
//! let service = CoreService::start(config)?;
//! let mut states = service.subscribe();
//! while let Some(state) = states.next().await {
//!     render(&state);
//! }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::path::PathBuf;
use std::sync::Arc;

use bridge_traits::{
    DownloadSubsystem, LocalFileStore, RemoteMetadataProvider, RemoteResourceMetadata,
};
use core_async::runtime::Handle;
use core_async::task::{TaskFailure, TaskGroup};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus, EventStream};
use core_sync::{
    CacheSnapshot, CacheState, CacheStateSubscription, SyncConfig, SyncError, SyncState,
    SynchronizationEngine,
};
use tracing::{error, info, instrument, warn};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{ManifestMetadataProvider, StaticMetadataProvider, TokioFileStore};

const TASK_GROUP: &str = "download-cache";

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub download_subsystem: Arc<dyn DownloadSubsystem>,
    pub metadata_provider: Arc<dyn RemoteMetadataProvider>,
    pub file_store: Arc<dyn LocalFileStore>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        download_subsystem: Arc<dyn DownloadSubsystem>,
        metadata_provider: Arc<dyn RemoteMetadataProvider>,
        file_store: Arc<dyn LocalFileStore>,
    ) -> Self {
        Self {
            download_subsystem,
            metadata_provider,
            file_store,
        }
    }

    /// Collects the bridges of a validated configuration, falling back to
    /// the platform file store when none was injected.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::clone(&config.download_subsystem),
            Arc::clone(&config.metadata_provider),
            config.resolve_file_store()?,
        ))
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    deps: Arc<CoreDependencies>,
    engine: SynchronizationEngine,
    event_bus: Arc<EventBus>,
    tasks: TaskGroup,
}

impl CoreService {
    /// Builds the engine and starts the initial synchronization in the
    /// background.
    ///
    /// Must be called from within a Tokio runtime. Subscribers see
    /// `Synchronizing` until the first snapshot is published.
    pub fn start(config: CoreConfig) -> Result<Self> {
        Handle::try_current().map_err(|_| {
            CoreError::InitializationFailed(
                "CoreService::start must be called from within an async runtime".to_string(),
            )
        })?;

        config.validate()?;
        let deps = CoreDependencies::from_config(&config)?;
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let tasks = supervising_group(Arc::clone(&event_bus));

        let engine = SynchronizationEngine::new(
            SyncConfig::from(&config),
            Arc::clone(&deps.download_subsystem),
            Arc::clone(&deps.file_store),
            Arc::clone(&event_bus),
            tasks.clone(),
        );

        let service = Self {
            deps: Arc::new(deps),
            engine,
            event_bus,
            tasks,
        };

        service.begin_synchronization();
        info!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Download cache core started"
        );
        Ok(service)
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn engine(&self) -> &SynchronizationEngine {
        &self.engine
    }

    /// Stream of the published state: the current value first, then every
    /// change.
    pub fn subscribe(&self) -> CacheStateSubscription {
        self.engine.subscribe()
    }

    pub fn current_state(&self) -> SyncState {
        self.engine.current_state()
    }

    /// Stream of core events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Fresh state of one resource, read from the download subsystem.
    pub async fn cache_state(&self, metadata: &RemoteResourceMetadata) -> Result<CacheState> {
        Ok(self.engine.get_cache_state(metadata).await?)
    }

    pub async fn download(&self, metadata: &RemoteResourceMetadata) -> Result<()> {
        Ok(self.engine.download(metadata).await?)
    }

    pub async fn delete(&self, state: &CacheState) -> Result<()> {
        Ok(self.engine.delete(state).await?)
    }

    /// Files currently present in the local file store.
    pub async fn local_files(&self) -> Result<Vec<PathBuf>> {
        self.deps
            .file_store
            .list()
            .await
            .map_err(|err| SyncError::FileStore(err).into())
    }

    /// Re-fetches the declared resources and reconciles again.
    ///
    /// A failure only replaces the published state when no snapshot has been
    /// published yet; otherwise the previous snapshot stays visible and the
    /// error is returned.
    #[instrument(skip(self))]
    pub async fn resynchronize(&self) -> Result<CacheSnapshot> {
        let publisher = self.engine.publisher();
        if !publisher.is_synchronized() {
            publisher.set_synchronizing();
        }
        self.emit(CacheEvent::SynchronizationStarted);

        match synchronize(&self.engine, self.deps.metadata_provider.as_ref()).await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                self.report_failure(&err);
                Err(err.into())
            }
        }
    }

    /// Cancels every observer and waits for background work to drain.
    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
        info!("Download cache core stopped");
    }

    fn begin_synchronization(&self) {
        self.engine.publisher().set_synchronizing();
        self.emit(CacheEvent::SynchronizationStarted);

        let service = self.clone();
        let spawned = self.tasks.spawn("synchronize", async move {
            if let Err(err) = synchronize(&service.engine, service.deps.metadata_provider.as_ref()).await {
                service.report_failure(&err);
            }
            Ok::<(), SyncError>(())
        });

        if !spawned {
            warn!("Task group already shut down; initial synchronization skipped");
        }
    }

    fn report_failure(&self, err: &SyncError) {
        let message = err.to_string();
        error!(error = %message, "Synchronization failed");

        let publisher = self.engine.publisher();
        if !publisher.is_synchronized() {
            publisher.fail(message.clone());
        }
        self.emit(CacheEvent::SynchronizationFailed { message });
    }

    fn emit(&self, event: CacheEvent) {
        self.event_bus.emit(CoreEvent::Cache(event)).ok();
    }
}

async fn synchronize(
    engine: &SynchronizationEngine,
    provider: &dyn RemoteMetadataProvider,
) -> core_sync::Result<CacheSnapshot> {
    let metadata = provider.fetch().await.map_err(SyncError::MetadataFetch)?;
    Ok(engine.reconcile(&metadata).await?.snapshot)
}

fn supervising_group(event_bus: Arc<EventBus>) -> TaskGroup {
    TaskGroup::new(TASK_GROUP).with_failure_handler(move |failure: TaskFailure| {
        warn!(
            task = %failure.label,
            panicked = failure.panicked,
            error = %failure.message,
            "Background task failed"
        );
        event_bus
            .emit(CoreEvent::Cache(CacheEvent::ObserverFailed {
                task: failure.label,
                message: failure.message,
            }))
            .ok();
    })
}

/// Convenience bootstrapper for desktop hosts.
///
/// Declared resources come from a JSON manifest; files land in
/// `downloads_dir`, or the user's downloads folder when `None`.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example(
/// #     subsystem: std::sync::Arc<dyn bridge_traits::DownloadSubsystem>,
/// # ) -> core_service::Result<()> {
/// use core_service::bootstrap_desktop;
///
/// let core = bootstrap_desktop(subsystem, "resources.json", None)?;
/// let files = core.local_files().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(
    download_subsystem: Arc<dyn DownloadSubsystem>,
    manifest: impl Into<PathBuf>,
    downloads_dir: Option<PathBuf>,
) -> Result<CoreService> {
    let mut builder = CoreConfig::builder()
        .download_subsystem(download_subsystem)
        .metadata_provider(Arc::new(ManifestMetadataProvider::new(manifest)));
    if let Some(dir) = downloads_dir {
        builder = builder.downloads_dir(dir);
    }

    CoreService::start(builder.build()?)
}
