//! # Synchronization Engine
//!
//! Reconciles the declared resource set against the download subsystem's
//! records and drives the download/delete lifecycle of each resource.
//!
//! ## Workflow
//!
//! ### Reconciliation
//! 1. Query every record from the download subsystem
//! 2. Remove records whose locator matches no declared resource (orphans)
//! 3. Map each declared resource through its best matching record
//! 4. Publish the snapshot, then start an observer for every resource found
//!    in flight
//!
//! ### Download
//! 1. Claim the resource: publish `Downloading` and register it in the
//!    observer registry before anything is awaited
//! 2. Resolve the destination through the local file store
//! 3. Enqueue on the download subsystem (a failure restores the previous state)
//! 4. Start an observer that settles the terminal state
//!
//! ### Delete
//! 1. Delete the local file if the resource is cached
//! 2. Remove every matching subsystem record (best-effort)
//! 3. Publish `NotCached`
//!
//! Cleanup removals never fail the operation that triggered them. A record
//! that could not be removed is classified as an orphan or consumed again on
//! the next pass.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SynchronizationEngine};
//!
//! let engine = SynchronizationEngine::new(
//!     SyncConfig::default(),
//!     download_subsystem,
//!     file_store,
//!     event_bus,
//!     TaskGroup::new("download-cache"),
//! );
//!
//! engine.reconcile(&metadata).await?;
//! engine.download(&metadata[0]).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    DownloadRecord, DownloadSubsystem, LocalFileStore, Locator, RecordId, RecordStatus,
    RemoteResourceMetadata,
};
use core_async::task::TaskGroup;
use core_runtime::config::{CoreConfig, DEFAULT_MAX_POLL_FAILURES, DEFAULT_POLL_INTERVAL};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus, RemovalCause};
use core_runtime::logging::{display_locator, strip_path};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::observer::{DownloadObserver, DownloadTracker};
use crate::publisher::{
    CacheSnapshot, CacheStatePublisher, CacheStateSubscription, SyncState, UpdateOutcome,
};
use crate::state::CacheState;

/// Engine tuning parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period between two polls of an in-flight download
    pub poll_interval: Duration,
    /// Consecutive failed polls an observer tolerates before giving up
    pub max_poll_failures: u32,
    /// Skip republishing per-resource writes that change nothing
    pub distinct_updates: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
            distinct_updates: false,
        }
    }
}

impl From<&CoreConfig> for SyncConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            max_poll_failures: config.max_poll_failures,
            distinct_updates: config.distinct_updates,
        }
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub snapshot: CacheSnapshot,
    /// Orphan records the subsystem accepted removal of.
    pub orphans_removed: usize,
}

/// Locators with a live observer, tagged with the observer's id.
type ObserverRegistry = Arc<Mutex<HashMap<Locator, u64>>>;

/// Reconciliation and lifecycle engine for the download cache.
///
/// Cloning is cheap; every clone drives the same publisher and task group.
#[derive(Clone)]
pub struct SynchronizationEngine {
    config: SyncConfig,
    subsystem: Arc<dyn DownloadSubsystem>,
    file_store: Arc<dyn LocalFileStore>,
    publisher: Arc<CacheStatePublisher>,
    event_bus: Arc<EventBus>,
    tasks: TaskGroup,
    observers: ObserverRegistry,
    next_observer_id: Arc<AtomicU64>,
}

impl SynchronizationEngine {
    pub fn new(
        config: SyncConfig,
        subsystem: Arc<dyn DownloadSubsystem>,
        file_store: Arc<dyn LocalFileStore>,
        event_bus: Arc<EventBus>,
        tasks: TaskGroup,
    ) -> Self {
        let publisher = Arc::new(CacheStatePublisher::new(config.distinct_updates));
        Self {
            config,
            subsystem,
            file_store,
            publisher,
            event_bus,
            tasks,
            observers: Arc::new(Mutex::new(HashMap::new())),
            next_observer_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Arc<CacheStatePublisher> {
        &self.publisher
    }

    pub fn subscribe(&self) -> CacheStateSubscription {
        self.publisher.subscribe()
    }

    pub fn current_state(&self) -> SyncState {
        self.publisher.current()
    }

    /// Number of observers currently polling.
    pub fn active_observers(&self) -> usize {
        lock_registry(&self.observers).len()
    }

    /// Reconciles `metadata` against the subsystem without publishing.
    ///
    /// Orphan records are removed along the way; matched `Failed` records
    /// are removed once their failure has been read.
    #[instrument(skip(self, metadata), fields(resources = metadata.len()))]
    pub async fn synchronize(&self, metadata: &[RemoteResourceMetadata]) -> Result<CacheSnapshot> {
        Ok(self.synchronize_pass(metadata).await?.snapshot)
    }

    /// Reconciles, publishes the snapshot and starts observers for every
    /// resource found in flight.
    #[instrument(skip(self, metadata), fields(resources = metadata.len()))]
    pub async fn reconcile(&self, metadata: &[RemoteResourceMetadata]) -> Result<Reconciliation> {
        let reconciliation = self.synchronize_pass(metadata).await?;
        let downloading: Vec<RemoteResourceMetadata> =
            reconciliation.snapshot.downloading().cloned().collect();

        self.publisher
            .publish_snapshot(reconciliation.snapshot.clone());

        // Observers start only after the snapshot is live so their first
        // settle has an entry to land on.
        for metadata in &downloading {
            self.start_observer(metadata.clone());
        }

        info!(
            resources = reconciliation.snapshot.len(),
            orphans_removed = reconciliation.orphans_removed,
            downloading = downloading.len(),
            "Reconciliation completed"
        );
        self.emit(CacheEvent::SynchronizationCompleted {
            resources: reconciliation.snapshot.len(),
            orphans_removed: reconciliation.orphans_removed,
            downloading: downloading.len(),
        });

        Ok(reconciliation)
    }

    async fn synchronize_pass(&self, metadata: &[RemoteResourceMetadata]) -> Result<Reconciliation> {
        let declared = dedupe(metadata);
        let records = self.subsystem.query().await.map_err(SyncError::Subsystem)?;

        let known: HashSet<&Locator> = declared.iter().map(|m| &m.locator).collect();
        let mut orphans_removed = 0;
        for orphan in records
            .iter()
            .filter(|record| !known.contains(&record.remote_locator))
        {
            debug!(
                record_id = %orphan.id,
                locator = %display_locator(orphan.remote_locator.as_str()),
                "Removing orphan record"
            );
            if self.remove_record(orphan.id, RemovalCause::Orphan).await {
                orphans_removed += 1;
            }
        }

        let mut snapshot = CacheSnapshot::new();
        for metadata in declared {
            let state = self.resolve_state(metadata.clone(), &records).await;
            snapshot.insert(state);
        }

        Ok(Reconciliation {
            snapshot,
            orphans_removed,
        })
    }

    /// Current state of one resource, read fresh from the subsystem.
    ///
    /// A `Failed` record is removed once it has been read.
    pub async fn get_cache_state(&self, metadata: &RemoteResourceMetadata) -> Result<CacheState> {
        let records = self.subsystem.query().await.map_err(SyncError::Subsystem)?;
        Ok(self.resolve_state(metadata.clone(), &records).await)
    }

    async fn resolve_state(
        &self,
        metadata: RemoteResourceMetadata,
        records: &[DownloadRecord],
    ) -> CacheState {
        let record = best_record(records, &metadata.locator);

        if let Some(DownloadRecord {
            id,
            status: RecordStatus::Failed { .. },
            ..
        }) = record
        {
            self.remove_record(*id, RemovalCause::ConsumedFailure).await;
        }

        CacheState::from_record(metadata, record)
    }

    /// Starts downloading a resource of the published snapshot.
    ///
    /// No-op while an observer is live for the resource. A resource left
    /// `Downloading` without one (its observer gave up) gets a fresh observer
    /// and no new enqueue. Retrying from `Error` first deletes whatever
    /// partial file sits at the destination.
    #[instrument(skip(self, metadata), fields(locator = %display_locator(metadata.locator.as_str())))]
    pub async fn download(&self, metadata: &RemoteResourceMetadata) -> Result<()> {
        let (id, previous) = match self.claim(metadata)? {
            Claim::Busy => {
                debug!("Download already in progress");
                return Ok(());
            }
            Claim::Resume(id) => {
                debug!("Resuming observation of an unobserved download");
                self.spawn_observer(metadata.clone(), id);
                return Ok(());
            }
            Claim::Fresh { id, previous } => (id, previous),
        };

        let retrying = matches!(previous, CacheState::Error { .. });
        let mut pending = PendingClaim {
            engine: self,
            metadata,
            id,
            previous: Some(previous),
        };

        // Dropping `pending` on error (or if this future is dropped) releases
        // the claim.
        self.enqueue(metadata, retrying).await?;
        pending.previous = None;
        self.spawn_observer(metadata.clone(), id);
        Ok(())
    }

    /// Reserves the resource for one caller before anything is awaited.
    fn claim(&self, metadata: &RemoteResourceMetadata) -> Result<Claim> {
        let mut registry = lock_registry(&self.observers);
        let current = self
            .publisher
            .state_of(&metadata.locator)
            .ok_or_else(|| SyncError::UnknownResource {
                locator: display_locator(metadata.locator.as_str()).to_string(),
            })?;

        if registry.contains_key(&metadata.locator) {
            return Ok(Claim::Busy);
        }

        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        if current.is_downloading() {
            registry.insert(metadata.locator.clone(), id);
            return Ok(Claim::Resume(id));
        }

        if self.publisher.claim(CacheState::downloading(metadata.clone())) != UpdateOutcome::Applied {
            return Ok(Claim::Busy);
        }
        registry.insert(metadata.locator.clone(), id);
        drop(registry);

        self.emit(CacheEvent::StateChanged {
            locator: display_locator(metadata.locator.as_str()).to_string(),
            state: "downloading".to_string(),
        });
        Ok(Claim::Fresh { id, previous: current })
    }

    async fn enqueue(&self, metadata: &RemoteResourceMetadata, retrying: bool) -> Result<()> {
        let destination = self
            .file_store
            .resolve(&metadata.name)
            .await
            .map_err(SyncError::FileStore)?;

        if retrying {
            self.discard_partial_file(&destination).await;
        }

        let record_id = self
            .subsystem
            .enqueue(&metadata.locator, &destination)
            .await
            .map_err(SyncError::Subsystem)?;

        info!(record_id = %record_id, file = %strip_path(&destination.to_string_lossy()), "Download enqueued");
        self.emit(CacheEvent::DownloadEnqueued {
            locator: display_locator(metadata.locator.as_str()).to_string(),
            record_id: record_id.0,
        });
        Ok(())
    }

    /// Undoes a claim whose enqueue did not complete.
    fn release(&self, metadata: &RemoteResourceMetadata, id: u64, previous: CacheState) {
        let mut registry = lock_registry(&self.observers);
        if registry.get(&metadata.locator) == Some(&id) {
            registry.remove(&metadata.locator);
        }

        let kind = previous.kind();
        if self.publisher.settle(previous) == UpdateOutcome::Applied {
            drop(registry);
            self.emit(CacheEvent::StateChanged {
                locator: display_locator(metadata.locator.as_str()).to_string(),
                state: kind.to_string(),
            });
        }
    }

    /// Deletes a resource's local file and subsystem records.
    ///
    /// Deleting a `Downloading` resource cancels it: its record is removed
    /// and its observer stops on its next poll.
    #[instrument(skip(self, state), fields(locator = %display_locator(state.locator().as_str()), kind = state.kind()))]
    pub async fn delete(&self, state: &CacheState) -> Result<()> {
        if let CacheState::Cached { file, .. } = state {
            self.file_store
                .delete(file)
                .await
                .map_err(SyncError::FileStore)?;
            debug!(file = %strip_path(&file.to_string_lossy()), "Deleted local file");
        }

        match self.subsystem.query().await {
            Ok(records) => {
                for record in records
                    .iter()
                    .filter(|record| &record.remote_locator == state.locator())
                {
                    self.remove_record(record.id, RemovalCause::Deleted).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "Could not list records for removal; leaving them to the next pass");
            }
        }

        self.publish(CacheState::not_cached(state.metadata().clone()));
        Ok(())
    }

    async fn discard_partial_file(&self, destination: &Path) {
        match self.file_store.exists(destination).await {
            Ok(true) => {
                if let Err(err) = self.file_store.delete(destination).await {
                    warn!(error = %err, "Failed to discard partial file before retry");
                } else {
                    debug!(file = %strip_path(&destination.to_string_lossy()), "Discarded partial file");
                }
            }
            Ok(false) => {}
            Err(err) => warn!(error = %err, "Failed to check for partial file before retry"),
        }
    }

    /// Best-effort removal. Returns whether the subsystem accepted it.
    async fn remove_record(&self, id: RecordId, cause: RemovalCause) -> bool {
        match self.subsystem.remove(id).await {
            Ok(()) => {
                self.emit(CacheEvent::RecordRemoved {
                    record_id: id.0,
                    cause,
                });
                true
            }
            Err(err) => {
                warn!(record_id = %id, cause = %cause, error = %err, "Failed to remove download record");
                self.emit(CacheEvent::RecordRemovalFailed {
                    record_id: id.0,
                    cause,
                    message: err.to_string(),
                });
                false
            }
        }
    }

    fn publish(&self, state: CacheState) {
        let locator = display_locator(state.locator().as_str()).to_string();
        let kind = state.kind();
        if self.publisher.update(state) == UpdateOutcome::Applied {
            self.emit(CacheEvent::StateChanged {
                locator,
                state: kind.to_string(),
            });
        }
    }

    fn emit(&self, event: CacheEvent) {
        self.event_bus.emit(CoreEvent::Cache(event)).ok();
    }

    /// Spawns an observer unless one is already live for the resource.
    fn start_observer(&self, metadata: RemoteResourceMetadata) {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut registry = lock_registry(&self.observers);
            if registry.contains_key(&metadata.locator) {
                debug!(
                    locator = %display_locator(metadata.locator.as_str()),
                    "Observer already running"
                );
                return;
            }
            registry.insert(metadata.locator.clone(), id);
        }

        self.spawn_observer(metadata, id);
    }

    /// Spawns the observer for a registry entry already holding `id`.
    fn spawn_observer(&self, metadata: RemoteResourceMetadata, id: u64) {
        let label = format!("observer:{}", display_locator(metadata.locator.as_str()));
        let tracker = TrackedDownload {
            engine: self.clone(),
            metadata,
            id,
        };
        let observer = DownloadObserver::new(
            tracker,
            self.config.poll_interval,
            self.config.max_poll_failures,
        );
        let token = self.tasks.child_token();

        // A rejected spawn drops the observer, and with it the tracker,
        // which unregisters itself.
        self.tasks
            .spawn(label, async move { observer.run(token).await.map(|_| ()) });
    }
}

/// A `Fresh` claim whose enqueue has not completed yet.
struct PendingClaim<'a> {
    engine: &'a SynchronizationEngine,
    metadata: &'a RemoteResourceMetadata,
    id: u64,
    /// `None` once the enqueue succeeded.
    previous: Option<CacheState>,
}

impl Drop for PendingClaim<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.engine.release(self.metadata, self.id, previous);
        }
    }
}

/// Outcome of reserving a resource for `download`.
enum Claim {
    /// An observer (or another download) already owns the resource.
    Busy,
    /// `Downloading` with nobody polling; observe without enqueueing.
    Resume(u64),
    /// Published as `Downloading`; the caller must enqueue.
    Fresh { id: u64, previous: CacheState },
}

/// Observer-side handle onto the engine.
///
/// Retirement from the registry happens under the registry lock together
/// with the publisher check, so a concurrent `download` either sees this
/// observer still registered and leaves the polling to it, or sees it gone
/// and starts a new one.
struct TrackedDownload {
    engine: SynchronizationEngine,
    metadata: RemoteResourceMetadata,
    id: u64,
}

impl TrackedDownload {
    fn retire(&self, registry: &mut HashMap<Locator, u64>) {
        if registry.get(&self.metadata.locator) == Some(&self.id) {
            registry.remove(&self.metadata.locator);
        }
    }
}

#[async_trait]
impl DownloadTracker for TrackedDownload {
    fn metadata(&self) -> &RemoteResourceMetadata {
        &self.metadata
    }

    async fn poll(&self) -> Result<CacheState> {
        self.engine.get_cache_state(&self.metadata).await
    }

    fn still_downloading(&self) -> bool {
        let mut registry = lock_registry(&self.engine.observers);
        let downloading = self
            .engine
            .publisher
            .state_of(&self.metadata.locator)
            .is_some_and(|state| state.is_downloading());
        if !downloading {
            self.retire(&mut registry);
        }
        downloading
    }

    fn settle(&self, state: CacheState) -> bool {
        let mut registry = lock_registry(&self.engine.observers);
        let locator = display_locator(state.locator().as_str()).to_string();
        let kind = state.kind();

        let applied = self.engine.publisher.settle(state) == UpdateOutcome::Applied;
        self.retire(&mut registry);
        drop(registry);

        if applied {
            self.engine.emit(CacheEvent::StateChanged {
                locator,
                state: kind.to_string(),
            });
        }
        applied
    }
}

impl Drop for TrackedDownload {
    fn drop(&mut self) {
        let mut registry = lock_registry(&self.engine.observers);
        self.retire(&mut registry);
    }
}

fn lock_registry(registry: &Mutex<HashMap<Locator, u64>>) -> MutexGuard<'_, HashMap<Locator, u64>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collapses duplicate locators; the first declaration wins.
fn dedupe(metadata: &[RemoteResourceMetadata]) -> Vec<&RemoteResourceMetadata> {
    let mut seen = HashSet::new();
    metadata
        .iter()
        .filter(|m| {
            let first = seen.insert(&m.locator);
            if !first {
                warn!(
                    locator = %display_locator(m.locator.as_str()),
                    name = %m.name,
                    "Duplicate resource locator ignored"
                );
            }
            first
        })
        .collect()
}

/// Most recently enqueued record for a locator.
fn best_record<'a>(records: &'a [DownloadRecord], locator: &Locator) -> Option<&'a DownloadRecord> {
    records
        .iter()
        .filter(|record| &record.remote_locator == locator)
        .max_by_key(|record| record.id)
}
