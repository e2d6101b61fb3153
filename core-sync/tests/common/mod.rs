//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{
    BridgeError, DownloadRecord, DownloadSubsystem, LocalFileStore, Locator, RecordId,
    RecordStatus, RemoteResourceMetadata,
};
use core_async::task::TaskGroup;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_sync::{SyncConfig, SynchronizationEngine};
use tokio::sync::broadcast::Receiver;
use tokio::sync::Mutex;

#[derive(Default)]
struct SubsystemState {
    records: Vec<DownloadRecord>,
    next_id: u64,
    removed: Vec<RecordId>,
    enqueued: Vec<(Locator, PathBuf)>,
    queries: usize,
    failing_removals: HashSet<RecordId>,
    fail_queries: bool,
    fail_enqueue: bool,
    enqueue_latency: Option<Duration>,
}

/// Download subsystem whose record list is driven by the test.
#[derive(Clone, Default)]
pub struct FakeSubsystem {
    state: Arc<Mutex<SubsystemState>>,
}

impl FakeSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_record(&self, id: u64, locator: &str, status: RecordStatus) -> RecordId {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(id + 1);
        state.records.push(DownloadRecord {
            id: RecordId(id),
            remote_locator: Locator::new(locator),
            status,
        });
        RecordId(id)
    }

    /// Changes the status of every record for `locator`.
    pub async fn set_status(&self, locator: &str, status: RecordStatus) {
        let mut state = self.state.lock().await;
        for record in state
            .records
            .iter_mut()
            .filter(|record| record.remote_locator.as_str() == locator)
        {
            record.status = status.clone();
        }
    }

    pub async fn records(&self) -> Vec<DownloadRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn removed(&self) -> Vec<RecordId> {
        self.state.lock().await.removed.clone()
    }

    pub async fn enqueued(&self) -> Vec<(Locator, PathBuf)> {
        self.state.lock().await.enqueued.clone()
    }

    pub async fn queries(&self) -> usize {
        self.state.lock().await.queries
    }

    pub async fn fail_removal_of(&self, id: RecordId) {
        self.state.lock().await.failing_removals.insert(id);
    }

    pub async fn allow_removals(&self) {
        self.state.lock().await.failing_removals.clear();
    }

    pub async fn fail_queries(&self, fail: bool) {
        self.state.lock().await.fail_queries = fail;
    }

    pub async fn fail_enqueue(&self, fail: bool) {
        self.state.lock().await.fail_enqueue = fail;
    }

    /// Makes every enqueue wait `latency` before touching the records.
    pub async fn delay_enqueue(&self, latency: Duration) {
        self.state.lock().await.enqueue_latency = Some(latency);
    }
}

#[async_trait]
impl DownloadSubsystem for FakeSubsystem {
    async fn enqueue(&self, locator: &Locator, destination: &Path) -> Result<RecordId> {
        let latency = self.state.lock().await.enqueue_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if state.fail_enqueue {
            return Err(BridgeError::OperationFailed("queue is full".to_string()));
        }

        let id = RecordId(state.next_id);
        state.next_id += 1;
        state.records.push(DownloadRecord {
            id,
            remote_locator: locator.clone(),
            status: RecordStatus::Pending,
        });
        state
            .enqueued
            .push((locator.clone(), destination.to_path_buf()));
        Ok(id)
    }

    async fn query(&self) -> Result<Vec<DownloadRecord>> {
        let mut state = self.state.lock().await;
        state.queries += 1;
        if state.fail_queries {
            return Err(BridgeError::NotAvailable("subsystem restarting".to_string()));
        }
        Ok(state.records.clone())
    }

    async fn remove(&self, id: RecordId) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.failing_removals.contains(&id) {
            return Err(BridgeError::OperationFailed(format!("record {id} is locked")));
        }
        state.records.retain(|record| record.id != id);
        state.removed.push(id);
        Ok(())
    }
}

/// File store rooted at the relative directory `x`, holding paths only.
#[derive(Clone, Default)]
pub struct FakeStore {
    files: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_file(&self, name: &str) -> PathBuf {
        let path = Path::new("x").join(name);
        self.files.lock().await.insert(path.clone());
        path
    }

    pub async fn contains(&self, path: &Path) -> bool {
        self.files.lock().await.contains(path)
    }
}

#[async_trait]
impl LocalFileStore for FakeStore {
    async fn resolve(&self, name: &str) -> Result<PathBuf> {
        Ok(Path::new("x").join(name))
    }

    async fn list(&self) -> Result<Vec<PathBuf>> {
        Ok(self.files.lock().await.iter().cloned().collect())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        if self.files.lock().await.remove(path) {
            Ok(())
        } else {
            Err(BridgeError::NotFound(path.to_path_buf()))
        }
    }
}

pub struct Harness {
    pub engine: SynchronizationEngine,
    pub subsystem: FakeSubsystem,
    pub store: FakeStore,
    pub events: Receiver<CoreEvent>,
    pub tasks: TaskGroup,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default(), TaskGroup::new("test"))
    }

    pub fn with_config(config: SyncConfig, tasks: TaskGroup) -> Self {
        let subsystem = FakeSubsystem::new();
        let store = FakeStore::new();
        let event_bus = Arc::new(EventBus::new(256));
        let events = event_bus.subscribe();
        let engine = SynchronizationEngine::new(
            config,
            Arc::new(subsystem.clone()),
            Arc::new(store.clone()),
            event_bus,
            tasks.clone(),
        );

        Self {
            engine,
            subsystem,
            store,
            events,
            tasks,
        }
    }

    /// Cache events received so far.
    pub fn drain_events(&mut self) -> Vec<CacheEvent> {
        let mut drained = Vec::new();
        while let Ok(CoreEvent::Cache(event)) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub fn meta(name: &str, locator: &str) -> RemoteResourceMetadata {
    RemoteResourceMetadata::new(name, locator)
}

pub fn successful(local: &str) -> RecordStatus {
    RecordStatus::Successful {
        local_locator: Locator::new(local),
    }
}
