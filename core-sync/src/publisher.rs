//! # Cache State Publisher
//!
//! Holds the current collection of per-resource states and republishes it to
//! every subscriber after each change.
//!
//! ## Model
//!
//! The published value is a [`SyncState`]. Until the first reconciliation
//! pass completes it is `Synchronizing`; after that it is
//! `Synchronized(snapshot)` with exactly one [`CacheState`] per declared
//! resource, or `Failed` when the declared set could not be obtained.
//!
//! All writes go through a `tokio::sync::watch` sender. Each write is a
//! closure applied under the channel's lock, so two updates for different
//! resources never overwrite each other. Readers get the latest value and
//! may skip intermediate ones; delivery of every intermediate snapshot is
//! not guaranteed.
//!
//! ## Usage
//!
//! ```rust
//! use bridge_traits::RemoteResourceMetadata;
//! use core_sync::publisher::{CacheSnapshot, CacheStatePublisher, SyncState};
//! use core_sync::CacheState;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let publisher = CacheStatePublisher::new(false);
//! let mut subscription = publisher.subscribe();
//! assert_eq!(subscription.next().await, Some(SyncState::Synchronizing));
//!
//! let metadata = RemoteResourceMetadata::new("A", "u1");
//! publisher.publish_snapshot(CacheSnapshot::from_states([CacheState::not_cached(metadata)]));
//! assert!(matches!(subscription.next().await, Some(SyncState::Synchronized(_))));
//! # }
//! ```

use bridge_traits::{Locator, RemoteResourceMetadata};
use core_async::sync::watch;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::state::CacheState;

/// Per-resource states in declaration order, keyed by locator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    states: IndexMap<Locator, CacheState>,
}

impl CacheSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot; a later state for the same locator replaces an
    /// earlier one in place.
    pub fn from_states(states: impl IntoIterator<Item = CacheState>) -> Self {
        let mut snapshot = Self::new();
        for state in states {
            snapshot.insert(state);
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, metadata: &RemoteResourceMetadata) -> Option<&CacheState> {
        self.get_by_locator(&metadata.locator)
    }

    pub fn get_by_locator(&self, locator: &Locator) -> Option<&CacheState> {
        self.states.get(locator)
    }

    pub fn contains(&self, locator: &Locator) -> bool {
        self.states.contains_key(locator)
    }

    /// Inserts or replaces the state for its resource, returning the
    /// previous one.
    pub fn insert(&mut self, state: CacheState) -> Option<CacheState> {
        self.states.insert(state.locator().clone(), state)
    }

    pub fn states(&self) -> impl Iterator<Item = &CacheState> {
        self.states.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RemoteResourceMetadata, &CacheState)> {
        self.states.values().map(|state| (state.metadata(), state))
    }

    /// Resources currently believed to be in flight.
    pub fn downloading(&self) -> impl Iterator<Item = &RemoteResourceMetadata> {
        self.states
            .values()
            .filter(|state| state.is_downloading())
            .map(CacheState::metadata)
    }

    pub fn into_states(self) -> Vec<CacheState> {
        self.states.into_values().collect()
    }
}

impl Serialize for CacheSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.states.values())
    }
}

/// Top-level synchronization status published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum SyncState {
    /// The first reconciliation pass has not finished yet.
    Synchronizing,
    /// Reconciled; one state per declared resource.
    Synchronized(CacheSnapshot),
    /// The declared resource set could not be obtained or reconciled.
    Failed { message: String },
}

impl SyncState {
    pub fn snapshot(&self) -> Option<&CacheSnapshot> {
        match self {
            SyncState::Synchronized(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn is_synchronized(&self) -> bool {
        matches!(self, SyncState::Synchronized(_))
    }
}

/// Result of a per-resource write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The snapshot changed and subscribers were notified.
    Applied,
    /// Distinct mode: the new state equals the current one; nothing sent.
    Unchanged,
    /// No snapshot to update, the resource is not part of it, or a
    /// conditional write found a different state in place.
    Rejected,
}

/// Single-writer store for the published [`SyncState`].
#[derive(Debug)]
pub struct CacheStatePublisher {
    sender: watch::Sender<SyncState>,
    distinct: bool,
}

impl CacheStatePublisher {
    /// Creates a publisher in the `Synchronizing` state.
    ///
    /// With `distinct` set, per-resource writes that leave the state
    /// unchanged do not wake subscribers.
    pub fn new(distinct: bool) -> Self {
        let (sender, _) = watch::channel(SyncState::Synchronizing);
        Self { sender, distinct }
    }

    pub fn current(&self) -> SyncState {
        self.sender.borrow().clone()
    }

    /// State of one resource in the published snapshot.
    pub fn state_of(&self, locator: &Locator) -> Option<CacheState> {
        self.sender
            .borrow()
            .snapshot()
            .and_then(|snapshot| snapshot.get_by_locator(locator).cloned())
    }

    pub fn is_synchronized(&self) -> bool {
        self.sender.borrow().is_synchronized()
    }

    pub fn set_synchronizing(&self) {
        self.sender.send_replace(SyncState::Synchronizing);
    }

    /// Replaces the whole published value with a fresh snapshot.
    pub fn publish_snapshot(&self, snapshot: CacheSnapshot) {
        debug!(resources = snapshot.len(), "Publishing cache snapshot");
        self.sender.send_replace(SyncState::Synchronized(snapshot));
    }

    /// Publishes a top-level failure.
    pub fn fail(&self, message: impl Into<String>) {
        self.sender.send_replace(SyncState::Failed {
            message: message.into(),
        });
    }

    /// Replaces one resource's entry.
    pub fn update(&self, state: CacheState) -> UpdateOutcome {
        self.write(state, |_| true)
    }

    /// Replaces one resource's entry only if it is currently `Downloading`.
    ///
    /// Observers publish their terminal state through this so that a
    /// deletion that happened while they were polling is not overwritten.
    pub fn settle(&self, state: CacheState) -> UpdateOutcome {
        self.write(state, CacheState::is_downloading)
    }

    /// Replaces one resource's entry only if it is not `Downloading`.
    ///
    /// Lets exactly one of several racing callers move a resource into
    /// `Downloading`.
    pub fn claim(&self, state: CacheState) -> UpdateOutcome {
        self.write(state, |existing| !existing.is_downloading())
    }

    fn write(&self, state: CacheState, precondition: impl Fn(&CacheState) -> bool) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::Rejected;

        self.sender.send_if_modified(|current| {
            let SyncState::Synchronized(snapshot) = current else {
                return false;
            };
            let Some(existing) = snapshot.get_by_locator(state.locator()) else {
                return false;
            };
            if !precondition(existing) {
                return false;
            }
            if self.distinct && *existing == state {
                outcome = UpdateOutcome::Unchanged;
                return false;
            }

            snapshot.insert(state.clone());
            outcome = UpdateOutcome::Applied;
            true
        });

        if outcome == UpdateOutcome::Rejected {
            debug!(state = state.kind(), "Cache update rejected");
        }
        outcome
    }

    pub fn subscribe(&self) -> CacheStateSubscription {
        CacheStateSubscription {
            receiver: self.sender.subscribe(),
            primed: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for CacheStatePublisher {
    fn default() -> Self {
        Self::new(false)
    }
}

/// A subscriber's view of the published state.
///
/// The first [`next`](Self::next) returns the current value immediately;
/// later calls wait for the next change.
#[derive(Debug)]
pub struct CacheStateSubscription {
    receiver: watch::Receiver<SyncState>,
    primed: bool,
}

impl CacheStateSubscription {
    /// Returns `None` once the publisher has been dropped.
    pub async fn next(&mut self) -> Option<SyncState> {
        if self.primed {
            self.receiver.changed().await.ok()?;
        }
        self.primed = true;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Latest value without waiting.
    pub fn latest(&self) -> SyncState {
        self.receiver.borrow().clone()
    }

    /// Waits until the published value satisfies `predicate`.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<SyncState>
    where
        F: FnMut(&SyncState) -> bool,
    {
        self.primed = true;
        self.receiver
            .wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| state.clone())
    }
}
