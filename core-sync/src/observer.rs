//! # Download Observer
//!
//! Polls one in-flight resource until the subsystem reports a terminal
//! status, then publishes that status and exits.
//!
//! Each iteration:
//! 1. Stop if the published state no longer expects this download (the
//!    resource was deleted or re-reconciled meanwhile).
//! 2. Query the resource's current state.
//! 3. `Downloading`: sleep one poll period and repeat. Anything else: settle
//!    it into the publisher and exit.
//!
//! `Error` is terminal; retrying is a new `download` call with a new
//! observer. There is no iteration cap: termination relies on the subsystem
//! eventually reporting a non-transient status. Consecutive query failures
//! are tolerated up to a limit, after which the observer returns the last
//! error and leaves the published state untouched.

use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::RemoteResourceMetadata;
use core_async::sync::CancellationToken;
use core_async::time::sleep;
use core_runtime::logging::display_locator;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};
use crate::state::CacheState;

/// What an observer needs from its owner.
#[async_trait]
pub trait DownloadTracker: Send + Sync {
    /// Resource being observed.
    fn metadata(&self) -> &RemoteResourceMetadata;

    /// Current state derived from the download subsystem.
    async fn poll(&self) -> Result<CacheState>;

    /// Whether the published state still shows this resource as
    /// `Downloading`.
    fn still_downloading(&self) -> bool;

    /// Publishes a terminal state. Returns `false` if the published state had
    /// already moved on.
    fn settle(&self, state: CacheState) -> bool;
}

/// How an observer finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverOutcome {
    /// The terminal state was published.
    Settled(CacheState),
    /// The published state moved away from `Downloading` first.
    Superseded,
}

pub struct DownloadObserver<T> {
    tracker: T,
    poll_interval: Duration,
    max_poll_failures: u32,
}

impl<T: DownloadTracker> DownloadObserver<T> {
    pub fn new(tracker: T, poll_interval: Duration, max_poll_failures: u32) -> Self {
        Self {
            tracker,
            poll_interval,
            max_poll_failures: max_poll_failures.max(1),
        }
    }

    #[instrument(
        skip_all,
        fields(locator = %display_locator(self.tracker.metadata().locator.as_str()))
    )]
    pub async fn run(self, token: CancellationToken) -> Result<ObserverOutcome> {
        let mut consecutive_failures = 0u32;

        loop {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            if !self.tracker.still_downloading() {
                debug!("Resource no longer downloading, observer exiting");
                return Ok(ObserverOutcome::Superseded);
            }

            match self.tracker.poll().await {
                Ok(CacheState::Downloading { .. }) => {
                    consecutive_failures = 0;
                }
                Ok(state) => {
                    let kind = state.kind();
                    if self.tracker.settle(state.clone()) {
                        debug!(state = kind, "Download settled");
                        return Ok(ObserverOutcome::Settled(state));
                    }
                    debug!(state = kind, "Terminal state superseded");
                    return Ok(ObserverOutcome::Superseded);
                }
                Err(err) => {
                    consecutive_failures += 1;
                    warn!(
                        error = %err,
                        attempt = consecutive_failures,
                        limit = self.max_poll_failures,
                        "Download poll failed"
                    );
                    if consecutive_failures >= self.max_poll_failures {
                        return Err(err);
                    }
                }
            }

            core_async::select! {
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                _ = sleep(self.poll_interval) => {}
            }
        }
    }
}
