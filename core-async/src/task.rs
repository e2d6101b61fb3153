//! Task spawning and supervision.
//!
//! Plain [`spawn`] forwards to `tokio::task::spawn`. Long-lived background
//! work (reconciliation passes, download observers) runs inside a
//! [`TaskGroup`] instead, which gives the owner three guarantees:
//!
//! - A child that returns an error or panics is reported through the group's
//!   failure handler and never cancels its siblings.
//! - Every child is raced against the group's cancellation token, so
//!   [`TaskGroup::shutdown`] stops all live children.
//! - `shutdown` waits until every child has actually finished.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task::TaskGroup;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let group = TaskGroup::new("workers")
//!     .with_failure_handler(|failure| eprintln!("{failure}"));
//!
//! group.spawn("fails", async { Err::<(), _>("boom") });
//! group.spawn("succeeds", async { Ok::<(), &str>(()) });
//!
//! group.shutdown().await;
//! # }
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the Tokio runtime.
///
/// # Examples
///
/// ```rust
/// use core_async::task::spawn;
///
/// # #[tokio::main]
/// # async fn main() {
/// let handle = spawn(async { 42 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;

/// A child task of a [`TaskGroup`] that ended with an error or a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Name of the group the task belonged to.
    pub group: String,
    /// Label given to the task at spawn time.
    pub label: String,
    /// Rendered error or panic payload.
    pub message: String,
    /// Whether the task panicked rather than returning an error.
    pub panicked: bool,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.panicked { "panicked" } else { "failed" };
        write!(f, "{}/{} {}: {}", self.group, self.label, kind, self.message)
    }
}

type FailureHandler = Arc<dyn Fn(TaskFailure) + Send + Sync>;

enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Supervising group for background tasks.
///
/// Cloning a `TaskGroup` yields another handle to the same group.
#[derive(Clone)]
pub struct TaskGroup {
    name: Arc<str>,
    token: CancellationToken,
    tracker: TaskTracker,
    on_failure: FailureHandler,
}

impl TaskGroup {
    /// Creates an empty group whose failures are silently discarded.
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            on_failure: Arc::new(|_| {}),
        }
    }

    /// Installs the callback invoked for every failed or panicked child.
    pub fn with_failure_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(TaskFailure) + Send + Sync + 'static,
    {
        self.on_failure = Arc::new(handler);
        self
    }

    /// Name of the group, used in failure reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a token that is cancelled when the group shuts down.
    ///
    /// Children that loop should check it on every iteration.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Whether [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of children that have not finished yet.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Spawns a supervised child.
    ///
    /// Returns `false` without spawning when the group is already shut down.
    pub fn spawn<F, E>(&self, label: impl Into<String>, future: F) -> bool
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        if self.token.is_cancelled() {
            return false;
        }

        let label = label.into();
        let group = self.name.to_string();
        let token = self.token.clone();
        let on_failure = Arc::clone(&self.on_failure);

        let child = tokio::task::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Outcome::Cancelled,
                result = future => match result {
                    Ok(()) => Outcome::Completed,
                    Err(err) => Outcome::Failed(err.to_string()),
                },
            }
        });

        self.tracker.spawn(async move {
            let failure = match child.await {
                Ok(Outcome::Completed) | Ok(Outcome::Cancelled) => None,
                Ok(Outcome::Failed(message)) => Some((message, false)),
                Err(err) if err.is_panic() => Some((panic_message(err.into_panic()), true)),
                Err(_) => None,
            };

            if let Some((message, panicked)) = failure {
                on_failure(TaskFailure {
                    group,
                    label,
                    message,
                    panicked,
                });
            }
        });

        true
    }

    /// Waits until every child spawned so far has finished, without
    /// cancelling anything.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        if !self.token.is_cancelled() {
            self.tracker.reopen();
        }
    }

    /// Cancels every live child and waits for all of them to finish.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGroup")
            .field("name", &self.name)
            .field("active_tasks", &self.tracker.len())
            .field("shutdown", &self.token.is_cancelled())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
