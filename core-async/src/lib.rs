//! Async abstraction layer for the download cache core.
//!
//! The core-* crates depend on this crate instead of reaching for
//! tokio directly, so the runtime surface the core relies on stays in one
//! place.
//!
//! # Modules
//!
//! - `task`: Task spawning and the supervising [`TaskGroup`](task::TaskGroup)
//! - `time`: Time-related operations (sleep, timeout, duration, instant)
//! - `sync`: Synchronization primitives (Mutex, RwLock, channels, cancellation)
//! - `runtime`: `block_on` for hosts outside a runtime
//!
//! # Examples
//!
//! ```rust
//! use core_async::task::TaskGroup;
//! use core_async::time::{sleep, Duration};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let group = TaskGroup::new("example");
//! group.spawn("nap", async {
//!     sleep(Duration::from_millis(1)).await;
//!     Ok::<(), String>(())
//! });
//! group.shutdown().await;
//! # }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::{spawn, TaskFailure, TaskGroup};
pub use tokio::select;
pub use time::{sleep, Duration, Instant};
