//! Synchronization primitives.
//!
//! Everything here is async-aware and `Send + Sync`:
//! - Mutexes and RwLocks never block the executor
//! - `watch` backs single-value publication (latest snapshot wins)
//! - `broadcast` backs fan-out event delivery
//! - `CancellationToken` is the cooperative stop signal for poll loops
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{CancellationToken, Mutex};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mutex = Mutex::new(42);
//! *mutex.lock().await += 1;
//!
//! let token = CancellationToken::new();
//! let child = token.child_token();
//! token.cancel();
//! assert!(child.is_cancelled());
//! # }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

pub use tokio_util::sync::CancellationToken;
