//! Time-related abstractions.
//!
//! Re-exports `tokio::time` so that tests can drive the clock with
//! `#[tokio::test(start_paused = true)]` and every poll loop in the core
//! observes the same virtual time.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let start = Instant::now();
//! sleep(Duration::from_millis(5)).await;
//! assert!(start.elapsed() >= Duration::from_millis(5));
//! # }
//! ```

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use tokio::time::Instant;
