//! Runtime utilities.
//!
//! Hosts that are not already inside a Tokio runtime (CLI entry points,
//! synchronous platform callbacks) use [`block_on`] to drive a single core
//! operation to completion.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// Fails only if the runtime itself cannot be constructed.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
