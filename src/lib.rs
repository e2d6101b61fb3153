//! Workspace umbrella crate.
//!
//! Exposes the feature flags that map onto the individual workspace crates
//! (currently `core-service`). Host applications can depend on
//! `download-cache-workspace` and enable `desktop-shims` to get the façade
//! together with the desktop bridge adapters.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;
