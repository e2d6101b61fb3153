//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the download cache core:
//! - Logging and tracing infrastructure
//! - Configuration management with fail-fast capability checks
//! - Event bus for cache lifecycle notifications
//!
//! Every other core crate depends on this one for its logging conventions and
//! its view of the injected bridges.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
