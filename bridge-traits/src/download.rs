//! Download subsystem contract.
//!
//! The subsystem owns transport, retry, and scheduling. The core only reads
//! its record list and asks it to enqueue or forget transfers.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metadata::Locator;

/// Subsystem-assigned identifier of a transfer record.
///
/// Identifiers grow monotonically, so a larger id is a more recent enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Native failure codes reported alongside [`RecordStatus::Failed`].
///
/// Codes below 1000 are HTTP status codes passed through by the subsystem.
pub mod reason {
    pub const ERROR_UNKNOWN: i32 = 1000;
    pub const ERROR_FILE_ERROR: i32 = 1001;
    pub const ERROR_UNHANDLED_HTTP_CODE: i32 = 1002;
    pub const ERROR_HTTP_DATA_ERROR: i32 = 1004;
    pub const ERROR_TOO_MANY_REDIRECTS: i32 = 1005;
    pub const ERROR_INSUFFICIENT_SPACE: i32 = 1006;
    pub const ERROR_DEVICE_NOT_FOUND: i32 = 1007;
    pub const ERROR_CANNOT_RESUME: i32 = 1008;
    pub const ERROR_FILE_ALREADY_EXISTS: i32 = 1009;
}

/// Transfer status as reported by the subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Running,
    Paused,
    Successful { local_locator: Locator },
    Failed { error_code: i32 },
}

impl RecordStatus {
    /// `Successful` and `Failed` are terminal; everything else is in flight.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful { .. } | Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Successful { .. } => "successful",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A transfer record read from the subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: RecordId,
    pub remote_locator: Locator,
    #[serde(flatten)]
    pub status: RecordStatus,
}

/// Platform download-transfer service.
///
/// Record lists are eventually consistent: a `query` reflects the most recent
/// `enqueue` or `remove` within one poll period. Callers must not cache
/// records across calls.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::download::DownloadSubsystem;
///
/// async fn pending(subsystem: &dyn DownloadSubsystem) -> Result<usize> {
///     let records = subsystem.query().await?;
///     Ok(records.iter().filter(|r| !r.status.is_terminal()).count())
/// }
/// ```
#[async_trait]
pub trait DownloadSubsystem: Send + Sync {
    /// Requests a transfer of `locator` into `destination`.
    async fn enqueue(&self, locator: &Locator, destination: &Path) -> Result<RecordId>;

    /// Returns every record the subsystem currently knows about.
    async fn query(&self) -> Result<Vec<DownloadRecord>>;

    /// Forgets a record. Removing an in-flight record cancels its transfer.
    async fn remove(&self, id: RecordId) -> Result<()>;
}
