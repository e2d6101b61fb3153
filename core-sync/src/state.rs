//! Per-resource cache state and the download failure taxonomy.

use std::fmt;
use std::path::PathBuf;

use bridge_traits::download::{reason, DownloadRecord, RecordStatus};
use bridge_traits::{Locator, RemoteResourceMetadata};
use serde::{Deserialize, Serialize};

/// Why a transfer failed, translated from the subsystem's native code.
///
/// Closed set: any code without a dedicated variant becomes [`Http`](Self::Http).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum DownloadError {
    Unknown,
    FileError,
    UnhandledHttpCode,
    HttpDataError,
    TooManyRedirects,
    InsufficientSpace,
    DeviceNotFound,
    CannotResume,
    FileAlreadyExists,
    Http(i32),
}

impl DownloadError {
    pub fn from_code(code: i32) -> Self {
        match code {
            reason::ERROR_UNKNOWN => Self::Unknown,
            reason::ERROR_FILE_ERROR => Self::FileError,
            reason::ERROR_UNHANDLED_HTTP_CODE => Self::UnhandledHttpCode,
            reason::ERROR_HTTP_DATA_ERROR => Self::HttpDataError,
            reason::ERROR_TOO_MANY_REDIRECTS => Self::TooManyRedirects,
            reason::ERROR_INSUFFICIENT_SPACE => Self::InsufficientSpace,
            reason::ERROR_DEVICE_NOT_FOUND => Self::DeviceNotFound,
            reason::ERROR_CANNOT_RESUME => Self::CannotResume,
            reason::ERROR_FILE_ALREADY_EXISTS => Self::FileAlreadyExists,
            other => Self::Http(other),
        }
    }

    /// Native code this error was translated from.
    pub fn code(&self) -> i32 {
        match self {
            Self::Unknown => reason::ERROR_UNKNOWN,
            Self::FileError => reason::ERROR_FILE_ERROR,
            Self::UnhandledHttpCode => reason::ERROR_UNHANDLED_HTTP_CODE,
            Self::HttpDataError => reason::ERROR_HTTP_DATA_ERROR,
            Self::TooManyRedirects => reason::ERROR_TOO_MANY_REDIRECTS,
            Self::InsufficientSpace => reason::ERROR_INSUFFICIENT_SPACE,
            Self::DeviceNotFound => reason::ERROR_DEVICE_NOT_FOUND,
            Self::CannotResume => reason::ERROR_CANNOT_RESUME,
            Self::FileAlreadyExists => reason::ERROR_FILE_ALREADY_EXISTS,
            Self::Http(code) => *code,
        }
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown download error"),
            Self::FileError => f.write_str("storage error while writing the file"),
            Self::UnhandledHttpCode => f.write_str("unhandled HTTP response code"),
            Self::HttpDataError => f.write_str("error receiving data"),
            Self::TooManyRedirects => f.write_str("too many redirects"),
            Self::InsufficientSpace => f.write_str("insufficient storage space"),
            Self::DeviceNotFound => f.write_str("storage device not found"),
            Self::CannotResume => f.write_str("download cannot be resumed"),
            Self::FileAlreadyExists => f.write_str("destination file already exists"),
            Self::Http(code) => write!(f, "HTTP {code}"),
        }
    }
}

/// The engine's belief about one resource's local availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheState {
    NotCached {
        metadata: RemoteResourceMetadata,
    },
    Downloading {
        metadata: RemoteResourceMetadata,
    },
    Cached {
        metadata: RemoteResourceMetadata,
        file: PathBuf,
    },
    Error {
        metadata: RemoteResourceMetadata,
        reason: DownloadError,
    },
}

impl CacheState {
    /// Maps the subsystem's view of a resource onto a cache state.
    ///
    /// | record            | state        |
    /// |-------------------|--------------|
    /// | none              | `NotCached`  |
    /// | pending/running/paused | `Downloading` |
    /// | successful        | `Cached` at the record's local locator |
    /// | failed            | `Error` with the translated code |
    pub fn from_record(metadata: RemoteResourceMetadata, record: Option<&DownloadRecord>) -> Self {
        let Some(record) = record else {
            return Self::NotCached { metadata };
        };

        match &record.status {
            RecordStatus::Pending | RecordStatus::Running | RecordStatus::Paused => {
                Self::Downloading { metadata }
            }
            RecordStatus::Successful { local_locator } => Self::Cached {
                metadata,
                file: local_locator.to_file_path(),
            },
            RecordStatus::Failed { error_code } => Self::Error {
                metadata,
                reason: DownloadError::from_code(*error_code),
            },
        }
    }

    pub fn metadata(&self) -> &RemoteResourceMetadata {
        match self {
            Self::NotCached { metadata }
            | Self::Downloading { metadata }
            | Self::Cached { metadata, .. }
            | Self::Error { metadata, .. } => metadata,
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.metadata().locator
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotCached { .. } => "not_cached",
            Self::Downloading { .. } => "downloading",
            Self::Cached { .. } => "cached",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self, Self::Downloading { .. })
    }

    pub fn not_cached(metadata: RemoteResourceMetadata) -> Self {
        Self::NotCached { metadata }
    }

    pub fn downloading(metadata: RemoteResourceMetadata) -> Self {
        Self::Downloading { metadata }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::RecordId;

    fn meta() -> RemoteResourceMetadata {
        RemoteResourceMetadata::new("A", "u1")
    }

    fn record(status: RecordStatus) -> DownloadRecord {
        DownloadRecord {
            id: RecordId(1),
            remote_locator: Locator::new("u1"),
            status,
        }
    }

    #[test]
    fn test_no_record_is_not_cached() {
        assert_eq!(
            CacheState::from_record(meta(), None),
            CacheState::NotCached { metadata: meta() }
        );
    }

    #[test]
    fn test_in_flight_statuses_are_downloading() {
        for status in [RecordStatus::Pending, RecordStatus::Running, RecordStatus::Paused] {
            let state = CacheState::from_record(meta(), Some(&record(status)));
            assert!(state.is_downloading());
        }
    }

    #[test]
    fn test_successful_resolves_local_file() {
        let state = CacheState::from_record(
            meta(),
            Some(&record(RecordStatus::Successful {
                local_locator: Locator::new("file://x/A"),
            })),
        );

        assert_eq!(
            state,
            CacheState::Cached {
                metadata: meta(),
                file: PathBuf::from("x/A"),
            }
        );
    }

    #[test]
    fn test_failed_translates_reason() {
        let state = CacheState::from_record(
            meta(),
            Some(&record(RecordStatus::Failed {
                error_code: reason::ERROR_INSUFFICIENT_SPACE,
            })),
        );

        assert_eq!(
            state,
            CacheState::Error {
                metadata: meta(),
                reason: DownloadError::InsufficientSpace,
            }
        );
    }

    #[test]
    fn test_native_codes_translate() {
        let table = [
            (1000, DownloadError::Unknown),
            (1001, DownloadError::FileError),
            (1002, DownloadError::UnhandledHttpCode),
            (1004, DownloadError::HttpDataError),
            (1005, DownloadError::TooManyRedirects),
            (1006, DownloadError::InsufficientSpace),
            (1007, DownloadError::DeviceNotFound),
            (1008, DownloadError::CannotResume),
            (1009, DownloadError::FileAlreadyExists),
        ];

        for (code, expected) in table {
            assert_eq!(DownloadError::from_code(code), expected);
            assert_eq!(expected.code(), code);
        }
    }

    #[test]
    fn test_unrecognized_codes_fall_back_to_http() {
        assert_eq!(DownloadError::from_code(404), DownloadError::Http(404));
        assert_eq!(DownloadError::from_code(1003), DownloadError::Http(1003));
        assert_eq!(DownloadError::Http(503).to_string(), "HTTP 503");
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let state = CacheState::Error {
            metadata: meta(),
            reason: DownloadError::Http(410),
        };
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["state"], "error");
        assert_eq!(json["metadata"]["locator"], "u1");
        assert_eq!(json["reason"]["kind"], "http");
        assert_eq!(json["reason"]["code"], 410);
    }
}
