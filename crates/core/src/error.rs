//! Error types for shadowset
//!
//! This module defines the orchestration error taxonomy. Every fallible
//! operation of the engine returns one of these variants; raw provider status
//! codes never cross the component boundary (see [`crate::codec`]).
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::codec::{codes, StatusCode};
use crate::ids::SnapshotId;
use crate::platform::PlatformLevel;
use thiserror::Error;

/// Result type alias for shadowset operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Error types for snapshot-set orchestration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestrationError {
    /// Operation called out of lifecycle order
    #[error("Invalid sequence: cannot {operation}: {reason}")]
    InvalidSequence {
        /// Operation that was rejected
        operation: &'static str,
        /// Why the current state does not allow it
        reason: String,
    },

    /// The session's native handle has been released (aborted or disposed)
    #[error("Session closed: the native session handle has been released")]
    SessionClosed,

    /// Capability gate rejection
    #[error("Unsupported on platform: requires {required}, running {actual}")]
    UnsupportedOnPlatform {
        /// Required capability level(s)
        required: String,
        /// Level reported by the running platform
        actual: PlatformLevel,
    },

    /// Provider rejected the volume
    #[error("Volume not supported{}", describe_volume(.volume))]
    VolumeNotSupported {
        /// Volume name, when known at the point of failure
        volume: Option<String>,
    },

    /// Collection index outside `0..count`
    #[error("Index out of range: {index} (count {count})")]
    IndexOutOfRange {
        /// Requested index
        index: isize,
        /// Number of entries at the time of the call
        count: usize,
    },

    /// Deletion succeeded for some snapshots and failed for others
    #[error("Deleted {deleted_count} snapshot(s) before failing on {first_failed_id}: {cause}")]
    PartialDeleteFailure {
        /// Number of snapshots successfully deleted
        deleted_count: u32,
        /// First snapshot that could not be deleted
        first_failed_id: SnapshotId,
        /// Mapped provider failure
        #[source]
        cause: Box<OrchestrationError>,
    },

    /// Unmapped provider failure
    #[error("Native failure: {code}")]
    NativeFailure {
        /// Raw status code
        code: StatusCode,
    },

    /// Provider id does not correspond to a registered provider
    #[error("Provider not registered")]
    ProviderNotRegistered,

    /// Provider refused the operation
    #[error("Provider vetoed the operation")]
    ProviderVeto,

    /// Provider is busy with another request
    #[error("Provider in use")]
    ProviderInUse,

    /// Referenced snapshot, set, writer or component does not exist
    #[error("Object not found")]
    ObjectNotFound,

    /// Object already exists
    #[error("Object already exists")]
    ObjectAlreadyExists,

    /// Provider failed unexpectedly
    #[error("Unexpected provider error: {code}")]
    UnexpectedProviderError {
        /// Raw status code
        code: StatusCode,
    },

    /// Backup document could not be loaded
    #[error("Invalid backup document")]
    InvalidXmlDocument,

    /// Snapshot set already holds the maximum number of volumes
    #[error("Maximum number of volumes reached")]
    MaximumVolumesReached,

    /// Volume already holds the maximum number of snapshots
    #[error("Maximum number of snapshots reached")]
    MaximumSnapshotsReached,

    /// Writes could not be flushed in time
    #[error("Timed out flushing writes")]
    FlushWritesTimeout,

    /// Writes could not be held in time
    #[error("Timed out holding writes")]
    HoldWritesTimeout,

    /// Another snapshot set is being created
    #[error("Snapshot set creation already in progress")]
    SnapshotSetInProgress,

    /// Snapshot context does not allow the operation
    #[error("Unsupported context: {reason}")]
    UnsupportedContext {
        /// What the context is missing
        reason: String,
    },

    /// Not enough storage for the snapshot
    #[error("Insufficient storage")]
    InsufficientStorage,

    /// Volume is in use
    #[error("Volume in use")]
    VolumeInUse,

    /// A writer reported a failure
    #[error("Writer error: {code}")]
    WriterError {
        /// Raw writer failure code
        code: StatusCode,
    },

    /// Access denied
    #[error("Access denied")]
    AccessDenied,

    /// Invalid argument
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument
        reason: String,
    },

    /// Out of memory
    #[error("Out of memory")]
    OutOfMemory,

    /// Volume has no snapshots
    #[error("No snapshot exists for volume {volume}")]
    NoSnapshots {
        /// Queried volume
        volume: String,
    },

    /// Configuration file could not be read or written
    #[error("Configuration error: {reason}")]
    Configuration {
        /// What went wrong
        reason: String,
    },

    /// Async operation was cancelled before completing
    #[error("Operation cancelled: {operation}")]
    Cancelled {
        /// Operation that was cancelled
        operation: &'static str,
    },
}

fn describe_volume(volume: &Option<String>) -> String {
    match volume {
        Some(v) => format!(": {}", v),
        None => String::new(),
    }
}

impl OrchestrationError {
    /// Build an `InvalidSequence` error
    pub fn invalid_sequence(operation: &'static str, reason: impl Into<String>) -> Self {
        OrchestrationError::InvalidSequence {
            operation,
            reason: reason.into(),
        }
    }

    /// Build an `InvalidArgument` error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        OrchestrationError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Build an `UnsupportedContext` error
    pub fn unsupported_context(reason: impl Into<String>) -> Self {
        OrchestrationError::UnsupportedContext {
            reason: reason.into(),
        }
    }

    /// Build a `Configuration` error
    pub fn configuration(reason: impl Into<String>) -> Self {
        OrchestrationError::Configuration {
            reason: reason.into(),
        }
    }

    /// Attach the volume name to a `VolumeNotSupported` error
    ///
    /// Other variants are returned unchanged.
    pub fn with_volume(self, volume: &str) -> Self {
        match self {
            OrchestrationError::VolumeNotSupported { volume: None } => {
                OrchestrationError::VolumeNotSupported {
                    volume: Some(volume.to_string()),
                }
            }
            other => other,
        }
    }

    /// Canonical error code
    pub fn error_code(&self) -> &'static str {
        match self {
            OrchestrationError::InvalidSequence { .. } => "InvalidSequence",
            OrchestrationError::SessionClosed => "SessionClosed",
            OrchestrationError::UnsupportedOnPlatform { .. } => "UnsupportedOnPlatform",
            OrchestrationError::VolumeNotSupported { .. } => "VolumeNotSupported",
            OrchestrationError::IndexOutOfRange { .. } => "IndexOutOfRange",
            OrchestrationError::PartialDeleteFailure { .. } => "PartialDeleteFailure",
            OrchestrationError::NativeFailure { .. } => "NativeFailure",
            OrchestrationError::ProviderNotRegistered => "ProviderNotRegistered",
            OrchestrationError::ProviderVeto => "ProviderVeto",
            OrchestrationError::ProviderInUse => "ProviderInUse",
            OrchestrationError::ObjectNotFound => "ObjectNotFound",
            OrchestrationError::ObjectAlreadyExists => "ObjectAlreadyExists",
            OrchestrationError::UnexpectedProviderError { .. } => "UnexpectedProviderError",
            OrchestrationError::InvalidXmlDocument => "InvalidXmlDocument",
            OrchestrationError::MaximumVolumesReached => "MaximumVolumesReached",
            OrchestrationError::MaximumSnapshotsReached => "MaximumSnapshotsReached",
            OrchestrationError::FlushWritesTimeout => "FlushWritesTimeout",
            OrchestrationError::HoldWritesTimeout => "HoldWritesTimeout",
            OrchestrationError::SnapshotSetInProgress => "SnapshotSetInProgress",
            OrchestrationError::UnsupportedContext { .. } => "UnsupportedContext",
            OrchestrationError::InsufficientStorage => "InsufficientStorage",
            OrchestrationError::VolumeInUse => "VolumeInUse",
            OrchestrationError::WriterError { .. } => "WriterError",
            OrchestrationError::AccessDenied => "AccessDenied",
            OrchestrationError::InvalidArgument { .. } => "InvalidArgument",
            OrchestrationError::OutOfMemory => "OutOfMemory",
            OrchestrationError::NoSnapshots { .. } => "NoSnapshots",
            OrchestrationError::Configuration { .. } => "Configuration",
            OrchestrationError::Cancelled { .. } => "Cancelled",
        }
    }

    /// Provider status code behind this error, if it came from the provider
    ///
    /// Engine-raised errors (sequence, gate, bounds) return `None`.
    pub fn status_code(&self) -> Option<StatusCode> {
        let raw = match self {
            OrchestrationError::NativeFailure { code }
            | OrchestrationError::UnexpectedProviderError { code }
            | OrchestrationError::WriterError { code } => return Some(*code),
            OrchestrationError::PartialDeleteFailure { cause, .. } => return cause.status_code(),
            OrchestrationError::ProviderNotRegistered => codes::PROVIDER_NOT_REGISTERED,
            OrchestrationError::ProviderVeto => codes::PROVIDER_VETO,
            OrchestrationError::ProviderInUse => codes::PROVIDER_IN_USE,
            OrchestrationError::ObjectNotFound => codes::OBJECT_NOT_FOUND,
            OrchestrationError::ObjectAlreadyExists => codes::OBJECT_ALREADY_EXISTS,
            OrchestrationError::InvalidXmlDocument => codes::INVALID_XML_DOCUMENT,
            OrchestrationError::MaximumVolumesReached => codes::MAXIMUM_NUMBER_OF_VOLUMES_REACHED,
            OrchestrationError::MaximumSnapshotsReached => {
                codes::MAXIMUM_NUMBER_OF_SNAPSHOTS_REACHED
            }
            OrchestrationError::FlushWritesTimeout => codes::FLUSH_WRITES_TIMEOUT,
            OrchestrationError::HoldWritesTimeout => codes::HOLD_WRITES_TIMEOUT,
            OrchestrationError::SnapshotSetInProgress => codes::SNAPSHOT_SET_IN_PROGRESS,
            OrchestrationError::InsufficientStorage => codes::INSUFFICIENT_STORAGE,
            OrchestrationError::VolumeInUse => codes::VOLUME_IN_USE,
            OrchestrationError::AccessDenied => codes::ACCESS_DENIED,
            OrchestrationError::OutOfMemory => codes::OUT_OF_MEMORY,
            _ => return None,
        };
        Some(StatusCode(raw))
    }

    /// Check for `SessionClosed`
    pub fn is_session_closed(&self) -> bool {
        matches!(self, OrchestrationError::SessionClosed)
    }

    /// Check for `InvalidSequence`
    pub fn is_invalid_sequence(&self) -> bool {
        matches!(self, OrchestrationError::InvalidSequence { .. })
    }

    /// Check for `UnsupportedOnPlatform`
    pub fn is_unsupported_on_platform(&self) -> bool {
        matches!(self, OrchestrationError::UnsupportedOnPlatform { .. })
    }

    /// Check for `InvalidArgument`
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, OrchestrationError::InvalidArgument { .. })
    }
}
