//! Identity & result codec for the provider boundary
//!
//! Everything that crosses between the engine and a snapshot provider is
//! converted here:
//! - `NativeId` <-> `Uuid` (total, inverse, deterministic)
//! - `StatusCode` -> `Result<(), OrchestrationError>`
//! - native creation timestamps (100ns ticks since 1601-01-01) -> `DateTime<Utc>`
//!
//! No raw status code is allowed to leave this module as anything other than
//! a typed `OrchestrationError`.

use crate::error::{OrchestrationError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier in the provider's native layout
///
/// Mirrors the platform GUID structure field by field. Byte order of `data1`,
/// `data2` and `data3` is the integer value, not the in-memory encoding, so
/// conversion is independent of host endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeId {
    /// First 32 bits
    pub data1: u32,
    /// Next 16 bits
    pub data2: u16,
    /// Next 16 bits
    pub data3: u16,
    /// Trailing 64 bits
    pub data4: [u8; 8],
}

impl NativeId {
    /// The all-zero identifier ("no provider", "no snapshot")
    pub const NULL: NativeId = NativeId {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };

    /// Check whether this is the all-zero identifier
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// Convert a `Uuid` into the provider's native identifier
pub fn to_native_id(guid: Uuid) -> NativeId {
    let (data1, data2, data3, data4) = guid.as_fields();
    NativeId {
        data1,
        data2,
        data3,
        data4: *data4,
    }
}

/// Convert a native identifier back into a `Uuid`
pub fn to_guid(id: NativeId) -> Uuid {
    Uuid::from_fields(id.data1, id.data2, id.data3, &id.data4)
}

/// Raw provider status code (HRESULT layout)
///
/// Non-negative values are success codes, negative values are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub i32);

/// Result of a provider call that produces a value
pub type NativeResult<T> = std::result::Result<T, StatusCode>;

/// Known provider status codes
///
/// Failure codes are written in their unsigned hexadecimal form and
/// reinterpreted as `i32`.
pub mod codes {
    /// Generic success
    pub const OK: i32 = 0;
    /// Generic success with a "false" meaning
    pub const FALSE: i32 = 1;

    /// Async operation still running
    pub const ASYNC_PENDING: i32 = 0x0004_2309;
    /// Async operation finished successfully
    pub const ASYNC_FINISHED: i32 = 0x0004_230A;
    /// Async operation was cancelled
    pub const ASYNC_CANCELLED: i32 = 0x0004_230B;

    /// Object is in the wrong state for the call
    pub const BAD_STATE: i32 = 0x8004_2301_u32 as i32;
    /// Unexpected internal provider-infrastructure failure
    pub const UNEXPECTED: i32 = 0x8004_2302_u32 as i32;
    /// Provider id does not correspond to a registered provider
    pub const PROVIDER_NOT_REGISTERED: i32 = 0x8004_2304_u32 as i32;
    /// Provider refused the operation
    pub const PROVIDER_VETO: i32 = 0x8004_2306_u32 as i32;
    /// Provider is busy with another request
    pub const PROVIDER_IN_USE: i32 = 0x8004_2307_u32 as i32;
    /// Referenced object does not exist
    pub const OBJECT_NOT_FOUND: i32 = 0x8004_2308_u32 as i32;
    /// Volume cannot be snapshotted
    pub const VOLUME_NOT_SUPPORTED: i32 = 0x8004_230C_u32 as i32;
    /// Object already exists
    pub const OBJECT_ALREADY_EXISTS: i32 = 0x8004_230D_u32 as i32;
    /// Volume cannot be snapshotted by the requested provider
    pub const VOLUME_NOT_SUPPORTED_BY_PROVIDER: i32 = 0x8004_230E_u32 as i32;
    /// Provider failed in an unexpected way
    pub const UNEXPECTED_PROVIDER_ERROR: i32 = 0x8004_230F_u32 as i32;
    /// Backup document is malformed
    pub const INVALID_XML_DOCUMENT: i32 = 0x8004_2311_u32 as i32;
    /// Too many volumes in one snapshot set
    pub const MAXIMUM_NUMBER_OF_VOLUMES_REACHED: i32 = 0x8004_2312_u32 as i32;
    /// Writes could not be flushed in time
    pub const FLUSH_WRITES_TIMEOUT: i32 = 0x8004_2313_u32 as i32;
    /// Writes could not be held in time
    pub const HOLD_WRITES_TIMEOUT: i32 = 0x8004_2314_u32 as i32;
    /// Another snapshot set is being created
    pub const SNAPSHOT_SET_IN_PROGRESS: i32 = 0x8004_2316_u32 as i32;
    /// Too many snapshots on the volume
    pub const MAXIMUM_NUMBER_OF_SNAPSHOTS_REACHED: i32 = 0x8004_2317_u32 as i32;
    /// Context not supported by the provider
    pub const UNSUPPORTED_CONTEXT: i32 = 0x8004_231B_u32 as i32;
    /// Not enough storage for the snapshot
    pub const INSUFFICIENT_STORAGE: i32 = 0x8004_231F_u32 as i32;
    /// Volume is in use and cannot be dismounted
    pub const VOLUME_IN_USE: i32 = 0x8004_232C_u32 as i32;

    /// Writer reported an inconsistent snapshot
    pub const WRITER_INCONSISTENT_SNAPSHOT: i32 = 0x8004_23F0_u32 as i32;
    /// Writer ran out of resources
    pub const WRITER_OUT_OF_RESOURCES: i32 = 0x8004_23F1_u32 as i32;
    /// Writer timed out
    pub const WRITER_TIMEOUT: i32 = 0x8004_23F2_u32 as i32;
    /// Writer failed with a retryable error
    pub const WRITER_RETRYABLE: i32 = 0x8004_23F3_u32 as i32;
    /// Writer failed with a non-retryable error
    pub const WRITER_NON_RETRYABLE: i32 = 0x8004_23F4_u32 as i32;

    /// Not implemented
    pub const NOT_IMPLEMENTED: i32 = 0x8000_4001_u32 as i32;
    /// Access denied
    pub const ACCESS_DENIED: i32 = 0x8007_0005_u32 as i32;
    /// Out of memory
    pub const OUT_OF_MEMORY: i32 = 0x8007_000E_u32 as i32;
    /// Invalid argument
    pub const INVALID_ARG: i32 = 0x8007_0057_u32 as i32;
}

impl StatusCode {
    /// Generic success
    pub const OK: StatusCode = StatusCode(codes::OK);
    /// Async operation still running
    pub const ASYNC_PENDING: StatusCode = StatusCode(codes::ASYNC_PENDING);
    /// Async operation finished successfully
    pub const ASYNC_FINISHED: StatusCode = StatusCode(codes::ASYNC_FINISHED);
    /// Async operation was cancelled
    pub const ASYNC_CANCELLED: StatusCode = StatusCode(codes::ASYNC_CANCELLED);

    /// Check for a success-class code
    pub fn is_success(&self) -> bool {
        self.0 >= 0
    }

    /// Check for a failure-class code
    pub fn is_failure(&self) -> bool {
        self.0 < 0
    }

    /// The code as its unsigned bit pattern
    pub fn as_u32(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

/// Check a status code returned by a provider call
///
/// Success-class codes map to `Ok(())`. Failure codes map to the matching
/// `OrchestrationError` variant, or `NativeFailure` if unknown.
pub fn check_result(code: StatusCode) -> Result<()> {
    if code.is_success() {
        Ok(())
    } else {
        Err(map_failure(code))
    }
}

/// Check a value-producing provider call
pub fn check_value<T>(result: NativeResult<T>) -> Result<T> {
    result.map_err(map_failure)
}

/// Map a failure code to its typed error
///
/// Total over all `i32` values. A success code passed here (a provider
/// contract violation) becomes `NativeFailure` carrying the raw code.
pub fn map_failure(code: StatusCode) -> OrchestrationError {
    match code.0 {
        codes::BAD_STATE => OrchestrationError::InvalidSequence {
            operation: "provider call",
            reason: "provider reported the session is in the wrong state".to_string(),
        },
        codes::UNEXPECTED | codes::UNEXPECTED_PROVIDER_ERROR => {
            OrchestrationError::UnexpectedProviderError { code }
        }
        codes::PROVIDER_NOT_REGISTERED => OrchestrationError::ProviderNotRegistered,
        codes::PROVIDER_VETO => OrchestrationError::ProviderVeto,
        codes::PROVIDER_IN_USE => OrchestrationError::ProviderInUse,
        codes::OBJECT_NOT_FOUND => OrchestrationError::ObjectNotFound,
        codes::VOLUME_NOT_SUPPORTED | codes::VOLUME_NOT_SUPPORTED_BY_PROVIDER => {
            OrchestrationError::VolumeNotSupported { volume: None }
        }
        codes::OBJECT_ALREADY_EXISTS => OrchestrationError::ObjectAlreadyExists,
        codes::INVALID_XML_DOCUMENT => OrchestrationError::InvalidXmlDocument,
        codes::MAXIMUM_NUMBER_OF_VOLUMES_REACHED => OrchestrationError::MaximumVolumesReached,
        codes::FLUSH_WRITES_TIMEOUT => OrchestrationError::FlushWritesTimeout,
        codes::HOLD_WRITES_TIMEOUT => OrchestrationError::HoldWritesTimeout,
        codes::SNAPSHOT_SET_IN_PROGRESS => OrchestrationError::SnapshotSetInProgress,
        codes::MAXIMUM_NUMBER_OF_SNAPSHOTS_REACHED => OrchestrationError::MaximumSnapshotsReached,
        codes::UNSUPPORTED_CONTEXT => OrchestrationError::UnsupportedContext {
            reason: "provider does not support the snapshot context".to_string(),
        },
        codes::INSUFFICIENT_STORAGE => OrchestrationError::InsufficientStorage,
        codes::VOLUME_IN_USE => OrchestrationError::VolumeInUse,
        codes::WRITER_INCONSISTENT_SNAPSHOT..=codes::WRITER_NON_RETRYABLE => {
            OrchestrationError::WriterError { code }
        }
        codes::ACCESS_DENIED => OrchestrationError::AccessDenied,
        codes::INVALID_ARG => OrchestrationError::InvalidArgument {
            reason: "provider rejected an argument".to_string(),
        },
        codes::OUT_OF_MEMORY => OrchestrationError::OutOfMemory,
        _ => OrchestrationError::NativeFailure { code },
    }
}

/// Ticks between 1601-01-01 and 1970-01-01
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Convert a native timestamp into UTC
///
/// Values outside chrono's range fall back to the Unix epoch.
pub fn filetime_to_datetime(ticks: i64) -> DateTime<Utc> {
    let since_unix = ticks.saturating_sub(UNIX_EPOCH_TICKS);
    let secs = since_unix.div_euclid(TICKS_PER_SECOND);
    let nanos = (since_unix.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
}

/// Convert a UTC timestamp into native ticks
pub fn datetime_to_filetime(at: DateTime<Utc>) -> i64 {
    at.timestamp()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(i64::from(at.timestamp_subsec_nanos() / 100))
        .saturating_add(UNIX_EPOCH_TICKS)
}
