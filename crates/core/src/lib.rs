//! Core types for shadowset
//!
//! This crate defines the foundational types shared by the engine and by
//! provider implementations:
//! - Identifiers: SnapshotSetId, SnapshotId, ProviderId, WriterId, WriterInstanceId
//! - Codec: NativeId/StatusCode conversion at the provider boundary
//! - Error: OrchestrationError taxonomy and the Result alias
//! - Types: contexts, attribute flags and the provider enumerations
//! - Records: snapshot/provider properties and writer projections
//! - Phase: the snapshot-set session lifecycle
//! - Platform: capability levels consulted by the capability gate

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod ids;
pub mod phase;
pub mod platform;
pub mod records;
pub mod types;

pub use codec::{
    check_result, check_value, filetime_to_datetime, datetime_to_filetime, map_failure, to_guid,
    to_native_id, NativeId, NativeResult, StatusCode,
};
pub use error::{OrchestrationError, Result};
pub use ids::{ProviderId, SnapshotId, SnapshotSetId, WriterId, WriterInstanceId};
pub use phase::Phase;
pub use platform::{PlatformFamily, PlatformLevel};
pub use records::{
    BackupState, ComponentRef, LocationMapping, ProviderProperties, SnapshotProperties,
    WriterComponent, WriterComponentsEntry, WriterMetadataEntry, WriterStatusEntry,
};
pub use types::{
    BackupType, ComponentType, FileRestoreStatus, ObjectType, ProviderType, RestoreMethod,
    RestoreType, SnapshotCompatibility, SnapshotContext, SnapshotState, VolumeSnapshotAttributes,
    WriterFailure, WriterState, WriterUsageType,
};
