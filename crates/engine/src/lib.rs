//! Snapshot-set orchestration engine
//!
//! This crate drives snapshot providers through the backup and restore
//! lifecycle:
//! - Provider boundary: the traits a snapshot provider implements
//! - Session: the snapshot-set state machine over one native session
//! - Async operations: handles for background provider work
//! - Collections: live views over writer metadata, components and status
//! - Capability gate: platform-level checks for gated operations
//! - Configuration and the `ShadowEngine` entry point
//! - An in-memory reference provider
//!
//! The engine is the only component that knows about:
//! - Lifecycle ordering (what may be called when)
//! - Native handle ownership and release
//! - Conversion between native and engine-side types

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod async_op;
pub mod capability;
pub mod collections;
pub mod config;
pub mod engine;
pub mod memory;
pub mod provider;
pub mod session;

pub use async_op::{AsyncOperation, AsyncStatus, OperationKind};
pub use capability::{CapabilityGate, PlatformInfo, StaticPlatform};
pub use collections::{
    LiveView, ViewKind, WriterComponentsList, WriterMetadataList, WriterStatusList,
};
pub use config::{ShadowConfig, CONFIG_FILE_NAME};
pub use engine::ShadowEngine;
pub use memory::{FailPoint, MemoryProvider, MemoryWriter, SYSTEM_PROVIDER_ID};
pub use provider::{
    NativeAsync, NativeComponentRef, NativeDeleteOutcome, NativeProviderProperties,
    NativeSession, NativeSnapshotProperties, NativeVolumeStatus, NativeWriterComponents,
    NativeWriterMetadata, NativeWriterStatus, SnapshotProvider,
};
pub use session::SnapshotSetSession;
