//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use shadowset::{
    AsyncOperation, AsyncStatus, BackupState, BackupType, CapabilityGate, ComponentRef,
    ComponentType, FailPoint, FileRestoreStatus, LocationMapping, MemoryProvider, MemoryWriter,
    ObjectType, OperationKind, OrchestrationError, Phase, PlatformLevel, ProviderId, ProviderProperties,
    ProviderType, RestoreType, ShadowConfig, ShadowEngine, SnapshotCompatibility,
    SnapshotContext, SnapshotId, SnapshotSetId, SnapshotSetSession, SnapshotState,
    StaticPlatform, StatusCode, VolumeSnapshotAttributes, WriterComponent, WriterFailure,
    WriterId, WriterInstanceId, WriterState, WriterUsageType, SYSTEM_PROVIDER_ID,
};
pub use shadowset::codec::codes;
use std::sync::{Arc, Once};
use std::time::Duration;

/// Upper bound for waits that are expected to finish.
pub const WAIT: Option<Duration> = Some(Duration::from_secs(5));

/// Short wait used against held operations.
pub const SHORT: Option<Duration> = Some(Duration::from_millis(20));

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process (`RUST_LOG` style filters
/// are not needed; everything at debug goes to the captured test output).
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Fixtures
// ============================================================================

/// A database-style writer with two components.
pub fn mail_writer() -> MemoryWriter {
    MemoryWriter::new("Mail Writer")
        .with_component(
            WriterComponent::new(ComponentType::Database, "Mailbox Store")
                .with_logical_path("First Storage Group"),
        )
        .with_component(
            WriterComponent::new(ComponentType::FileGroup, "Transaction Logs")
                .with_logical_path("First Storage Group"),
        )
}

/// A file-group writer with one component.
pub fn registry_writer() -> MemoryWriter {
    MemoryWriter::new("Registry Writer")
        .with_component(WriterComponent::new(ComponentType::FileGroup, "Registry"))
}

/// Provider with three supported volumes, one unsupported volume and two writers.
pub fn provider() -> MemoryProvider {
    MemoryProvider::new()
        .with_volume("C:\\")
        .with_volume("D:\\")
        .with_volume("F:\\")
        .with_unsupported_volume("X:\\")
        .with_writer(mail_writer())
        .with_writer(registry_writer())
}

/// Address of a writer's component.
pub fn component_ref(writer: &MemoryWriter, index: usize) -> ComponentRef {
    let component = &writer.components[index];
    let reference = ComponentRef::new(writer.writer_id, component.component_type, component.name.clone());
    match &component.logical_path {
        Some(path) => reference.with_logical_path(path.clone()),
        None => reference,
    }
}

/// Engine over `provider` gating against `level`.
pub fn engine_at(provider: &MemoryProvider, level: PlatformLevel) -> ShadowEngine {
    init_tracing();
    ShadowEngine::with_platform(
        Arc::new(provider.clone()),
        ShadowConfig::default(),
        Arc::new(StaticPlatform(level)),
    )
    .unwrap()
}

/// Uninitialized session on the newest platform.
pub fn open(provider: &MemoryProvider) -> SnapshotSetSession {
    engine_at(provider, PlatformLevel::Server2008)
        .open_session()
        .unwrap()
}

/// Uninitialized session on `level`.
pub fn open_at(provider: &MemoryProvider, level: PlatformLevel) -> SnapshotSetSession {
    engine_at(provider, level).open_session().unwrap()
}

/// Wait for an operation and assert it succeeded.
pub fn finish(mut op: AsyncOperation) {
    assert_eq!(op.wait(WAIT), AsyncStatus::Succeeded, "{:?}", op.error());
}

/// Initialize for backup in `context`, gather metadata and declare a full backup.
pub fn ready_for_set(session: &mut SnapshotSetSession, context: SnapshotContext) {
    session.initialize_for_backup(None).unwrap();
    if context != SnapshotContext::BACKUP {
        session.set_context(context).unwrap();
    }
    finish(session.gather_writer_metadata().unwrap());
    session.set_backup_state(BackupState::default()).unwrap();
}

/// Drive a session through snapshot creation on `volumes`.
pub fn create_snapshots(
    session: &mut SnapshotSetSession,
    context: SnapshotContext,
    volumes: &[&str],
) -> (SnapshotSetId, Vec<SnapshotId>) {
    ready_for_set(session, context);
    let set = session.start_snapshot_set().unwrap();
    let ids = volumes
        .iter()
        .map(|volume| session.add_to_snapshot_set(volume, ProviderId::NULL).unwrap())
        .collect();
    finish(session.prepare_for_backup().unwrap());
    finish(session.do_snapshot_set().unwrap());
    assert_eq!(session.phase(), Phase::SnapshotsCreated);
    (set, ids)
}
