//! `ShadowEngine` entry points

use crate::common::*;
use shadowset::{PlatformInfo, SnapshotProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Platform whose level can change between calls
struct Upgradable {
    level: AtomicUsize,
}

impl PlatformInfo for Upgradable {
    fn level(&self) -> PlatformLevel {
        PlatformLevel::ALL[self.level.load(Ordering::SeqCst)]
    }
}

#[test]
fn engines_share_one_provider() {
    let provider = provider();
    let engine = engine_at(&provider, PlatformLevel::Server2008);
    let other = engine.clone();

    let mut first = engine.open_session().unwrap();
    let (set, _) = create_snapshots(&mut first, SnapshotContext::APP_ROLLBACK, &["C:\\"]);
    finish(first.backup_complete().unwrap());

    let mut second = other.begin_backup(None).unwrap();
    assert_eq!(second.query_snapshots().unwrap().len(), 1);
    assert_eq!(second.delete_snapshot_set(set, false).unwrap(), 1);
    assert_eq!(provider.live_sessions(), 2);
}

#[test]
fn begin_restore_loads_the_document() {
    let provider = provider();
    let engine = engine_at(&provider, PlatformLevel::Server2008);
    let mut backup = engine.begin_backup(None).unwrap();
    finish(backup.gather_writer_metadata().unwrap());
    backup.set_backup_state(BackupState::default()).unwrap();
    backup.start_snapshot_set().unwrap();
    backup.add_to_snapshot_set("F:\\", ProviderId::NULL).unwrap();
    finish(backup.prepare_for_backup().unwrap());
    finish(backup.do_snapshot_set().unwrap());
    let document = backup.save_as_xml().unwrap();

    let restore = engine.begin_restore(&document).unwrap();
    assert_eq!(restore.phase(), Phase::Restoring);
    assert!(engine.begin_restore("").unwrap_err().is_invalid_argument());
}

#[test]
fn session_creation_failure_is_mapped() {
    let provider = provider();
    provider.fail_call(FailPoint::CreateSession, codes::OUT_OF_MEMORY);
    let engine = engine_at(&provider, PlatformLevel::Server2008);
    assert_eq!(engine.open_session().unwrap_err(), OrchestrationError::OutOfMemory);
    assert_eq!(engine.begin_backup(None).unwrap_err(), OrchestrationError::OutOfMemory);
    assert_eq!(provider.live_sessions(), 0);
}

#[test]
fn gate_follows_a_live_platform() {
    let provider = provider();
    let platform = Arc::new(Upgradable {
        level: AtomicUsize::new(0),
    });
    let engine = ShadowEngine::with_platform(
        Arc::new(provider.clone()),
        ShadowConfig::default(),
        platform.clone(),
    )
    .unwrap();
    assert_eq!(engine.platform_level(), PlatformLevel::Xp);

    let mut session = engine.begin_backup(None).unwrap();
    assert!(session
        .set_context(SnapshotContext::APP_ROLLBACK)
        .unwrap_err()
        .is_unsupported_on_platform());

    platform.level.store(1, Ordering::SeqCst);
    session.set_context(SnapshotContext::APP_ROLLBACK).unwrap();
    assert_eq!(session.platform_level(), PlatformLevel::Server2003);
}

#[test]
fn provider_trait_object_is_usable_directly() {
    let provider = provider();
    let native: Arc<dyn SnapshotProvider> = Arc::new(provider.clone());
    let status = native.is_volume_snapshotted("C:\\").unwrap();
    assert!(!status.snapshots_present);
    assert!(native.create_session().is_ok());
    assert_eq!(provider.live_sessions(), 0);
}

#[test]
fn volume_query_failures() {
    let provider = provider();
    let engine = engine_at(&provider, PlatformLevel::Server2008);
    assert_eq!(
        engine.is_volume_snapshotted("Q:\\").unwrap_err(),
        OrchestrationError::ObjectNotFound
    );

    provider.fail_call(FailPoint::IsVolumeSnapshotted, codes::ACCESS_DENIED);
    assert_eq!(
        engine.snapshot_compatibility("C:\\").unwrap_err(),
        OrchestrationError::AccessDenied
    );
    provider.fail_call(FailPoint::ShouldBlockRevert, codes::PROVIDER_IN_USE);
    assert_eq!(
        engine.should_block_revert("C:\\").unwrap_err(),
        OrchestrationError::ProviderInUse
    );
}
