//! Abort, release and drop
//!
//! Every path out of a session releases the native handle exactly once.

use crate::common::*;

#[test]
fn release_is_idempotent() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    assert_eq!(provider.live_sessions(), 1);

    session.release();
    assert_eq!(session.phase(), Phase::Disposed);
    assert!(session.is_closed());
    assert_eq!(provider.live_sessions(), 0);

    session.release();
    assert_eq!(session.phase(), Phase::Disposed);
    assert_eq!(provider.live_sessions(), 0);
}

#[test]
fn drop_releases_native_session() {
    let provider = provider();
    {
        let _a = open(&provider);
        let _b = open(&provider);
        assert_eq!(provider.live_sessions(), 2);
    }
    assert_eq!(provider.live_sessions(), 0);
}

#[test]
fn every_operation_after_release_is_session_closed() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    let set = session.start_snapshot_set().unwrap();
    let snapshot = session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    session.release();

    let closed = |err: OrchestrationError| assert!(err.is_session_closed(), "{}", err);
    closed(session.initialize_for_backup(None).unwrap_err());
    closed(session.set_context(SnapshotContext::BACKUP).unwrap_err());
    closed(session.gather_writer_metadata().unwrap_err());
    closed(session.gather_writer_status().unwrap_err());
    closed(session.set_backup_state(BackupState::default()).unwrap_err());
    closed(session.start_snapshot_set().unwrap_err());
    closed(session.add_to_snapshot_set("D:\\", ProviderId::NULL).unwrap_err());
    closed(session.prepare_for_backup().unwrap_err());
    closed(session.do_snapshot_set().unwrap_err());
    closed(session.backup_complete().unwrap_err());
    closed(session.save_as_xml().unwrap_err());
    closed(session.delete_snapshot(snapshot, false).unwrap_err());
    closed(session.delete_snapshot_set(set, true).unwrap_err());
    closed(session.break_snapshot_set(set).unwrap_err());
    closed(session.get_snapshot_properties(snapshot).unwrap_err());
    closed(session.query_snapshots().unwrap_err());
    closed(session.query_providers().unwrap_err());
    closed(session.is_volume_supported(ProviderId::NULL, "C:\\").unwrap_err());
    closed(session.set_restore_state(RestoreType::ByCopy).unwrap_err());
    closed(session.pre_restore().unwrap_err());
    closed(session.writer_metadata().count().unwrap_err());

    // a closed session rejects even calls that would otherwise be invalid arguments
    closed(session.add_to_snapshot_set("", ProviderId::NULL).unwrap_err());
    closed(session
        .delete_snapshots(set.as_uuid(), ObjectType::Provider, false)
        .unwrap_err());
    assert_eq!(session.phase(), Phase::Disposed);
}

#[test]
fn abort_closes_and_releases() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    session.start_snapshot_set().unwrap();

    session.abort_backup().unwrap();
    assert_eq!(session.phase(), Phase::Aborted);
    assert!(session.is_closed());
    assert_eq!(provider.live_sessions(), 0);
    assert!(session.start_snapshot_set().unwrap_err().is_session_closed());

    // second abort is a no-op
    session.abort_backup().unwrap();
    assert_eq!(session.phase(), Phase::Aborted);

    session.release();
    assert_eq!(session.phase(), Phase::Disposed);
}

#[test]
fn abort_before_initialization() {
    let provider = provider();
    let mut session = open(&provider);
    session.abort_backup().unwrap();
    assert_eq!(session.phase(), Phase::Aborted);
}

#[test]
fn abort_native_failure_still_closes() {
    let provider = provider();
    provider.fail_call(FailPoint::AbortBackup, codes::UNEXPECTED);
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();

    let err = session.abort_backup().unwrap_err();
    assert!(matches!(err, OrchestrationError::UnexpectedProviderError { .. }));
    assert_eq!(session.phase(), Phase::Aborted);
    assert_eq!(provider.live_sessions(), 0);
}

#[test]
fn abort_after_creation_deletes_the_set() {
    let provider = provider();
    let mut session = open(&provider);
    let (_, ids) = create_snapshots(&mut session, SnapshotContext::APP_ROLLBACK, &["C:\\", "D:\\"]);
    assert_eq!(provider.snapshot_count(), 2);

    session.abort_backup().unwrap();
    assert!(ids.iter().all(|id| !provider.has_snapshot(*id)));
}

#[test]
fn completed_persistent_snapshots_survive_the_session() {
    let provider = provider();
    let mut session = open(&provider);
    let (_, ids) = create_snapshots(&mut session, SnapshotContext::APP_ROLLBACK, &["C:\\"]);
    finish(session.backup_complete().unwrap());
    drop(session);

    assert_eq!(provider.live_sessions(), 0);
    assert!(provider.has_snapshot(ids[0]));
}

#[test]
fn auto_release_snapshots_end_with_the_session() {
    let provider = provider();
    let mut session = open(&provider);
    let (_, ids) = create_snapshots(&mut session, SnapshotContext::BACKUP, &["C:\\", "F:\\"]);
    finish(session.backup_complete().unwrap());
    assert!(provider.has_snapshot(ids[0]));

    session.release();
    assert_eq!(provider.snapshot_count(), 0);
}

#[test]
fn views_fail_after_session_drop() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    let metadata = session.writer_metadata();
    let status = session.writer_status();
    assert_eq!(metadata.count().unwrap(), 2);

    drop(session);
    assert_eq!(metadata.count(), Err(OrchestrationError::SessionClosed));
    assert_eq!(metadata.at(0), Err(OrchestrationError::SessionClosed));
    assert_eq!(status.to_vec(), Err(OrchestrationError::SessionClosed));
}

#[test]
fn async_handle_outlives_its_session() {
    let provider = provider();
    provider.hold_async(true);
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    let mut gather = session.gather_writer_metadata().unwrap();
    drop(session);
    assert_eq!(provider.live_sessions(), 0);

    provider.release_held();
    assert_eq!(gather.wait(WAIT), AsyncStatus::Succeeded);
    drop(gather);
    assert_eq!(provider.live_async_operations(), 0);
}
