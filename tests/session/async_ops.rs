//! Async operation handles driven through real sessions

use crate::common::*;
use std::thread;
use std::time::Duration;

#[test]
fn cancel_after_success_is_a_noop() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    let mut gather = session.gather_writer_metadata().unwrap();
    assert_eq!(gather.wait(WAIT), AsyncStatus::Succeeded);

    gather.cancel().unwrap();
    gather.cancel().unwrap();
    assert_eq!(gather.status(), AsyncStatus::Succeeded);
    assert_eq!(gather.poll(), AsyncStatus::Succeeded);
    assert_eq!(session.phase(), Phase::MetadataGathering);
}

#[test]
fn held_operation_times_out_then_completes() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());

    provider.hold_async(true);
    let mut create = session.do_snapshot_set().unwrap();
    assert_eq!(create.wait(SHORT), AsyncStatus::Pending);
    assert_eq!(create.poll(), AsyncStatus::Pending);
    assert!(!create.is_terminal());
    assert_eq!(session.phase(), Phase::CreatingSnapshots);
    assert_eq!(provider.snapshot_count(), 0);

    provider.release_held();
    assert_eq!(create.wait(WAIT), AsyncStatus::Succeeded);
    assert_eq!(session.phase(), Phase::SnapshotsCreated);
    assert_eq!(provider.snapshot_count(), 1);
}

#[test]
fn release_wakes_a_blocked_waiter() {
    let provider = provider();
    provider.hold_async(true);
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    let mut gather = session.gather_writer_metadata().unwrap();

    let releaser = provider.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        releaser.release_held();
    });
    assert_eq!(gather.wait(None), AsyncStatus::Succeeded);
    handle.join().unwrap();
}

#[test]
fn cancelled_step_is_recorded_as_failed() {
    let provider = provider();
    provider.hold_async(true);
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    let mut gather = session.gather_writer_metadata().unwrap();

    gather.cancel().unwrap();
    assert_eq!(gather.status(), AsyncStatus::Pending);
    assert_eq!(gather.wait(WAIT), AsyncStatus::Cancelled);
    assert_eq!(
        gather.wait_ok(),
        Err(OrchestrationError::Cancelled {
            operation: "gather writer metadata"
        })
    );

    // a cancelled gather is not retried
    provider.hold_async(false);
    assert!(session.gather_writer_metadata().unwrap_err().is_invalid_sequence());
    assert_eq!(session.phase(), Phase::MetadataGathering);
}

#[test]
fn dropped_gather_still_advances_the_session() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    drop(session.gather_writer_metadata().unwrap());

    assert_eq!(session.writer_metadata().count().unwrap(), 2);
    session.set_backup_state(BackupState::default()).unwrap();
    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());
    assert_eq!(provider.live_async_operations(), 0);
}

#[test]
fn dropped_snapshot_creation_still_creates_the_set() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    session.add_to_snapshot_set("D:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());

    drop(session.do_snapshot_set().unwrap());
    assert_eq!(session.phase(), Phase::SnapshotsCreated);
    assert_eq!(session.query_snapshots().unwrap().len(), 2);
    finish(session.backup_complete().unwrap());
    assert_eq!(session.phase(), Phase::Done);
}

#[test]
fn held_operation_dropped_unwaited_runs_on_release() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());

    provider.hold_async(true);
    drop(session.do_snapshot_set().unwrap());
    assert_eq!(provider.snapshot_count(), 0);
    // the handle is gone, so the session cannot learn the outcome
    assert_eq!(session.phase(), Phase::CreatingSnapshots);

    provider.release_held();
    assert_eq!(provider.snapshot_count(), 1);
    assert_eq!(provider.live_async_operations(), 0);
}

#[test]
fn wait_ok_uses_the_configured_timeout() {
    let provider = provider();
    let config = ShadowConfig {
        wait_timeout_ms: Some(10),
        ..ShadowConfig::default()
    };
    let engine = ShadowEngine::new(std::sync::Arc::new(provider.clone()), config).unwrap();
    let mut session = engine.begin_backup(None).unwrap();

    provider.hold_async(true);
    let mut gather = session.gather_writer_metadata().unwrap();
    let err = gather.wait_ok().unwrap_err();
    assert!(err.is_invalid_sequence(), "{}", err);
    assert_eq!(gather.status(), AsyncStatus::Pending);

    provider.release_held();
    gather.wait_ok().unwrap();
    assert_eq!(gather.wait_default(), AsyncStatus::Succeeded);
}

#[test]
fn completion_failure_is_mapped() {
    let provider = provider();
    provider.fail_completion(FailPoint::PrepareForBackup, codes::WRITER_RETRYABLE);
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);

    let mut prepare = session.prepare_for_backup().unwrap();
    assert_eq!(prepare.kind(), OperationKind::PrepareForBackup);
    assert_eq!(prepare.wait(WAIT), AsyncStatus::Failed);
    assert_eq!(
        prepare.error(),
        Some(&OrchestrationError::WriterError {
            code: StatusCode(codes::WRITER_RETRYABLE)
        })
    );
    // prepare is not retried
    assert!(session.prepare_for_backup().unwrap_err().is_invalid_sequence());
}

#[test]
fn unknown_completion_code_is_native_failure() {
    let provider = provider();
    provider.fail_completion(FailPoint::BackupComplete, 0x8765_4321_u32 as i32);
    let mut session = open(&provider);
    create_snapshots(&mut session, SnapshotContext::BACKUP, &["C:\\"]);

    let mut complete = session.backup_complete().unwrap();
    assert_eq!(
        complete.wait_ok(),
        Err(OrchestrationError::NativeFailure {
            code: StatusCode(0x8765_4321_u32 as i32)
        })
    );
    assert_eq!(session.phase(), Phase::Completing);
}

#[test]
fn poll_drives_the_session() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    let mut gather = session.gather_writer_metadata().unwrap();
    assert_eq!(gather.poll(), AsyncStatus::Succeeded);
    session.set_backup_state(BackupState::default()).unwrap();
    finish(session.prepare_for_backup().unwrap());
}

#[test]
fn every_native_handle_is_released() {
    let provider = provider();
    {
        let mut session = open(&provider);
        session.initialize_for_backup(None).unwrap();
        let _unwaited = session.gather_writer_metadata().unwrap();
        assert_eq!(provider.live_async_operations(), 1);
    }
    assert_eq!(provider.live_async_operations(), 0);

    let mut session = open(&provider);
    create_snapshots(&mut session, SnapshotContext::BACKUP, &["C:\\", "D:\\"]);
    finish(session.backup_complete().unwrap());
    assert_eq!(provider.live_async_operations(), 0);
    assert_eq!(provider.async_created(), provider.async_released());
    assert_eq!(provider.async_created(), 5);
}

#[test]
fn call_failure_leaves_no_handle() {
    let provider = provider();
    provider.fail_call(FailPoint::GatherWriterMetadata, codes::PROVIDER_IN_USE);
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();

    assert_eq!(
        session.gather_writer_metadata().unwrap_err(),
        OrchestrationError::ProviderInUse
    );
    assert_eq!(session.phase(), Phase::Initialized);
    assert_eq!(provider.async_created(), 0);
}
