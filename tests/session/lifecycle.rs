//! Backup lifecycle ordering
//!
//! Out-of-order calls are rejected with `InvalidSequence` and never move the
//! phase.

use crate::common::*;

#[test]
fn full_backup_reaches_done() {
    let provider = provider();
    let mut session = open(&provider);
    assert_eq!(session.phase(), Phase::Created);

    session.initialize_for_backup(None).unwrap();
    assert_eq!(session.phase(), Phase::Initialized);

    let mut gather = session.gather_writer_metadata().unwrap();
    assert_eq!(session.phase(), Phase::MetadataGathering);
    assert_eq!(gather.wait(WAIT), AsyncStatus::Succeeded);

    session.set_backup_state(BackupState::default()).unwrap();
    assert_eq!(session.phase(), Phase::BackupStateSet);

    let set = session.start_snapshot_set().unwrap();
    assert_eq!(session.phase(), Phase::SnapshotSetStarted);
    assert_eq!(session.snapshot_set_id(), Some(set));

    let c = session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    let d = session.add_to_snapshot_set("D:\\", SYSTEM_PROVIDER_ID).unwrap();
    assert_eq!(session.snapshot_ids(), vec![c, d]);

    let mut prepare = session.prepare_for_backup().unwrap();
    assert_eq!(session.phase(), Phase::Preparing);
    prepare.wait_ok().unwrap();

    let mut create = session.do_snapshot_set().unwrap();
    assert_eq!(session.phase(), Phase::CreatingSnapshots);
    create.wait_ok().unwrap();
    assert_eq!(session.phase(), Phase::SnapshotsCreated);

    let props = session.get_snapshot_properties(c).unwrap();
    assert_eq!(props.snapshot_set_id, set);
    assert_eq!(props.original_volume_name, "C:\\");
    assert_eq!(props.snapshots_count, 2);
    assert_eq!(props.provider_id, SYSTEM_PROVIDER_ID);

    let mut complete = session.backup_complete().unwrap();
    assert_eq!(session.phase(), Phase::Completing);
    complete.wait_ok().unwrap();
    assert_eq!(session.phase(), Phase::Done);

    let err = session.start_snapshot_set().unwrap_err();
    assert!(err.is_invalid_sequence(), "{}", err);
    assert_eq!(session.phase(), Phase::Done);
}

#[test]
fn do_snapshot_set_before_start_is_rejected() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    let before = session.phase();

    let err = session.do_snapshot_set().unwrap_err();
    assert!(err.is_invalid_sequence());
    assert_eq!(session.phase(), before);
    assert_eq!(provider.async_created(), 1);
}

#[test]
fn operations_before_initialization_are_rejected() {
    let provider = provider();
    let mut session = open(&provider);

    assert!(session.gather_writer_metadata().unwrap_err().is_invalid_sequence());
    assert!(session.start_snapshot_set().unwrap_err().is_invalid_sequence());
    assert!(session
        .set_backup_state(BackupState::default())
        .unwrap_err()
        .is_invalid_sequence());
    assert!(session.save_as_xml().unwrap_err().is_invalid_sequence());
    assert!(session.query_snapshots().unwrap_err().is_invalid_sequence());
    assert_eq!(session.phase(), Phase::Created);
}

#[test]
fn second_initialization_is_rejected() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    assert!(session
        .initialize_for_backup(None)
        .unwrap_err()
        .is_invalid_sequence());
    assert!(session
        .initialize_for_restore("<BackupDocument/>")
        .unwrap_err()
        .is_invalid_sequence());
    assert_eq!(session.phase(), Phase::Initialized);
}

#[test]
fn prepare_requires_backup_state_and_metadata() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();

    // no backup state yet
    assert!(session.prepare_for_backup().unwrap_err().is_invalid_sequence());

    session.set_backup_state(BackupState::default()).unwrap();
    // metadata not gathered
    assert!(session.prepare_for_backup().unwrap_err().is_invalid_sequence());
    assert_eq!(session.phase(), Phase::BackupStateSet);

    finish(session.gather_writer_metadata().unwrap());
    finish(session.prepare_for_backup().unwrap());
}

#[test]
fn writerless_context_skips_metadata() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    session.set_context(SnapshotContext::FILE_SHARE_BACKUP).unwrap();
    session.set_backup_state(BackupState::default()).unwrap();
    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());
    finish(session.do_snapshot_set().unwrap());
    assert_eq!(session.phase(), Phase::SnapshotsCreated);
}

#[test]
fn prepare_may_follow_or_precede_start() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    finish(session.prepare_for_backup().unwrap());
    assert_eq!(session.phase(), Phase::Preparing);

    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.do_snapshot_set().unwrap());
    assert_eq!(session.phase(), Phase::SnapshotsCreated);
}

#[test]
fn set_context_rules() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();

    let err = session.set_context(SnapshotContext::ALL).unwrap_err();
    assert!(err.is_invalid_argument());

    session.set_context(SnapshotContext::APP_ROLLBACK).unwrap();
    assert_eq!(session.context(), SnapshotContext::APP_ROLLBACK);

    session.start_snapshot_set().unwrap();
    let err = session.set_context(SnapshotContext::BACKUP).unwrap_err();
    assert!(err.is_invalid_sequence());
    assert_eq!(session.context(), SnapshotContext::APP_ROLLBACK);
}

#[test]
fn add_to_snapshot_set_validation() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);

    // no set yet
    assert!(session
        .add_to_snapshot_set("C:\\", ProviderId::NULL)
        .unwrap_err()
        .is_invalid_sequence());

    session.start_snapshot_set().unwrap();
    let err = session.add_to_snapshot_set("", ProviderId::NULL).unwrap_err();
    assert!(err.is_invalid_argument());

    let err = session.add_to_snapshot_set("X:\\", ProviderId::NULL).unwrap_err();
    assert_eq!(
        err,
        OrchestrationError::VolumeNotSupported {
            volume: Some("X:\\".to_string())
        }
    );

    let err = session
        .add_to_snapshot_set("C:\\", ProviderId::generate())
        .unwrap_err();
    assert_eq!(err, OrchestrationError::ProviderNotRegistered);

    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    let err = session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap_err();
    assert_eq!(err, OrchestrationError::ObjectAlreadyExists);
    assert_eq!(session.snapshot_ids().len(), 1);
}

#[test]
fn empty_set_cannot_be_created() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    session.start_snapshot_set().unwrap();
    finish(session.prepare_for_backup().unwrap());
    assert!(session.do_snapshot_set().unwrap_err().is_invalid_sequence());
}

#[test]
fn failed_creation_is_terminal_for_the_lifecycle() {
    let provider = provider();
    provider.fail_completion(FailPoint::DoSnapshotSet, codes::INSUFFICIENT_STORAGE);
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());

    let mut create = session.do_snapshot_set().unwrap();
    assert_eq!(create.wait(WAIT), AsyncStatus::Failed);
    assert_eq!(create.error(), Some(&OrchestrationError::InsufficientStorage));
    assert_eq!(create.wait_ok(), Err(OrchestrationError::InsufficientStorage));
    assert_eq!(session.phase(), Phase::CreatingSnapshots);
    assert_eq!(provider.snapshot_count(), 0);

    provider.clear_failures();
    assert!(session.do_snapshot_set().unwrap_err().is_invalid_sequence());
    assert!(session.backup_complete().unwrap_err().is_invalid_sequence());
    assert!(session.save_as_xml().unwrap_err().is_invalid_sequence());
    assert_eq!(session.phase(), Phase::CreatingSnapshots);

    // abort is still available
    session.abort_backup().unwrap();
    assert_eq!(session.phase(), Phase::Aborted);
}

#[test]
fn metadata_gather_is_not_retried_after_failure() {
    let provider = provider();
    provider.fail_completion(FailPoint::GatherWriterMetadata, codes::WRITER_TIMEOUT);
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();

    let mut gather = session.gather_writer_metadata().unwrap();
    assert_eq!(gather.wait(WAIT), AsyncStatus::Failed);
    assert!(matches!(
        gather.error(),
        Some(OrchestrationError::WriterError { .. })
    ));

    provider.clear_failures();
    let err = session.gather_writer_metadata().unwrap_err();
    assert!(err.is_invalid_sequence(), "{}", err);
    assert_eq!(session.phase(), Phase::MetadataGathering);
    assert_eq!(provider.async_created(), 1);

    // without metadata the backup cannot prepare
    session.set_backup_state(BackupState::default()).unwrap();
    assert!(session.prepare_for_backup().unwrap_err().is_invalid_sequence());
}

#[test]
fn native_call_failure_leaves_step_unstarted() {
    let provider = provider();
    provider.fail_call(FailPoint::PrepareForBackup, codes::PROVIDER_VETO);
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);

    let err = session.prepare_for_backup().unwrap_err();
    assert_eq!(err, OrchestrationError::ProviderVeto);
    assert_eq!(session.phase(), Phase::BackupStateSet);

    provider.clear_failures();
    finish(session.prepare_for_backup().unwrap());
    assert_eq!(session.phase(), Phase::Preparing);
}

#[test]
fn backup_document_requires_created_snapshots() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    assert!(session.save_as_xml().unwrap_err().is_invalid_sequence());

    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());
    finish(session.do_snapshot_set().unwrap());

    let document = session.save_as_xml().unwrap();
    assert!(document.starts_with("<BackupDocument"));
    assert!(document.contains("C:\\"));
}

#[test]
fn writer_status_after_metadata() {
    let provider = MemoryProvider::new()
        .with_volume("C:\\")
        .with_writer(registry_writer().with_status(WriterState::FailedAtFreeze, WriterFailure::Retryable));
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();
    assert!(session.gather_writer_status().unwrap_err().is_invalid_sequence());

    finish(session.gather_writer_metadata().unwrap());
    finish(session.gather_writer_status().unwrap());

    let status = session.writer_status().to_vec().unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].state, WriterState::FailedAtFreeze);
    assert!(status[0].state.is_failed());
    assert_eq!(status[0].failure, WriterFailure::Retryable);

    session.free_writer_status().unwrap();
    assert!(session.free_writer_status().unwrap_err().is_invalid_sequence());
    session.free_writer_metadata().unwrap();
}
