//! Snapshot deletion and partial failure reporting

use crate::common::*;

fn initialized(provider: &MemoryProvider) -> SnapshotSetSession {
    let mut session = open(provider);
    session.initialize_for_backup(None).unwrap();
    session
}

#[test]
fn partial_failure_reports_count_and_first_failed() {
    let provider = provider();
    let (set, ids) = provider.seed_snapshot_set(
        &["C:\\", "D:\\", "F:\\", "G:\\", "H:\\"],
        SnapshotContext::APP_ROLLBACK,
    );
    provider.protect_snapshot(ids[1]);
    provider.protect_snapshot(ids[3]);
    let first_failed = [ids[1], ids[3]]
        .into_iter()
        .min_by_key(|id| id.to_native())
        .unwrap();

    let mut session = initialized(&provider);
    let err = session.delete_snapshot_set(set, false).unwrap_err();
    match err {
        OrchestrationError::PartialDeleteFailure {
            deleted_count,
            first_failed_id,
            cause,
        } => {
            assert_eq!(deleted_count, 3);
            assert_eq!(first_failed_id, first_failed);
            assert_eq!(*cause, OrchestrationError::VolumeInUse);
        }
        other => panic!("expected partial delete failure, got {:?}", other),
    }
    assert_eq!(provider.snapshot_count(), 2);
    assert!(provider.has_snapshot(ids[1]));
    assert!(provider.has_snapshot(ids[3]));
}

#[test]
fn force_deletes_protected_snapshots() {
    let provider = provider();
    let (set, ids) = provider.seed_snapshot_set(&["C:\\", "D:\\"], SnapshotContext::NAS_ROLLBACK);
    provider.protect_snapshot(ids[0]);

    let mut session = initialized(&provider);
    assert_eq!(session.delete_snapshot_set(set, true).unwrap(), 2);
    assert_eq!(provider.snapshot_count(), 0);
}

#[test]
fn delete_single_snapshot() {
    let provider = provider();
    let (_, ids) = provider.seed_snapshot_set(&["C:\\", "D:\\"], SnapshotContext::APP_ROLLBACK);

    let mut session = initialized(&provider);
    assert_eq!(session.delete_snapshot(ids[0], false).unwrap(), 1);
    assert!(!provider.has_snapshot(ids[0]));
    assert!(provider.has_snapshot(ids[1]));
}

#[test]
fn missing_snapshot_is_a_delete_failure() {
    let provider = provider();
    let mut session = initialized(&provider);
    let missing = SnapshotId::generate();

    let err = session.delete_snapshot(missing, false).unwrap_err();
    assert_eq!(
        err,
        OrchestrationError::PartialDeleteFailure {
            deleted_count: 0,
            first_failed_id: missing,
            cause: Box::new(OrchestrationError::ObjectNotFound),
        }
    );
    assert_eq!(err.error_code(), "PartialDeleteFailure");

    let err = session
        .delete_snapshot_set(SnapshotSetId::generate(), false)
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::PartialDeleteFailure { deleted_count: 0, .. }
    ));
}

#[test]
fn only_snapshots_and_sets_can_be_deleted() {
    let provider = provider();
    let (set, _) = provider.seed_snapshot_set(&["C:\\"], SnapshotContext::APP_ROLLBACK);
    let mut session = initialized(&provider);

    for object_type in [ObjectType::Provider, ObjectType::None, ObjectType::Unknown] {
        let err = session
            .delete_snapshots(set.as_uuid(), object_type, false)
            .unwrap_err();
        assert!(err.is_invalid_argument(), "{:?}", object_type);
    }
    assert_eq!(provider.snapshot_count(), 1);
}

#[test]
fn delete_requires_initialization() {
    let provider = provider();
    let (set, _) = provider.seed_snapshot_set(&["C:\\"], SnapshotContext::APP_ROLLBACK);
    let mut session = open(&provider);
    assert!(session
        .delete_snapshot_set(set, false)
        .unwrap_err()
        .is_invalid_sequence());
    assert_eq!(provider.snapshot_count(), 1);
}

#[test]
fn delete_own_snapshots_after_creation() {
    let provider = provider();
    let mut session = open(&provider);
    let (set, _) = create_snapshots(&mut session, SnapshotContext::APP_ROLLBACK, &["C:\\", "D:\\", "F:\\"]);
    finish(session.backup_complete().unwrap());

    assert_eq!(session.delete_snapshot_set(set, false).unwrap(), 3);
    assert!(session.query_snapshots().unwrap().is_empty());
}

#[test]
fn provider_refusal_is_wrapped() {
    let provider = provider();
    let (_, ids) = provider.seed_snapshot_set(&["C:\\"], SnapshotContext::APP_ROLLBACK);
    provider.fail_call(FailPoint::DeleteSnapshots, codes::ACCESS_DENIED);
    let mut session = initialized(&provider);

    match session.delete_snapshot(ids[0], true).unwrap_err() {
        OrchestrationError::PartialDeleteFailure { deleted_count, cause, .. } => {
            assert_eq!(deleted_count, 0);
            assert_eq!(*cause, OrchestrationError::AccessDenied);
        }
        other => panic!("unexpected {:?}", other),
    }
}
