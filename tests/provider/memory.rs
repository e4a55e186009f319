//! In-memory provider behavior observed through sessions

use crate::common::*;

#[test]
fn volume_limit_per_set() {
    let mut provider = MemoryProvider::new();
    let volumes: Vec<String> = (0..65).map(|n| format!("\\\\?\\Volume{{{n:04}}}\\")).collect();
    for volume in &volumes {
        provider = provider.with_volume(volume.clone());
    }

    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::FILE_SHARE_BACKUP);
    session.start_snapshot_set().unwrap();
    for volume in &volumes[..64] {
        session.add_to_snapshot_set(volume, ProviderId::NULL).unwrap();
    }
    assert_eq!(
        session
            .add_to_snapshot_set(&volumes[64], ProviderId::NULL)
            .unwrap_err(),
        OrchestrationError::MaximumVolumesReached
    );
}

#[test]
fn volume_rejections_carry_the_volume() {
    let provider = provider();
    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    session.start_snapshot_set().unwrap();

    for volume in ["X:\\", "Q:\\"] {
        assert_eq!(
            session.add_to_snapshot_set(volume, ProviderId::NULL).unwrap_err(),
            OrchestrationError::VolumeNotSupported {
                volume: Some(volume.to_string()),
            }
        );
    }
    assert_eq!(
        session
            .add_to_snapshot_set("C:\\", ProviderId::generate())
            .unwrap_err(),
        OrchestrationError::ProviderNotRegistered
    );

    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    assert_eq!(
        session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap_err(),
        OrchestrationError::ObjectAlreadyExists
    );
}

#[test]
fn volume_support_queries() {
    let provider = provider();
    let mut session = open(&provider);
    session.initialize_for_backup(None).unwrap();

    assert!(session.is_volume_supported(ProviderId::NULL, "C:\\").unwrap());
    assert!(session.is_volume_supported(SYSTEM_PROVIDER_ID, "D:\\").unwrap());
    assert!(!session.is_volume_supported(ProviderId::NULL, "X:\\").unwrap());
    assert!(!session.is_volume_supported(ProviderId::NULL, "Q:\\").unwrap());
    assert_eq!(
        session
            .is_volume_supported(ProviderId::generate(), "C:\\")
            .unwrap_err(),
        OrchestrationError::ProviderNotRegistered
    );
}

#[test]
fn cleared_failures_let_the_flow_continue() {
    let provider = provider();
    provider.fail_call(FailPoint::StartSnapshotSet, codes::SNAPSHOT_SET_IN_PROGRESS);
    provider.fail_completion(FailPoint::DoSnapshotSet, codes::MAXIMUM_NUMBER_OF_SNAPSHOTS_REACHED);

    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    assert_eq!(
        session.start_snapshot_set().unwrap_err(),
        OrchestrationError::SnapshotSetInProgress
    );
    assert_eq!(session.phase(), Phase::BackupStateSet);

    provider.clear_failures();
    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());
    finish(session.do_snapshot_set().unwrap());
    assert_eq!(provider.snapshot_count(), 1);
}

#[test]
fn completion_failure_records_the_mapped_error() {
    let provider = provider();
    provider.fail_completion(FailPoint::DoSnapshotSet, codes::MAXIMUM_NUMBER_OF_SNAPSHOTS_REACHED);

    let mut session = open(&provider);
    ready_for_set(&mut session, SnapshotContext::BACKUP);
    session.start_snapshot_set().unwrap();
    session.add_to_snapshot_set("C:\\", ProviderId::NULL).unwrap();
    finish(session.prepare_for_backup().unwrap());

    let mut create = session.do_snapshot_set().unwrap();
    assert_eq!(create.wait(WAIT), AsyncStatus::Failed);
    assert_eq!(create.error(), Some(&OrchestrationError::MaximumSnapshotsReached));
    assert_eq!(session.phase(), Phase::CreatingSnapshots);
    assert_eq!(provider.snapshot_count(), 0);
}

#[test]
fn snapshot_properties_reflect_the_set() {
    let provider = MemoryProvider::new()
        .with_volume("C:\\")
        .with_volume("D:\\")
        .with_machine_name("fileserver");
    let mut session = open(&provider);
    let (set, ids) = create_snapshots(
        &mut session,
        SnapshotContext::FILE_SHARE_BACKUP,
        &["C:\\", "D:\\"],
    );

    let props = session.get_snapshot_properties(ids[1]).unwrap();
    assert_eq!(props.snapshot_id, ids[1]);
    assert_eq!(props.snapshot_set_id, set);
    assert_eq!(props.snapshots_count, 2);
    assert_eq!(props.original_volume_name, "D:\\");
    assert_eq!(props.originating_machine, "fileserver");
    assert_eq!(props.provider_id, SYSTEM_PROVIDER_ID);
    assert_eq!(props.state, SnapshotState::Created);
    assert!(!props.is_exposed());
    assert_ne!(
        props.snapshot_device_object,
        session.get_snapshot_properties(ids[0]).unwrap().snapshot_device_object
    );

    assert_eq!(
        session
            .get_snapshot_properties(SnapshotId::generate())
            .unwrap_err(),
        OrchestrationError::ObjectNotFound
    );
}

#[test]
fn sessions_own_only_their_snapshots() {
    let provider = provider();
    let (_, seeded) = provider.seed_snapshot_set(&["D:\\"], SnapshotContext::BACKUP);

    let mut session = open(&provider);
    create_snapshots(&mut session, SnapshotContext::BACKUP, &["C:\\"]);
    assert_eq!(provider.snapshot_count(), 2);

    session.release();
    // seeded snapshots are never auto-released
    assert_eq!(provider.snapshot_count(), 1);
    assert!(provider.has_snapshot(seeded[0]));
    assert_eq!(provider.live_sessions(), 0);
}
