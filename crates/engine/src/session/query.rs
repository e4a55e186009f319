//! Snapshot management and queries
//!
//! Deletion, exposure, revert, break and import, plus the read-only
//! property queries. Platform-gated operations consult the capability gate
//! before any precondition or native call.

use super::milestones::{Mode, Step};
use super::SnapshotSetSession;
use crate::async_op::{AsyncOperation, OperationKind};
use shadowset_core::{
    check_result, check_value, map_failure, ObjectType, OrchestrationError, PlatformLevel,
    ProviderId, ProviderProperties, Result, SnapshotId, SnapshotProperties, SnapshotSetId,
    VolumeSnapshotAttributes,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

impl SnapshotSetSession {
    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete a snapshot or every snapshot of a set
    ///
    /// Returns the number of snapshots deleted.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` unless `object_type` is `Snapshot` or `SnapshotSet`
    /// - `InvalidSequence` if not initialized
    /// - `PartialDeleteFailure` if the provider reports a failure; carries the
    ///   count deleted before it, the first snapshot that could not be
    ///   deleted, and the mapped cause
    pub fn delete_snapshots(&mut self, id: Uuid, object_type: ObjectType, force: bool) -> Result<u32> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        if !matches!(object_type, ObjectType::Snapshot | ObjectType::SnapshotSet) {
            return Err(OrchestrationError::invalid_argument(format!(
                "cannot delete objects of type {:?}",
                object_type
            )));
        }
        core.milestones.require_initialized("delete snapshots")?;

        let outcome = core.native_mut()?.delete_snapshots(
            shadowset_core::to_native_id(id),
            object_type,
            force,
        );
        if outcome.status.is_failure() {
            let first_failed_id = SnapshotId::from_native(outcome.non_deleted);
            warn!(
                target: "shadowset::session",
                session = self.id,
                deleted = outcome.deleted,
                first_failed = %first_failed_id,
                code = %outcome.status,
                "Snapshot deletion failed"
            );
            return Err(OrchestrationError::PartialDeleteFailure {
                deleted_count: outcome.deleted,
                first_failed_id,
                cause: Box::new(map_failure(outcome.status)),
            });
        }
        debug!(target: "shadowset::session", session = self.id, deleted = outcome.deleted, ?object_type, "Snapshots deleted");
        Ok(outcome.deleted)
    }

    /// Delete one snapshot
    ///
    /// # Errors
    ///
    /// See [`SnapshotSetSession::delete_snapshots`].
    pub fn delete_snapshot(&mut self, id: SnapshotId, force: bool) -> Result<u32> {
        self.delete_snapshots(id.as_uuid(), ObjectType::Snapshot, force)
    }

    /// Delete every snapshot of a set
    ///
    /// # Errors
    ///
    /// See [`SnapshotSetSession::delete_snapshots`].
    pub fn delete_snapshot_set(&mut self, id: SnapshotSetId, force: bool) -> Result<u32> {
        self.delete_snapshots(id.as_uuid(), ObjectType::SnapshotSet, force)
    }

    // =========================================================================
    // Exposure, revert, break, import
    // =========================================================================

    /// Expose a snapshot as a drive, mount point or share
    ///
    /// `attributes` must contain exactly one of `EXPOSED_LOCALLY` and
    /// `EXPOSED_REMOTELY`. Returns the name the snapshot was exposed as.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` below `Server2003`
    /// - `InvalidArgument` for an invalid exposure attribute combination
    /// - `InvalidSequence` unless snapshots were created
    /// - `UnsupportedContext` unless the context is persistent
    pub fn expose_snapshot(
        &mut self,
        id: SnapshotId,
        path_from_root: Option<&str>,
        attributes: VolumeSnapshotAttributes,
        expose: Option<&str>,
    ) -> Result<String> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        self.gate.require("expose snapshot", PlatformLevel::Server2003)?;
        let locally = attributes.contains(VolumeSnapshotAttributes::EXPOSED_LOCALLY);
        let remotely = attributes.contains(VolumeSnapshotAttributes::EXPOSED_REMOTELY);
        if locally == remotely {
            return Err(OrchestrationError::invalid_argument(
                "exactly one of EXPOSED_LOCALLY and EXPOSED_REMOTELY is required",
            ));
        }
        core.milestones.require_mode("expose snapshot", Mode::Backup)?;
        core.milestones.require_succeeded("expose snapshot", Step::Create)?;
        if !core.milestones.context.has(VolumeSnapshotAttributes::PERSISTENT) {
            return Err(OrchestrationError::unsupported_context(
                "only persistent snapshots can be exposed",
            ));
        }

        let name = check_value(core.native_mut()?.expose_snapshot(
            id.to_native(),
            path_from_root,
            attributes.bits(),
            expose,
        ))?;
        info!(target: "shadowset::session", session = self.id, snapshot = %id, exposed = %name, "Snapshot exposed");
        Ok(name)
    }

    /// Revert a volume to a persistent snapshot
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` unless `Server2003Sp1` (server lineage) or
    ///   `Server2008`
    /// - `InvalidSequence` unless initialized for backup
    /// - `ObjectNotFound` if the snapshot does not exist
    /// - `UnsupportedContext` if the snapshot is not persistent
    pub fn revert_to_snapshot(&mut self, id: SnapshotId, force_dismount: bool) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        self.gate.require_any(
            "revert to snapshot",
            PlatformLevel::Server2003Sp1,
            PlatformLevel::Server2008,
        )?;
        core.milestones.require_mode("revert to snapshot", Mode::Backup)?;

        let target = check_value(core.native()?.get_snapshot_properties(id.to_native()))?;
        if !target.is_persistent() {
            return Err(OrchestrationError::unsupported_context(
                "only persistent snapshots can be reverted to",
            ));
        }
        check_result(
            core.native_mut()?
                .revert_to_snapshot(id.to_native(), force_dismount),
        )?;
        warn!(target: "shadowset::session", session = self.id, snapshot = %id, volume = %target.original_volume_name, force_dismount, "Volume reverted");
        Ok(())
    }

    /// Track the revert in progress on a volume
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` as for [`SnapshotSetSession::revert_to_snapshot`]
    /// - `InvalidArgument` for an empty volume name
    /// - `InvalidSequence` if not initialized
    pub fn query_revert_status(&mut self, volume: &str) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        self.gate.require_any(
            "query revert status",
            PlatformLevel::Server2003Sp1,
            PlatformLevel::Server2008,
        )?;
        if volume.is_empty() {
            return Err(OrchestrationError::invalid_argument(
                "volume name must not be empty",
            ));
        }
        core.milestones.require_initialized("query revert status")?;

        self.launch(&mut core, OperationKind::QueryRevertStatus, None, |native| {
            native.query_revert_status(volume)
        })
    }

    /// Turn the snapshots of a set into ordinary volumes
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` below `Server2003`
    /// - `InvalidSequence` if not initialized
    pub fn break_snapshot_set(&mut self, id: SnapshotSetId) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        self.gate.require("break snapshot set", PlatformLevel::Server2003)?;
        core.milestones.require_initialized("break snapshot set")?;

        check_result(core.native_mut()?.break_snapshot_set(id.to_native()))?;
        info!(target: "shadowset::session", session = self.id, snapshot_set = %id, "Snapshot set broken");
        Ok(())
    }

    /// Import transportable snapshots described by the loaded backup document
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` below `Server2003`
    /// - `InvalidSequence` unless initialized for backup from a document and
    ///   no import has started
    /// - `UnsupportedContext` unless the context is transportable
    pub fn import_snapshots(&mut self) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        self.gate.require("import snapshots", PlatformLevel::Server2003)?;
        core.milestones.require_mode("import snapshots", Mode::Backup)?;
        if !core.milestones.document_loaded {
            return Err(OrchestrationError::invalid_sequence(
                "import snapshots",
                "session was not initialized from a backup document",
            ));
        }
        core.milestones.require_not_started("import snapshots", Step::Import)?;
        if !core.milestones.context.has(VolumeSnapshotAttributes::TRANSPORTABLE) {
            return Err(OrchestrationError::unsupported_context(
                "import requires a transportable context",
            ));
        }

        self.launch(
            &mut core,
            OperationKind::ImportSnapshots,
            Some(Step::Import),
            |native| native.import_snapshots(),
        )
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Check whether a provider can snapshot a volume
    ///
    /// # Errors
    ///
    /// `InvalidSequence` if not initialized.
    pub fn is_volume_supported(&self, provider: ProviderId, volume: &str) -> Result<bool> {
        let core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_initialized("is volume supported")?;
        check_value(core.native()?.is_volume_supported(provider.to_native(), volume))
            .map_err(|e| e.with_volume(volume))
    }

    /// Properties of one snapshot
    ///
    /// # Errors
    ///
    /// - `InvalidSequence` if not initialized
    /// - `ObjectNotFound` if the snapshot does not exist
    pub fn get_snapshot_properties(&self, id: SnapshotId) -> Result<SnapshotProperties> {
        let core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_initialized("get snapshot properties")?;
        check_value(core.native()?.get_snapshot_properties(id.to_native()))
            .map(|props| props.into_properties())
    }

    /// Every snapshot visible to the session
    ///
    /// # Errors
    ///
    /// `InvalidSequence` if not initialized.
    pub fn query_snapshots(&self) -> Result<Vec<SnapshotProperties>> {
        let core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_initialized("query snapshots")?;
        let snapshots = check_value(core.native()?.query_snapshots())?;
        Ok(snapshots
            .into_iter()
            .map(|props| props.into_properties())
            .collect())
    }

    /// Every registered provider
    ///
    /// # Errors
    ///
    /// `InvalidSequence` if not initialized.
    pub fn query_providers(&self) -> Result<Vec<ProviderProperties>> {
        let core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_initialized("query providers")?;
        let providers = check_value(core.native()?.query_providers())?;
        Ok(providers
            .into_iter()
            .map(|props| props.into_properties())
            .collect())
    }
}
