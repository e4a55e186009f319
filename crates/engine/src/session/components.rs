//! Component selection, backup annotations and writer filters

use super::milestones::{Mode, Step};
use super::SnapshotSetSession;
use crate::provider::NativeComponentRef;
use shadowset_core::{
    check_result, ComponentRef, NativeId, OrchestrationError, Result, WriterId, WriterInstanceId,
};
use tracing::debug;

impl SnapshotSetSession {
    /// Select a component of a writer instance
    ///
    /// In backup mode this must happen before prepare for backup; in restore
    /// mode at any time.
    ///
    /// # Errors
    ///
    /// - `InvalidSequence` unless writer metadata was gathered successfully
    /// - `ObjectNotFound` if the writer or component is unknown to the provider
    pub fn add_component(&mut self, instance: WriterInstanceId, component: &ComponentRef) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        let mode = core.milestones.require_initialized("add component")?;
        core.milestones.require_succeeded("add component", Step::Metadata)?;
        if mode == Mode::Backup {
            core.milestones.require_not_started("add component", Step::Prepare)?;
        }

        let native = NativeComponentRef::from_ref(component);
        check_result(core.native_mut()?.add_component(instance.to_native(), &native))?;
        debug!(target: "shadowset::session", session = self.id, writer = %component.writer_id, component = %component.name, "Component added");
        Ok(())
    }

    /// Record whether a component was backed up successfully
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless snapshots were created and backup completion
    /// has not started.
    pub fn set_backup_succeeded(
        &mut self,
        instance: WriterInstanceId,
        component: &ComponentRef,
        succeeded: bool,
    ) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("set backup succeeded", Mode::Backup)?;
        core.milestones.require_succeeded("set backup succeeded", Step::Create)?;
        core.milestones.require_not_started("set backup succeeded", Step::Complete)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(
            core.native_mut()?
                .set_backup_succeeded(instance.to_native(), &native, succeeded),
        )
    }

    /// Attach requester-defined backup options to a selected component
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless in backup mode before prepare for backup has
    /// finished.
    pub fn set_backup_options(&mut self, component: &ComponentRef, options: &str) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("set backup options", Mode::Backup)?;
        core.milestones.require_unfinished("set backup options", Step::Prepare)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(core.native_mut()?.set_backup_options(&native, options))
    }

    /// Attach the previous backup stamp to a selected component
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless in backup mode before prepare for backup has
    /// finished.
    pub fn set_previous_backup_stamp(&mut self, component: &ComponentRef, stamp: &str) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("set previous backup stamp", Mode::Backup)?;
        core.milestones
            .require_unfinished("set previous backup stamp", Step::Prepare)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(core.native_mut()?.set_previous_backup_stamp(&native, stamp))
    }

    // =========================================================================
    // Writer filters
    // =========================================================================

    /// Exclude writer classes from the backup
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized and writer metadata has not been
    /// requested.
    pub fn disable_writer_classes(&mut self, writer_ids: &[WriterId]) -> Result<()> {
        let ids: Vec<NativeId> = writer_ids.iter().map(WriterId::to_native).collect();
        self.filter_writers("disable writer classes", |native| {
            native.disable_writer_classes(&ids)
        })
    }

    /// Restrict the backup to the given writer classes
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized and writer metadata has not been
    /// requested.
    pub fn enable_writer_classes(&mut self, writer_ids: &[WriterId]) -> Result<()> {
        let ids: Vec<NativeId> = writer_ids.iter().map(WriterId::to_native).collect();
        self.filter_writers("enable writer classes", |native| {
            native.enable_writer_classes(&ids)
        })
    }

    /// Exclude writer instances from the backup
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized and writer metadata has not been
    /// requested.
    pub fn disable_writer_instances(&mut self, instance_ids: &[WriterInstanceId]) -> Result<()> {
        let ids: Vec<NativeId> = instance_ids
            .iter()
            .map(WriterInstanceId::to_native)
            .collect();
        self.filter_writers("disable writer instances", |native| {
            native.disable_writer_instances(&ids)
        })
    }

    fn filter_writers<F>(&mut self, operation: &'static str, call: F) -> Result<()>
    where
        F: FnOnce(&mut dyn crate::provider::NativeSession) -> shadowset_core::StatusCode,
    {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_initialized(operation)?;
        if core.milestones.metadata.is_started() {
            return Err(OrchestrationError::invalid_sequence(
                operation,
                "writer metadata was already requested",
            ));
        }
        check_result(call(core.native_mut()?))
    }
}
