//! Restore-mode operations

use super::milestones::{Mode, Step};
use super::SnapshotSetSession;
use crate::async_op::{AsyncOperation, OperationKind};
use crate::provider::NativeComponentRef;
use shadowset_core::{
    check_result, ComponentRef, FileRestoreStatus, LocationMapping, OrchestrationError,
    PlatformLevel, Result, RestoreType, WriterInstanceId,
};
use tracing::debug;

impl SnapshotSetSession {
    /// Mark a component from the backup document for restore
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized for restore.
    pub fn set_selected_for_restore(&mut self, component: &ComponentRef, selected: bool) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("set selected for restore", Mode::Restore)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(core.native_mut()?.set_selected_for_restore(&native, selected))
    }

    /// Attach requester-defined restore options to a component
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized for restore.
    pub fn set_restore_options(&mut self, component: &ComponentRef, options: &str) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("set restore options", Mode::Restore)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(core.native_mut()?.set_restore_options(&native, options))
    }

    /// Declare that more restores of the component will follow
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized for restore.
    pub fn set_additional_restores(&mut self, component: &ComponentRef, additional: bool) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("set additional restores", Mode::Restore)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(core.native_mut()?.set_additional_restores(&native, additional))
    }

    /// Select a subcomponent of a component for restore
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty subcomponent name
    /// - `InvalidSequence` unless initialized for restore
    pub fn add_restore_subcomponent(
        &mut self,
        component: &ComponentRef,
        sub_path: &str,
        sub_name: &str,
    ) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        if sub_name.is_empty() {
            return Err(OrchestrationError::invalid_argument(
                "subcomponent name must not be empty",
            ));
        }
        core.milestones.require_mode("add restore subcomponent", Mode::Restore)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(
            core.native_mut()?
                .add_restore_subcomponent(&native, sub_path, sub_name),
        )
    }

    /// Restore a file set of a component to another directory
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty path, filespec or destination
    /// - `InvalidSequence` unless initialized for restore before post-restore
    pub fn add_alternative_location_mapping(
        &mut self,
        component: &ComponentRef,
        mapping: &LocationMapping,
    ) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        check_mapping(mapping)?;
        core.milestones
            .require_mode("add alternative location mapping", Mode::Restore)?;
        core.milestones
            .require_not_started("add alternative location mapping", Step::PostRestore)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(
            core.native_mut()?
                .add_alternative_location_mapping(&native, mapping),
        )
    }

    /// Redirect a file set of a component to a new target during restore
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` below `Server2003`
    /// - `InvalidArgument` for an empty path, filespec or destination
    /// - `InvalidSequence` unless initialized for restore before post-restore
    pub fn add_new_target(
        &mut self,
        component: &ComponentRef,
        target: &LocationMapping,
    ) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        self.gate.require("add new target", PlatformLevel::Server2003)?;
        check_mapping(target)?;
        core.milestones.require_mode("add new target", Mode::Restore)?;
        core.milestones
            .require_not_started("add new target", Step::PostRestore)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(core.native_mut()?.add_new_target(&native, target))
    }

    /// Name the ranges file used to restore a partially backed-up file
    ///
    /// Setting the same index again replaces the earlier path.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` below `Server2003`
    /// - `InvalidArgument` for an empty ranges file path
    /// - `InvalidSequence` unless initialized for restore before post-restore
    pub fn set_ranges_file_path(
        &mut self,
        component: &ComponentRef,
        partial_file_index: u32,
        ranges_file: &str,
    ) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        self.gate.require("set ranges file path", PlatformLevel::Server2003)?;
        if ranges_file.is_empty() {
            return Err(OrchestrationError::invalid_argument(
                "ranges file path must not be empty",
            ));
        }
        core.milestones.require_mode("set ranges file path", Mode::Restore)?;
        core.milestones
            .require_not_started("set ranges file path", Step::PostRestore)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(
            core.native_mut()?
                .set_ranges_file_path(&native, partial_file_index, ranges_file),
        )
    }

    /// Declare the restore type
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` below `Server2003`
    /// - `InvalidSequence` unless initialized for restore before pre-restore
    pub fn set_restore_state(&mut self, restore_type: RestoreType) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        self.gate.require("set restore state", PlatformLevel::Server2003)?;
        core.milestones.require_mode("set restore state", Mode::Restore)?;
        core.milestones.require_not_started("set restore state", Step::PreRestore)?;

        check_result(core.native_mut()?.set_restore_state(restore_type))?;
        debug!(target: "shadowset::session", session = self.id, ?restore_type, "Restore state set");
        Ok(())
    }

    /// Notify writers that files are about to be restored
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized for restore, writer metadata was
    /// gathered and pre-restore has not started.
    pub fn pre_restore(&mut self) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("pre-restore", Mode::Restore)?;
        core.milestones.require_succeeded("pre-restore", Step::Metadata)?;
        core.milestones.require_not_started("pre-restore", Step::PreRestore)?;

        self.launch(
            &mut core,
            OperationKind::PreRestore,
            Some(Step::PreRestore),
            |native| native.pre_restore(),
        )
    }

    /// Notify writers that files have been restored
    ///
    /// Success moves the session to `Done`.
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless pre-restore succeeded and post-restore has
    /// not started.
    pub fn post_restore(&mut self) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("post-restore", Mode::Restore)?;
        core.milestones.require_succeeded("post-restore", Step::PreRestore)?;
        core.milestones.require_not_started("post-restore", Step::PostRestore)?;

        self.launch(
            &mut core,
            OperationKind::PostRestore,
            Some(Step::PostRestore),
            |native| native.post_restore(),
        )
    }

    /// Record the outcome of restoring a component's files
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized for restore and pre-restore
    /// succeeded.
    pub fn set_file_restore_status(
        &mut self,
        instance: WriterInstanceId,
        component: &ComponentRef,
        status: FileRestoreStatus,
    ) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("set file restore status", Mode::Restore)?;
        core.milestones
            .require_succeeded("set file restore status", Step::PreRestore)?;

        let native = NativeComponentRef::from_ref(component);
        check_result(
            core.native_mut()?
                .set_file_restore_status(instance.to_native(), &native, status),
        )
    }
}

fn check_mapping(mapping: &LocationMapping) -> Result<()> {
    if mapping.path.is_empty() || mapping.filespec.is_empty() || mapping.destination.is_empty() {
        return Err(OrchestrationError::invalid_argument(
            "path, filespec and destination must not be empty",
        ));
    }
    Ok(())
}
