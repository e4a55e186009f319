//! Provider call boundary
//!
//! The engine never talks to a snapshot provider directly. Everything goes
//! through three traits:
//! - [`SnapshotProvider`]: factory for sessions plus session-independent queries
//! - [`NativeSession`]: one per snapshot-set session, owned exclusively
//! - [`NativeAsync`]: one per background operation, owned exclusively
//!
//! Identifiers cross as [`NativeId`], results as [`StatusCode`] or
//! [`NativeResult`]. Conversion into engine types happens on the engine side
//! of the boundary (see the `into_*` helpers below). Releasing a native
//! handle is dropping the box.

use shadowset_core::{
    filetime_to_datetime, BackupState, ComponentRef, ComponentType, FileRestoreStatus,
    LocationMapping, NativeId, NativeResult, ObjectType, ProviderId, ProviderProperties,
    ProviderType, RestoreMethod, RestoreType, SnapshotId, SnapshotProperties, SnapshotSetId,
    SnapshotState, StatusCode, VolumeSnapshotAttributes, WriterComponent, WriterComponentsEntry,
    WriterFailure, WriterId, WriterInstanceId, WriterMetadataEntry, WriterState,
    WriterStatusEntry, WriterUsageType,
};
use std::time::Duration;

// =============================================================================
// Traits
// =============================================================================

/// Entry point of a snapshot provider
pub trait SnapshotProvider: Send + Sync {
    /// Allocate a new native session
    fn create_session(&self) -> NativeResult<Box<dyn NativeSession>>;

    /// Report whether the volume holds snapshots, and its compatibility flags
    fn is_volume_snapshotted(&self, volume: &str) -> NativeResult<NativeVolumeStatus>;

    /// Report whether reverting the volume should be blocked
    fn should_block_revert(&self, volume: &str) -> NativeResult<bool>;
}

/// One native snapshot-set session
///
/// Calls arrive in an order the engine has already validated; providers may
/// still reject with `BAD_STATE`.
pub trait NativeSession: Send {
    // Lifecycle

    /// Initialize for backup, optionally from a saved backup document
    fn initialize_for_backup(&mut self, document: Option<&str>) -> StatusCode;
    /// Initialize for restore from a saved backup document
    fn initialize_for_restore(&mut self, document: &str) -> StatusCode;
    /// Set the snapshot context (attribute bits)
    fn set_context(&mut self, context: u32) -> StatusCode;
    /// Declare the backup state
    fn set_backup_state(&mut self, state: &BackupState) -> StatusCode;
    /// Abort the backup
    fn abort_backup(&mut self) -> StatusCode;

    // Writers

    /// Ask writers for their metadata
    fn gather_writer_metadata(&mut self) -> NativeResult<Box<dyn NativeAsync>>;
    /// Ask writers for their status
    fn gather_writer_status(&mut self) -> NativeResult<Box<dyn NativeAsync>>;
    /// Drop cached writer metadata
    fn free_writer_metadata(&mut self) -> StatusCode;
    /// Drop cached writer status
    fn free_writer_status(&mut self) -> StatusCode;
    /// Number of writer metadata entries
    fn writer_metadata_count(&self) -> NativeResult<usize>;
    /// Writer metadata entry at `index`
    fn writer_metadata(&self, index: usize) -> NativeResult<NativeWriterMetadata>;
    /// Number of writer component entries
    fn writer_components_count(&self) -> NativeResult<usize>;
    /// Writer component entry at `index`
    fn writer_components(&self, index: usize) -> NativeResult<NativeWriterComponents>;
    /// Number of writer status entries
    fn writer_status_count(&self) -> NativeResult<usize>;
    /// Writer status entry at `index`
    fn writer_status(&self, index: usize) -> NativeResult<NativeWriterStatus>;
    /// Exclude writer classes
    fn disable_writer_classes(&mut self, writer_ids: &[NativeId]) -> StatusCode;
    /// Include only these writer classes
    fn enable_writer_classes(&mut self, writer_ids: &[NativeId]) -> StatusCode;
    /// Exclude writer instances
    fn disable_writer_instances(&mut self, instance_ids: &[NativeId]) -> StatusCode;

    // Snapshot set

    /// Allocate a snapshot set identity
    fn start_snapshot_set(&mut self) -> NativeResult<NativeId>;
    /// Add a volume to the set; returns the snapshot identity
    fn add_to_snapshot_set(&mut self, volume: &str, provider: NativeId) -> NativeResult<NativeId>;
    /// Check whether a provider can snapshot a volume
    fn is_volume_supported(&self, provider: NativeId, volume: &str) -> NativeResult<bool>;
    /// Notify writers to prepare for backup
    fn prepare_for_backup(&mut self) -> NativeResult<Box<dyn NativeAsync>>;
    /// Create every snapshot of the set
    fn do_snapshot_set(&mut self) -> NativeResult<Box<dyn NativeAsync>>;
    /// Notify writers that the backup is complete
    fn backup_complete(&mut self) -> NativeResult<Box<dyn NativeAsync>>;
    /// Serialize the backup document
    fn save_as_xml(&self) -> NativeResult<String>;

    // Components

    /// Select a component
    fn add_component(&mut self, instance: NativeId, component: &NativeComponentRef) -> StatusCode;
    /// Record the backup outcome of a component
    fn set_backup_succeeded(
        &mut self,
        instance: NativeId,
        component: &NativeComponentRef,
        succeeded: bool,
    ) -> StatusCode;
    /// Attach backup options to a component
    fn set_backup_options(&mut self, component: &NativeComponentRef, options: &str) -> StatusCode;
    /// Attach the previous backup stamp to a component
    fn set_previous_backup_stamp(&mut self, component: &NativeComponentRef, stamp: &str)
        -> StatusCode;

    // Restore

    /// Mark a component for restore
    fn set_selected_for_restore(&mut self, component: &NativeComponentRef, selected: bool)
        -> StatusCode;
    /// Attach restore options to a component
    fn set_restore_options(&mut self, component: &NativeComponentRef, options: &str) -> StatusCode;
    /// Declare that more restores will follow
    fn set_additional_restores(&mut self, component: &NativeComponentRef, additional: bool)
        -> StatusCode;
    /// Record the file restore outcome of a component
    fn set_file_restore_status(
        &mut self,
        instance: NativeId,
        component: &NativeComponentRef,
        status: FileRestoreStatus,
    ) -> StatusCode;
    /// Select a subcomponent for restore
    fn add_restore_subcomponent(
        &mut self,
        component: &NativeComponentRef,
        sub_path: &str,
        sub_name: &str,
    ) -> StatusCode;
    /// Restore files of a component to another location
    fn add_alternative_location_mapping(
        &mut self,
        component: &NativeComponentRef,
        mapping: &LocationMapping,
    ) -> StatusCode;
    /// Redirect files of a component to a new target during restore
    fn add_new_target(&mut self, component: &NativeComponentRef, target: &LocationMapping)
        -> StatusCode;
    /// Name the ranges file of a partially backed-up file
    fn set_ranges_file_path(
        &mut self,
        component: &NativeComponentRef,
        partial_file_index: u32,
        ranges_file: &str,
    ) -> StatusCode;
    /// Declare the restore type
    fn set_restore_state(&mut self, restore_type: RestoreType) -> StatusCode;
    /// Notify writers before restore
    fn pre_restore(&mut self) -> NativeResult<Box<dyn NativeAsync>>;
    /// Notify writers after restore
    fn post_restore(&mut self) -> NativeResult<Box<dyn NativeAsync>>;

    // Snapshot management

    /// Delete a snapshot or every snapshot of a set
    fn delete_snapshots(
        &mut self,
        id: NativeId,
        object_type: ObjectType,
        force: bool,
    ) -> NativeDeleteOutcome;
    /// Properties of one snapshot
    fn get_snapshot_properties(&self, id: NativeId) -> NativeResult<NativeSnapshotProperties>;
    /// Every snapshot visible in the current context
    fn query_snapshots(&self) -> NativeResult<Vec<NativeSnapshotProperties>>;
    /// Every registered provider
    fn query_providers(&self) -> NativeResult<Vec<NativeProviderProperties>>;
    /// Expose a snapshot; returns the exposed name
    fn expose_snapshot(
        &mut self,
        id: NativeId,
        path_from_root: Option<&str>,
        attributes: u32,
        expose: Option<&str>,
    ) -> NativeResult<String>;
    /// Turn a snapshot set into ordinary volumes
    fn break_snapshot_set(&mut self, id: NativeId) -> StatusCode;
    /// Import transportable snapshots from the loaded backup document
    fn import_snapshots(&mut self) -> NativeResult<Box<dyn NativeAsync>>;
    /// Revert a volume to a snapshot
    fn revert_to_snapshot(&mut self, id: NativeId, force_dismount: bool) -> StatusCode;
    /// Track a revert in progress on a volume
    fn query_revert_status(&mut self, volume: &str) -> NativeResult<Box<dyn NativeAsync>>;
}

/// One native background operation
///
/// Status results:
/// - `ASYNC_PENDING`: still running (or the wait timed out)
/// - `ASYNC_FINISHED` (or any other success code): finished successfully
/// - `ASYNC_CANCELLED`: cancelled
/// - failure code: finished with that failure
pub trait NativeAsync: Send {
    /// Block until terminal or until `timeout` elapses (`None` = no limit)
    fn wait(&mut self, timeout: Option<Duration>) -> StatusCode;
    /// Current status without blocking
    fn query_status(&mut self) -> StatusCode;
    /// Request cancellation
    ///
    /// Returns `OK` if the request was accepted, `ASYNC_FINISHED` or
    /// `ASYNC_CANCELLED` if already terminal, or a failure code.
    fn cancel(&mut self) -> StatusCode;
}

// =============================================================================
// Boundary records
// =============================================================================

/// Result of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeDeleteOutcome {
    /// Snapshots deleted before the first failure
    pub deleted: u32,
    /// First snapshot that could not be deleted (`NULL` on success)
    pub non_deleted: NativeId,
    /// Overall status
    pub status: StatusCode,
}

/// Snapshot presence on a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeVolumeStatus {
    /// At least one snapshot exists
    pub snapshots_present: bool,
    /// Compatibility flag bits
    pub compatibility: u32,
}

/// Component address in native form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeComponentRef {
    /// Writer class
    pub writer_id: NativeId,
    /// Component kind
    pub component_type: ComponentType,
    /// Logical path
    pub logical_path: Option<String>,
    /// Component name
    pub name: String,
}

impl NativeComponentRef {
    /// Convert an engine-side component address
    pub fn from_ref(component: &ComponentRef) -> Self {
        Self {
            writer_id: component.writer_id.to_native(),
            component_type: component.component_type,
            logical_path: component.logical_path.clone(),
            name: component.name.clone(),
        }
    }

    /// Check whether a component is the one addressed
    pub fn matches(&self, component: &WriterComponent) -> bool {
        self.component_type == component.component_type
            && self.logical_path == component.logical_path
            && self.name == component.name
    }
}

/// Snapshot properties in native form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSnapshotProperties {
    /// Snapshot identity
    pub snapshot_id: NativeId,
    /// Set identity
    pub snapshot_set_id: NativeId,
    /// Snapshots in the set
    pub snapshots_count: u32,
    /// Device path of the snapshot
    pub snapshot_device_object: String,
    /// Original volume
    pub original_volume_name: String,
    /// Originating machine
    pub originating_machine: String,
    /// Service machine
    pub service_machine: String,
    /// Exposed name
    pub exposed_name: Option<String>,
    /// Exposed path
    pub exposed_path: Option<String>,
    /// Provider identity
    pub provider_id: NativeId,
    /// Attribute bits
    pub attributes: u32,
    /// Creation time in 100ns ticks since 1601-01-01
    pub creation_timestamp: i64,
    /// Raw snapshot state
    pub state: u32,
}

impl NativeSnapshotProperties {
    /// Convert into engine-side properties
    pub fn into_properties(self) -> SnapshotProperties {
        SnapshotProperties {
            snapshot_id: SnapshotId::from_native(self.snapshot_id),
            snapshot_set_id: SnapshotSetId::from_native(self.snapshot_set_id),
            snapshots_count: self.snapshots_count,
            snapshot_device_object: self.snapshot_device_object,
            original_volume_name: self.original_volume_name,
            originating_machine: self.originating_machine,
            service_machine: self.service_machine,
            exposed_name: self.exposed_name,
            exposed_path: self.exposed_path,
            provider_id: ProviderId::from_native(self.provider_id),
            attributes: VolumeSnapshotAttributes::from_bits(self.attributes),
            creation_timestamp: filetime_to_datetime(self.creation_timestamp),
            state: SnapshotState::from_raw(self.state),
        }
    }

    /// Check for the `PERSISTENT` attribute bit
    pub fn is_persistent(&self) -> bool {
        VolumeSnapshotAttributes::from_bits(self.attributes)
            .contains(VolumeSnapshotAttributes::PERSISTENT)
    }
}

/// Provider properties in native form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeProviderProperties {
    /// Provider identity
    pub provider_id: NativeId,
    /// Display name
    pub name: String,
    /// Raw provider type
    pub provider_type: u32,
    /// Version string
    pub version: String,
    /// Version identity
    pub version_id: NativeId,
    /// Class identity
    pub class_id: NativeId,
}

impl NativeProviderProperties {
    /// Convert into engine-side properties
    pub fn into_properties(self) -> ProviderProperties {
        ProviderProperties {
            provider_id: ProviderId::from_native(self.provider_id),
            name: self.name,
            provider_type: ProviderType::from_raw(self.provider_type),
            version: self.version,
            version_id: shadowset_core::to_guid(self.version_id),
            class_id: shadowset_core::to_guid(self.class_id),
        }
    }
}

/// Writer metadata in native form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeWriterMetadata {
    /// Writer instance
    pub instance_id: NativeId,
    /// Writer class
    pub writer_id: NativeId,
    /// Writer name
    pub name: String,
    /// Raw usage type
    pub usage_type: u32,
    /// Raw restore method
    pub restore_method: u32,
    /// Declared components
    pub components: Vec<WriterComponent>,
}

impl NativeWriterMetadata {
    /// Convert into an engine-side entry
    pub fn into_entry(self) -> WriterMetadataEntry {
        WriterMetadataEntry {
            instance_id: WriterInstanceId::from_native(self.instance_id),
            writer_id: WriterId::from_native(self.writer_id),
            name: self.name,
            usage_type: WriterUsageType::from_raw(self.usage_type),
            restore_method: RestoreMethod::from_raw(self.restore_method),
            components: self.components,
        }
    }
}

/// Writer components in native form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeWriterComponents {
    /// Writer instance
    pub instance_id: NativeId,
    /// Writer class
    pub writer_id: NativeId,
    /// Components with annotations
    pub components: Vec<WriterComponent>,
}

impl NativeWriterComponents {
    /// Convert into an engine-side entry
    pub fn into_entry(self) -> WriterComponentsEntry {
        WriterComponentsEntry {
            instance_id: WriterInstanceId::from_native(self.instance_id),
            writer_id: WriterId::from_native(self.writer_id),
            components: self.components,
        }
    }
}

/// Writer status in native form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeWriterStatus {
    /// Writer instance
    pub instance_id: NativeId,
    /// Writer class
    pub writer_id: NativeId,
    /// Writer name
    pub name: String,
    /// Raw writer state
    pub state: u32,
    /// Last failure code
    pub failure: StatusCode,
}

impl NativeWriterStatus {
    /// Convert into an engine-side entry
    pub fn into_entry(self) -> WriterStatusEntry {
        WriterStatusEntry {
            instance_id: WriterInstanceId::from_native(self.instance_id),
            writer_id: WriterId::from_native(self.writer_id),
            name: self.name,
            state: WriterState::from_raw(self.state),
            failure: WriterFailure::from_status(self.failure),
        }
    }
}
