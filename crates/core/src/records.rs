//! Property records and writer projections
//!
//! Plain data returned by the engine. Nothing here holds a provider handle;
//! every record is a snapshot of provider state at the time of the call.

use crate::ids::{ProviderId, SnapshotId, SnapshotSetId, WriterId, WriterInstanceId};
use crate::types::{
    BackupType, ComponentType, FileRestoreStatus, ProviderType, RestoreMethod, SnapshotState,
    VolumeSnapshotAttributes, WriterFailure, WriterState, WriterUsageType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Snapshots and providers
// =============================================================================

/// Properties of one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotProperties {
    /// Snapshot identity
    pub snapshot_id: SnapshotId,
    /// Set the snapshot belongs to
    pub snapshot_set_id: SnapshotSetId,
    /// Number of snapshots in the set
    pub snapshots_count: u32,
    /// Device path of the snapshot volume
    pub snapshot_device_object: String,
    /// Volume the snapshot was taken of
    pub original_volume_name: String,
    /// Machine the original volume lives on
    pub originating_machine: String,
    /// Machine that created the snapshot
    pub service_machine: String,
    /// Drive letter, mount point or share name if exposed
    pub exposed_name: Option<String>,
    /// Exposed sub-path, if any
    pub exposed_path: Option<String>,
    /// Provider that created the snapshot
    pub provider_id: ProviderId,
    /// Attribute flags
    pub attributes: VolumeSnapshotAttributes,
    /// Creation time
    pub creation_timestamp: DateTime<Utc>,
    /// Creation state
    pub state: SnapshotState,
}

impl SnapshotProperties {
    /// Check for the `PERSISTENT` attribute
    pub fn is_persistent(&self) -> bool {
        self.attributes.contains(VolumeSnapshotAttributes::PERSISTENT)
    }

    /// Check whether the snapshot is exposed locally or remotely
    pub fn is_exposed(&self) -> bool {
        self.exposed_name.is_some()
    }
}

/// Properties of a registered snapshot provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProperties {
    /// Provider identity
    pub provider_id: ProviderId,
    /// Display name
    pub name: String,
    /// Provider kind
    pub provider_type: ProviderType,
    /// Version string
    pub version: String,
    /// Version identity
    pub version_id: Uuid,
    /// Implementation class identity
    pub class_id: Uuid,
}

// =============================================================================
// Components
// =============================================================================

/// Addressing tuple for component-level calls
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Writer class that owns the component
    pub writer_id: WriterId,
    /// Component kind
    pub component_type: ComponentType,
    /// Logical path, if the writer uses one
    pub logical_path: Option<String>,
    /// Component name
    pub name: String,
}

impl ComponentRef {
    /// Address a component with no logical path
    pub fn new(writer_id: WriterId, component_type: ComponentType, name: impl Into<String>) -> Self {
        Self {
            writer_id,
            component_type,
            logical_path: None,
            name: name.into(),
        }
    }

    /// Set the logical path
    pub fn with_logical_path(mut self, path: impl Into<String>) -> Self {
        self.logical_path = Some(path.into());
        self
    }

    /// Check whether a component (of this writer) is the one addressed
    pub fn matches(&self, component: &WriterComponent) -> bool {
        self.component_type == component.component_type
            && self.logical_path == component.logical_path
            && self.name == component.name
    }
}

/// One component of a writer, with the requester's annotations
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriterComponent {
    /// Component kind
    pub component_type: ComponentType,
    /// Logical path
    pub logical_path: Option<String>,
    /// Component name
    pub name: String,
    /// Whether the requester may choose to include it
    pub selectable: bool,
    /// Selected for backup
    pub selected: bool,
    /// Outcome recorded by the requester after snapshot creation
    pub backup_succeeded: Option<bool>,
    /// Requester-defined backup options
    pub backup_options: Option<String>,
    /// Stamp of the previous backup (for incremental/differential)
    pub previous_backup_stamp: Option<String>,
    /// Selected for restore
    pub selected_for_restore: bool,
    /// Requester-defined restore options
    pub restore_options: Option<String>,
    /// Additional restores will follow (log replay)
    pub additional_restores: bool,
    /// Outcome of restoring the component's files
    pub file_restore_status: FileRestoreStatus,
    /// Subcomponents selected for restore, as (logical path, name)
    pub restore_subcomponents: Vec<(String, String)>,
    /// Files restored somewhere other than their original location
    pub alternative_locations: Vec<LocationMapping>,
    /// Files redirected to a new target during restore
    pub new_targets: Vec<LocationMapping>,
    /// Ranges files of partially backed-up files, as (partial file index, path)
    pub ranges_files: Vec<(u32, String)>,
}

impl WriterComponent {
    /// A selectable component with no annotations
    pub fn new(component_type: ComponentType, name: impl Into<String>) -> Self {
        Self {
            component_type,
            name: name.into(),
            selectable: true,
            ..Default::default()
        }
    }

    /// Set the logical path
    pub fn with_logical_path(mut self, path: impl Into<String>) -> Self {
        self.logical_path = Some(path.into());
        self
    }
}

/// A file set of a component mapped to another directory on restore
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationMapping {
    /// Original directory of the files
    pub path: String,
    /// File specification within `path`, e.g. `*.edb`
    pub filespec: String,
    /// Whether subdirectories of `path` are included
    pub recursive: bool,
    /// Directory the files are restored to
    pub destination: String,
}

impl LocationMapping {
    pub fn new(
        path: impl Into<String>,
        filespec: impl Into<String>,
        recursive: bool,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            filespec: filespec.into(),
            recursive,
            destination: destination.into(),
        }
    }
}

/// Requester-level backup declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupState {
    /// Components are selected individually
    pub select_components: bool,
    /// Bootable system state is included
    pub bootable_system_state: bool,
    /// Kind of backup
    pub backup_type: BackupType,
    /// Partial files are supported
    pub partial_file_support: bool,
}

impl Default for BackupState {
    fn default() -> Self {
        Self {
            select_components: true,
            bootable_system_state: false,
            backup_type: BackupType::Full,
            partial_file_support: false,
        }
    }
}

// =============================================================================
// Writer projections
// =============================================================================

/// Metadata declared by one writer instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterMetadataEntry {
    /// Writer instance
    pub instance_id: WriterInstanceId,
    /// Writer class
    pub writer_id: WriterId,
    /// Writer name
    pub name: String,
    /// How the writer's data is used
    pub usage_type: WriterUsageType,
    /// How the writer expects to be restored
    pub restore_method: RestoreMethod,
    /// Declared components
    pub components: Vec<WriterComponent>,
}

/// Components of one writer as recorded in the backup document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterComponentsEntry {
    /// Writer instance
    pub instance_id: WriterInstanceId,
    /// Writer class
    pub writer_id: WriterId,
    /// Components with their annotations
    pub components: Vec<WriterComponent>,
}

impl WriterComponentsEntry {
    /// Components currently selected for backup
    pub fn selected(&self) -> impl Iterator<Item = &WriterComponent> {
        self.components.iter().filter(|c| c.selected)
    }
}

/// Last status reported by one writer instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterStatusEntry {
    /// Writer instance
    pub instance_id: WriterInstanceId,
    /// Writer class
    pub writer_id: WriterId,
    /// Writer name
    pub name: String,
    /// Current state
    pub state: WriterState,
    /// Last failure
    pub failure: WriterFailure,
}
