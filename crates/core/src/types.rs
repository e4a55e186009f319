//! Flag and enumeration types shared with snapshot providers
//!
//! Bit flags are `u32` newtypes with named constants. Enumerations carry
//! their provider wire value through `as_raw` / `from_raw`; unknown raw
//! values decode to the enumeration's `Unknown`/`Undefined` member instead
//! of failing.

use crate::codec::{codes, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

macro_rules! flag_ops {
    ($name:ident) => {
        impl $name {
            /// Raw bit pattern
            pub const fn bits(&self) -> u32 {
                self.0
            }

            /// Wrap a raw bit pattern
            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            /// Check that every bit of `other` is set
            pub const fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Check that no bit is set
            pub const fn is_empty(&self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}

// =============================================================================
// Snapshot attributes and contexts
// =============================================================================

/// Attribute bits of a snapshot (and building blocks of a context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VolumeSnapshotAttributes(u32);

flag_ops!(VolumeSnapshotAttributes);

impl VolumeSnapshotAttributes {
    /// No attributes
    pub const NONE: Self = Self(0);
    /// Survives the session that created it
    pub const PERSISTENT: Self = Self(0x0000_0001);
    /// No automatic recovery after creation
    pub const NO_AUTO_RECOVERY: Self = Self(0x0000_0002);
    /// Visible to users as a previous version
    pub const CLIENT_ACCESSIBLE: Self = Self(0x0000_0004);
    /// Not deleted when the session ends
    pub const NO_AUTO_RELEASE: Self = Self(0x0000_0008);
    /// Writers are not involved
    pub const NO_WRITERS: Self = Self(0x0000_0010);
    /// Can be moved to another machine
    pub const TRANSPORTABLE: Self = Self(0x0000_0020);
    /// Not surfaced to the local machine
    pub const NOT_SURFACED: Self = Self(0x0000_0040);
    /// Not transacted
    pub const NOT_TRANSACTED: Self = Self(0x0000_0080);
    /// Created by a hardware provider
    pub const HARDWARE_ASSISTED: Self = Self(0x0001_0000);
    /// Differential (copy-on-write) snapshot
    pub const DIFFERENTIAL: Self = Self(0x0002_0000);
    /// Full plex copy
    pub const PLEX: Self = Self(0x0004_0000);
    /// Imported from a transportable set
    pub const IMPORTED: Self = Self(0x0008_0000);
    /// Exposed as a local drive or mount point
    pub const EXPOSED_LOCALLY: Self = Self(0x0010_0000);
    /// Exposed as a network share
    pub const EXPOSED_REMOTELY: Self = Self(0x0020_0000);
    /// Auto-recovery performed
    pub const AUTORECOVER: Self = Self(0x0040_0000);
    /// Created for rollback recovery
    pub const ROLLBACK_RECOVERY: Self = Self(0x0080_0000);
}

/// Snapshot context: the attribute combination a session creates snapshots with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SnapshotContext(u32);

flag_ops!(SnapshotContext);

impl SnapshotContext {
    /// Non-persistent, auto-released, writer-coordinated (the default)
    pub const BACKUP: Self = Self(0);
    /// Non-persistent, no writers
    pub const FILE_SHARE_BACKUP: Self = Self(VolumeSnapshotAttributes::NO_WRITERS.bits());
    /// Persistent, no writers, not auto-released
    pub const NAS_ROLLBACK: Self = Self(
        VolumeSnapshotAttributes::PERSISTENT.bits()
            | VolumeSnapshotAttributes::NO_AUTO_RELEASE.bits()
            | VolumeSnapshotAttributes::NO_WRITERS.bits(),
    );
    /// Persistent, writer-coordinated, not auto-released
    pub const APP_ROLLBACK: Self = Self(
        VolumeSnapshotAttributes::PERSISTENT.bits()
            | VolumeSnapshotAttributes::NO_AUTO_RELEASE.bits(),
    );
    /// Persistent, client accessible, no writers
    pub const CLIENT_ACCESSIBLE: Self = Self(
        VolumeSnapshotAttributes::PERSISTENT.bits()
            | VolumeSnapshotAttributes::CLIENT_ACCESSIBLE.bits()
            | VolumeSnapshotAttributes::NO_AUTO_RELEASE.bits()
            | VolumeSnapshotAttributes::NO_WRITERS.bits(),
    );
    /// Persistent, client accessible, writer-coordinated
    pub const CLIENT_ACCESSIBLE_WRITERS: Self = Self(
        VolumeSnapshotAttributes::PERSISTENT.bits()
            | VolumeSnapshotAttributes::CLIENT_ACCESSIBLE.bits()
            | VolumeSnapshotAttributes::NO_AUTO_RELEASE.bits(),
    );
    /// Every context (query filter only)
    pub const ALL: Self = Self(u32::MAX);

    const PRESETS: [(&'static str, SnapshotContext); 7] = [
        ("backup", Self::BACKUP),
        ("file_share_backup", Self::FILE_SHARE_BACKUP),
        ("nas_rollback", Self::NAS_ROLLBACK),
        ("app_rollback", Self::APP_ROLLBACK),
        ("client_accessible", Self::CLIENT_ACCESSIBLE),
        ("client_accessible_writers", Self::CLIENT_ACCESSIBLE_WRITERS),
        ("all", Self::ALL),
    ];

    /// Check whether the context sets the given attribute
    pub const fn has(&self, attribute: VolumeSnapshotAttributes) -> bool {
        self.0 & attribute.bits() == attribute.bits()
    }

    /// Add attribute bits to the context
    pub const fn with(self, attribute: VolumeSnapshotAttributes) -> Self {
        Self(self.0 | attribute.bits())
    }

    /// Attributes carried by snapshots created under this context
    pub const fn attributes(&self) -> VolumeSnapshotAttributes {
        VolumeSnapshotAttributes::from_bits(self.0)
    }

    /// Look up a preset by its configuration name
    ///
    /// Accepts `snake_case` or `kebab-case`, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.to_ascii_lowercase().replace('-', "_");
        Self::PRESETS
            .iter()
            .find(|(preset, _)| *preset == normalized)
            .map(|(_, context)| *context)
    }

    /// Configuration name of a preset, if this value is one
    pub fn preset_name(&self) -> Option<&'static str> {
        Self::PRESETS
            .iter()
            .find(|(_, context)| context == self)
            .map(|(name, _)| *name)
    }
}

/// Snapshot compatibility flags reported for a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SnapshotCompatibility(u32);

flag_ops!(SnapshotCompatibility);

impl SnapshotCompatibility {
    /// No restrictions
    pub const NONE: Self = Self(0);
    /// Defragmentation must be disabled while snapshots exist
    pub const DISABLE_DEFRAG: Self = Self(0x1);
    /// Content indexing must be disabled while snapshots exist
    pub const DISABLE_CONTENT_INDEX: Self = Self(0x2);
}

// =============================================================================
// Enumerations
// =============================================================================

macro_rules! raw_enum {
    (
        $(#[$meta:meta])*
        $name:ident, fallback = $fallback:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $raw:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Provider wire value
            pub fn as_raw(&self) -> u32 {
                match self {
                    $( $name::$variant => $raw ),+
                }
            }

            /// Decode a provider wire value
            pub fn from_raw(raw: u32) -> Self {
                match raw {
                    $( $raw => $name::$variant, )+
                    _ => $name::$fallback,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$fallback
            }
        }
    };
}

raw_enum!(
    /// Kind of backup being performed
    BackupType, fallback = Undefined {
        /// Not specified
        Undefined = 0,
        /// Full backup; history of previous backups is reset
        Full = 1,
        /// Changes since the last full or incremental backup
        Incremental = 2,
        /// Changes since the last full backup
        Differential = 3,
        /// Log files only
        Log = 4,
        /// Full copy that does not affect backup history
        Copy = 5,
        /// Other
        Other = 6,
    }
);

raw_enum!(
    /// Kind of restore being performed
    RestoreType, fallback = Undefined {
        /// Not specified
        Undefined = 0,
        /// Files are copied back in place
        ByCopy = 1,
        /// Volumes are imported (no copy)
        Import = 2,
        /// Other
        Other = 3,
    }
);

raw_enum!(
    /// Kind of object addressed by a delete, break or query
    ObjectType, fallback = Unknown {
        /// Unknown
        Unknown = 0,
        /// No object
        None = 1,
        /// A snapshot set
        SnapshotSet = 2,
        /// A single snapshot
        Snapshot = 3,
        /// A provider
        Provider = 4,
    }
);

raw_enum!(
    /// Kind of writer component
    ComponentType, fallback = Undefined {
        /// Not specified
        Undefined = 0,
        /// Database component
        Database = 1,
        /// File group component
        FileGroup = 2,
    }
);

raw_enum!(
    /// Outcome of restoring a component's files
    FileRestoreStatus, fallback = Undefined {
        /// Not reported
        Undefined = 0,
        /// No file was restored
        None = 1,
        /// Every file was restored
        All = 2,
        /// Restore failed part way
        Failed = 3,
    }
);

raw_enum!(
    /// Kind of snapshot provider
    ProviderType, fallback = Unknown {
        /// Unknown
        Unknown = 0,
        /// The built-in system provider
        System = 1,
        /// Software provider
        Software = 2,
        /// Hardware provider
        Hardware = 3,
    }
);

raw_enum!(
    /// Creation state of a snapshot
    SnapshotState, fallback = Unknown {
        /// Unknown
        Unknown = 0,
        /// Being added to the set
        Preparing = 1,
        /// Provider preparing
        ProcessingPrepare = 2,
        /// Prepared
        Prepared = 3,
        /// Before commit
        ProcessingPreCommit = 4,
        /// Pre-committed
        PreCommitted = 5,
        /// Commit in progress
        ProcessingCommit = 6,
        /// Committed
        Committed = 7,
        /// After commit
        ProcessingPostCommit = 8,
        /// Before final commit
        ProcessingPreFinalCommit = 9,
        /// Pre-final-committed
        PreFinalCommitted = 10,
        /// After final commit
        ProcessingPostFinalCommit = 11,
        /// Snapshot exists
        Created = 12,
        /// Creation aborted
        Aborted = 13,
        /// Deleted
        Deleted = 14,
        /// Post-committed
        PostCommitted = 15,
    }
);

raw_enum!(
    /// State of a writer as last reported
    WriterState, fallback = Unknown {
        /// Unknown
        Unknown = 0,
        /// Idle and ready
        Stable = 1,
        /// Waiting for the freeze event
        WaitingForFreeze = 2,
        /// Waiting for the thaw event
        WaitingForThaw = 3,
        /// Waiting for post-snapshot
        WaitingForPostSnapshot = 4,
        /// Waiting for backup completion
        WaitingForBackupComplete = 5,
        /// Failed while identifying
        FailedAtIdentify = 6,
        /// Failed preparing for backup
        FailedAtPrepareBackup = 7,
        /// Failed preparing for the snapshot
        FailedAtPrepareSnapshot = 8,
        /// Failed at freeze
        FailedAtFreeze = 9,
        /// Failed at thaw
        FailedAtThaw = 10,
        /// Failed at post-snapshot
        FailedAtPostSnapshot = 11,
        /// Failed at backup completion
        FailedAtBackupComplete = 12,
        /// Failed at pre-restore
        FailedAtPreRestore = 13,
        /// Failed at post-restore
        FailedAtPostRestore = 14,
        /// Failed at backup shutdown
        FailedAtBackupShutdown = 15,
    }
);

raw_enum!(
    /// How a writer's data is used
    WriterUsageType, fallback = Undefined {
        /// Not specified
        Undefined = 0,
        /// Part of the bootable system state
        BootableSystemState = 1,
        /// System service data
        SystemService = 2,
        /// User data
        UserData = 3,
        /// Other
        Other = 4,
    }
);

raw_enum!(
    /// How a writer expects its data to be restored
    RestoreMethod, fallback = Undefined {
        /// Not specified
        Undefined = 0,
        /// Restore only files that are missing
        RestoreIfNotThere = 1,
        /// Restore files that can be replaced
        RestoreIfCanReplace = 2,
        /// Stop the service, restore, start it again
        StopRestoreStart = 3,
        /// Restore to an alternate location
        RestoreToAlternateLocation = 4,
        /// Restore at reboot
        RestoreAtReboot = 5,
        /// Restore at reboot if files cannot be replaced
        RestoreAtRebootIfCannotReplace = 6,
        /// Writer-specific restore
        Custom = 7,
        /// Restore, then stop and start the service
        RestoreStopStart = 8,
    }
);

impl WriterState {
    /// Check for any of the `FailedAt*` states
    pub fn is_failed(&self) -> bool {
        self.as_raw() >= WriterState::FailedAtIdentify.as_raw()
    }
}

/// Failure last reported by a writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WriterFailure {
    /// No failure
    #[default]
    None,
    /// Snapshot would be inconsistent
    InconsistentSnapshot,
    /// Writer ran out of resources
    OutOfResources,
    /// Writer timed out
    Timeout,
    /// Transient failure, retrying may succeed
    Retryable,
    /// Permanent failure
    NonRetryable,
    /// Any other failure code
    Other(StatusCode),
}

impl WriterFailure {
    /// Decode a writer failure code
    pub fn from_status(code: StatusCode) -> Self {
        if code.is_success() {
            return WriterFailure::None;
        }
        match code.0 {
            codes::WRITER_INCONSISTENT_SNAPSHOT => WriterFailure::InconsistentSnapshot,
            codes::WRITER_OUT_OF_RESOURCES => WriterFailure::OutOfResources,
            codes::WRITER_TIMEOUT => WriterFailure::Timeout,
            codes::WRITER_RETRYABLE => WriterFailure::Retryable,
            codes::WRITER_NON_RETRYABLE => WriterFailure::NonRetryable,
            _ => WriterFailure::Other(code),
        }
    }

    /// Encode as a writer failure code
    pub fn to_status(&self) -> StatusCode {
        match self {
            WriterFailure::None => StatusCode::OK,
            WriterFailure::InconsistentSnapshot => StatusCode(codes::WRITER_INCONSISTENT_SNAPSHOT),
            WriterFailure::OutOfResources => StatusCode(codes::WRITER_OUT_OF_RESOURCES),
            WriterFailure::Timeout => StatusCode(codes::WRITER_TIMEOUT),
            WriterFailure::Retryable => StatusCode(codes::WRITER_RETRYABLE),
            WriterFailure::NonRetryable => StatusCode(codes::WRITER_NON_RETRYABLE),
            WriterFailure::Other(code) => *code,
        }
    }
}
