//! Snapshot-set session lifecycle phases
//!
//! Backup lineage:
//! `Created` → `Initialized` → `MetadataGathering` → `BackupStateSet` →
//! `SnapshotSetStarted` → `Preparing` → `CreatingSnapshots` →
//! `SnapshotsCreated` → `Completing` → `Done`
//!
//! Restore lineage: `Created` → `Restoring` → `Done`
//!
//! Terminal phases (every operation rejected):
//! - `Aborted`
//! - `Disposed`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a snapshot-set session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Native session allocated, nothing called yet
    Created,
    /// Initialized for backup
    Initialized,
    /// Writer metadata requested
    MetadataGathering,
    /// Backup state declared
    BackupStateSet,
    /// Snapshot set identity allocated, volumes may be added
    SnapshotSetStarted,
    /// Writers asked to prepare for backup
    Preparing,
    /// Snapshot creation committed and in flight (or failed)
    CreatingSnapshots,
    /// Every snapshot in the set exists
    SnapshotsCreated,
    /// Backup completion notified to writers
    Completing,
    /// Backup or restore finished
    Done,
    /// Initialized for restore
    Restoring,
    /// Aborted by the caller; handle released
    Aborted,
    /// Handle released
    Disposed,
}

impl Phase {
    /// Check whether the phase rejects every further operation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Aborted | Phase::Disposed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
