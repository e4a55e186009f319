//! In-memory snapshot provider
//!
//! A complete [`SnapshotProvider`] that keeps volumes, writers, providers and
//! snapshots in process memory. It backs the test suites and lets the engine
//! run end to end without a platform snapshot service.
//!
//! Beyond plain simulation it supports:
//! - failure injection per call site, at call time or at async completion
//! - holding async operations pending until released (other operations run
//!   as soon as they start)
//! - protecting snapshots from non-forced deletion
//! - counting live native sessions and async handles
//!
//! Snapshots created in a context without `NO_AUTO_RELEASE` are deleted when
//! the native session that created them is released.

mod async_op;
mod document;
mod session;
mod state;

pub use state::MemoryWriter;

use crate::provider::{
    NativeProviderProperties, NativeSession, NativeSnapshotProperties, NativeVolumeStatus,
    SnapshotProvider,
};
use chrono::Utc;
use session::MemorySession;
use shadowset_core::codec::codes;
use shadowset_core::{
    datetime_to_filetime, to_native_id, NativeId, NativeResult, ProviderId, ProviderProperties,
    ProviderType, SnapshotCompatibility, SnapshotContext, SnapshotId, SnapshotSetId,
    SnapshotState, StatusCode,
};
use state::{MemoryState, Shared, StoredSnapshot, VolumeEntry};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Identity of the built-in system provider
pub const SYSTEM_PROVIDER_ID: ProviderId =
    ProviderId::from_uuid(Uuid::from_u128(0xb594_6137_7b9f_4925_af80_51ab_d60b_20d5));

/// Provider call sites that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Creating a native session
    CreateSession,
    /// Session-independent snapshot presence query
    IsVolumeSnapshotted,
    /// Session-independent revert block query
    ShouldBlockRevert,
    /// Initialize for backup
    InitializeForBackup,
    /// Initialize for restore
    InitializeForRestore,
    /// Set context
    SetContext,
    /// Set backup state
    SetBackupState,
    /// Abort backup
    AbortBackup,
    /// Gather writer metadata
    GatherWriterMetadata,
    /// Gather writer status
    GatherWriterStatus,
    /// Any writer list access (counts and entries)
    ListWriters,
    /// Start snapshot set
    StartSnapshotSet,
    /// Add to snapshot set
    AddToSnapshotSet,
    /// Volume support query
    IsVolumeSupported,
    /// Prepare for backup
    PrepareForBackup,
    /// Do snapshot set
    DoSnapshotSet,
    /// Backup complete
    BackupComplete,
    /// Save the backup document
    SaveAsXml,
    /// Add component
    AddComponent,
    /// Any component annotation (backup or restore)
    AnnotateComponent,
    /// Set restore state
    SetRestoreState,
    /// Pre-restore
    PreRestore,
    /// Post-restore
    PostRestore,
    /// Delete snapshots
    DeleteSnapshots,
    /// Snapshot property queries
    QuerySnapshots,
    /// Provider query
    QueryProviders,
    /// Expose snapshot
    ExposeSnapshot,
    /// Break snapshot set
    BreakSnapshotSet,
    /// Import snapshots
    ImportSnapshots,
    /// Revert to snapshot
    RevertToSnapshot,
    /// Query revert status
    QueryRevertStatus,
}

pub(crate) fn system_provider() -> NativeProviderProperties {
    NativeProviderProperties {
        provider_id: SYSTEM_PROVIDER_ID.to_native(),
        name: "Memory Software Shadow Copy provider".to_string(),
        provider_type: ProviderType::System.as_raw(),
        version: "1.0.0.0".to_string(),
        version_id: to_native_id(Uuid::from_u128(1)),
        class_id: to_native_id(Uuid::from_u128(0xb594_6137_0000_0000_0000_0000_0000_0001)),
    }
}

/// In-memory snapshot provider
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct MemoryProvider {
    shared: Arc<Shared>,
}

impl MemoryProvider {
    /// A provider with only the system provider registered and no volumes
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(MemoryState::new(system_provider()))),
        }
    }

    // =========================================================================
    // Builders
    // =========================================================================

    /// Add a snapshot-capable volume
    pub fn with_volume(self, name: impl Into<String>) -> Self {
        self.update_volume(name.into(), |entry| entry.supported = true)
    }

    /// Add a volume no provider can snapshot
    pub fn with_unsupported_volume(self, name: impl Into<String>) -> Self {
        self.update_volume(name.into(), |entry| entry.supported = false)
    }

    /// Report compatibility flags for a volume
    pub fn with_volume_compatibility(
        self,
        name: impl Into<String>,
        compatibility: SnapshotCompatibility,
    ) -> Self {
        self.update_volume(name.into(), |entry| entry.compatibility = compatibility.bits())
    }

    /// Report that reverting the volume should be blocked
    pub fn with_revert_blocked(self, name: impl Into<String>) -> Self {
        self.update_volume(name.into(), |entry| entry.revert_blocked = true)
    }

    /// Register a writer
    pub fn with_writer(self, writer: MemoryWriter) -> Self {
        self.shared.state.lock().writers.push(writer);
        self
    }

    /// Register an additional provider
    pub fn with_provider(self, props: ProviderProperties) -> Self {
        self.shared.state.lock().providers.push(NativeProviderProperties {
            provider_id: props.provider_id.to_native(),
            name: props.name,
            provider_type: props.provider_type.as_raw(),
            version: props.version,
            version_id: to_native_id(props.version_id),
            class_id: to_native_id(props.class_id),
        });
        self
    }

    /// Machine name reported in snapshot properties
    pub fn with_machine_name(self, name: impl Into<String>) -> Self {
        self.shared.state.lock().machine = name.into();
        self
    }

    fn update_volume(self, name: String, update: impl FnOnce(&mut VolumeEntry)) -> Self {
        {
            let mut state = self.shared.state.lock();
            let entry = state.volumes.entry(name).or_insert_with(|| VolumeEntry {
                supported: true,
                ..VolumeEntry::default()
            });
            update(entry);
        }
        self
    }

    // =========================================================================
    // Failure injection and async control
    // =========================================================================

    /// Make every later call at `point` fail immediately with `code`
    pub fn fail_call(&self, point: FailPoint, code: i32) {
        self.shared
            .state
            .lock()
            .call_failures
            .insert(point, StatusCode(code));
    }

    /// Make every later async operation at `point` finish with `code`
    pub fn fail_completion(&self, point: FailPoint, code: i32) {
        self.shared
            .state
            .lock()
            .completion_failures
            .insert(point, StatusCode(code));
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        let mut state = self.shared.state.lock();
        state.call_failures.clear();
        state.completion_failures.clear();
    }

    /// Keep async operations started from now on pending until released
    pub fn hold_async(&self, hold: bool) {
        self.shared.hold.lock().hold_new = hold;
    }

    /// Let every held async operation run
    pub fn release_held(&self) {
        self.shared.release_held();
    }

    // =========================================================================
    // Snapshot store
    // =========================================================================

    /// Refuse non-forced deletion (and non-forced revert) of a snapshot
    pub fn protect_snapshot(&self, id: SnapshotId) {
        self.shared.state.lock().protected.insert(id.to_native());
    }

    /// Create a persistent snapshot set outside any session
    ///
    /// Unknown volumes are registered as supported. The snapshots are never
    /// auto-released.
    pub fn seed_snapshot_set(
        &self,
        volumes: &[&str],
        context: SnapshotContext,
    ) -> (SnapshotSetId, Vec<SnapshotId>) {
        let set = SnapshotSetId::generate();
        let created_at = datetime_to_filetime(Utc::now());
        let mut state = self.shared.state.lock();
        let provider = state.default_provider();
        let mut ids = Vec::with_capacity(volumes.len());
        for volume in volumes {
            state
                .volumes
                .entry(volume.to_string())
                .or_insert_with(|| VolumeEntry {
                    supported: true,
                    ..VolumeEntry::default()
                });
            let id = SnapshotId::generate();
            let device = state.next_device_object();
            let props = NativeSnapshotProperties {
                snapshot_id: id.to_native(),
                snapshot_set_id: set.to_native(),
                snapshots_count: volumes.len() as u32,
                snapshot_device_object: device,
                original_volume_name: volume.to_string(),
                originating_machine: state.machine.clone(),
                service_machine: state.machine.clone(),
                exposed_name: None,
                exposed_path: None,
                provider_id: provider,
                attributes: context.bits(),
                creation_timestamp: created_at,
                state: SnapshotState::Created.as_raw(),
            };
            state
                .snapshots
                .insert(id.to_native(), StoredSnapshot { props, owner: None });
            ids.push(id);
        }
        debug!(target: "shadowset::memory", snapshot_set = %set, count = ids.len(), "Snapshot set seeded");
        (set, ids)
    }

    /// Number of stored snapshots
    pub fn snapshot_count(&self) -> usize {
        self.shared.state.lock().snapshots.len()
    }

    /// Check whether a snapshot exists
    pub fn has_snapshot(&self, id: SnapshotId) -> bool {
        self.shared
            .state
            .lock()
            .snapshots
            .contains_key(&id.to_native())
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Native sessions not yet released
    pub fn live_sessions(&self) -> usize {
        self.shared.live_sessions.load(Ordering::SeqCst)
    }

    /// Native async handles not yet released
    pub fn live_async_operations(&self) -> usize {
        self.shared.live_async.load(Ordering::SeqCst)
    }

    /// Native async handles ever created
    pub fn async_created(&self) -> usize {
        self.shared.async_created.load(Ordering::SeqCst)
    }

    /// Native async handles ever released
    pub fn async_released(&self) -> usize {
        self.shared.async_released.load(Ordering::SeqCst)
    }

    fn volume(&self, volume: &str) -> NativeResult<VolumeEntry> {
        let state = self.shared.state.lock();
        match state.volumes.get(volume) {
            None => Err(StatusCode(codes::OBJECT_NOT_FOUND)),
            Some(entry) if !entry.supported => Err(StatusCode(codes::VOLUME_NOT_SUPPORTED)),
            Some(entry) => Ok(entry.clone()),
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotProvider for MemoryProvider {
    fn create_session(&self) -> NativeResult<Box<dyn NativeSession>> {
        if let Some(code) = self.shared.call_failure(FailPoint::CreateSession) {
            return Err(code);
        }
        Ok(Box::new(MemorySession::new(Arc::clone(&self.shared))))
    }

    fn is_volume_snapshotted(&self, volume: &str) -> NativeResult<NativeVolumeStatus> {
        if let Some(code) = self.shared.call_failure(FailPoint::IsVolumeSnapshotted) {
            return Err(code);
        }
        let entry = self.volume(volume)?;
        let snapshots_present = self
            .shared
            .state
            .lock()
            .snapshots
            .values()
            .any(|s| s.props.original_volume_name == volume);
        Ok(NativeVolumeStatus {
            snapshots_present,
            compatibility: entry.compatibility,
        })
    }

    fn should_block_revert(&self, volume: &str) -> NativeResult<bool> {
        if let Some(code) = self.shared.call_failure(FailPoint::ShouldBlockRevert) {
            return Err(code);
        }
        Ok(self.volume(volume)?.revert_blocked)
    }
}

impl fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MemoryProvider")
            .field("volumes", &state.volumes.len())
            .field("writers", &state.writers.len())
            .field("snapshots", &state.snapshots.len())
            .field("live_sessions", &self.live_sessions())
            .finish()
    }
}
