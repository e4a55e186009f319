//! Snapshot-set session
//!
//! A `SnapshotSetSession` exclusively owns one native session handle and
//! drives it through the backup or restore lifecycle.
//!
//! # State Transition
//!
//! Backup: `Created` → `Initialized` → `MetadataGathering` → `BackupStateSet` →
//! `SnapshotSetStarted` → `Preparing` → `CreatingSnapshots` →
//! `SnapshotsCreated` → `Completing` → `Done`.
//!
//! Restore: `Created` → `Restoring` → `Done`.
//!
//! `abort_backup` moves any live session to `Aborted`; `release` (or drop)
//! moves it to `Disposed`. Both release the native handle, after which every
//! operation fails with `SessionClosed`.
//!
//! Every operation checks, in order: the handle is live, the capability gate,
//! the lifecycle preconditions. Only then is the provider called. A rejected
//! call has no side effects.
//!
//! One thread drives a session at a time. The internal mutex exists so
//! collection views and async completion hooks can reach the session core,
//! not to make concurrent driving meaningful.

mod components;
pub(crate) mod milestones;
mod query;
mod restore;

use crate::async_op::{AsyncOperation, OperationKind};
use crate::capability::CapabilityGate;
use crate::collections::{WriterComponentsList, WriterMetadataList, WriterStatusList};
use crate::provider::{NativeAsync, NativeSession};
use milestones::{Closure, Milestones, Mode, Step};
use parking_lot::Mutex;
use shadowset_core::{
    check_result, check_value, BackupState, NativeResult, OrchestrationError, Phase, PlatformLevel,
    ProviderId, Result, SnapshotContext, SnapshotId, SnapshotSetId, VolumeSnapshotAttributes,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Session core
// =============================================================================

/// State shared between the session, its collection views and its async hooks
pub(crate) struct SessionCore {
    native: Option<Box<dyn NativeSession>>,
    pub(crate) milestones: Milestones,
}

impl SessionCore {
    pub(crate) fn new(native: Box<dyn NativeSession>) -> Self {
        Self {
            native: Some(native),
            milestones: Milestones::default(),
        }
    }

    /// Live native handle
    ///
    /// # Errors
    ///
    /// `SessionClosed` once the handle has been released.
    pub(crate) fn native(&self) -> Result<&dyn NativeSession> {
        if self.milestones.closed.is_some() {
            return Err(OrchestrationError::SessionClosed);
        }
        self.native
            .as_deref()
            .ok_or(OrchestrationError::SessionClosed)
    }

    pub(crate) fn native_mut(&mut self) -> Result<&mut (dyn NativeSession + 'static)> {
        if self.milestones.closed.is_some() {
            return Err(OrchestrationError::SessionClosed);
        }
        self.native
            .as_deref_mut()
            .ok_or(OrchestrationError::SessionClosed)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.native().map(|_| ())
    }

    /// Drop the native handle and record how the session closed
    pub(crate) fn close(&mut self, closure: Closure) {
        let handle = self.native.take();
        self.milestones.closed = Some(closure);
        drop(handle);
    }
}

// =============================================================================
// Session
// =============================================================================

/// Orchestrates one snapshot set (or one restore) against a provider
pub struct SnapshotSetSession {
    id: u64,
    core: Arc<Mutex<SessionCore>>,
    gate: CapabilityGate,
    default_timeout: Option<Duration>,
}

impl SnapshotSetSession {
    /// Wrap a freshly created native session
    pub fn new(native: Box<dyn NativeSession>, gate: CapabilityGate) -> Self {
        let id = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        debug!(target: "shadowset::session", session = id, level = %gate.level(), "Session created");
        Self {
            id,
            core: Arc::new(Mutex::new(SessionCore::new(native))),
            gate,
            default_timeout: None,
        }
    }

    /// Default timeout applied by [`AsyncOperation::wait_default`]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Process-unique session number (diagnostics only)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.core.lock().milestones.phase()
    }

    /// Current snapshot context
    pub fn context(&self) -> SnapshotContext {
        self.core.lock().milestones.context
    }

    /// Identity of the started snapshot set, if any
    pub fn snapshot_set_id(&self) -> Option<SnapshotSetId> {
        self.core.lock().milestones.snapshot_set
    }

    /// Snapshots added to the set, in order
    pub fn snapshot_ids(&self) -> Vec<SnapshotId> {
        self.core.lock().milestones.snapshots.clone()
    }

    /// Check whether the native handle has been released
    pub fn is_closed(&self) -> bool {
        let core = self.core.lock();
        core.milestones.closed.is_some() || core.native.is_none()
    }

    /// Capability level the session gates against
    pub fn platform_level(&self) -> PlatformLevel {
        self.gate.level()
    }

    // =========================================================================
    // Collection views
    // =========================================================================

    /// Writer metadata (available after gathering writer metadata)
    pub fn writer_metadata(&self) -> WriterMetadataList {
        WriterMetadataList::new(Arc::downgrade(&self.core))
    }

    /// Writer components recorded in the backup document
    pub fn writer_components(&self) -> WriterComponentsList {
        WriterComponentsList::new(Arc::downgrade(&self.core))
    }

    /// Writer status (available after gathering writer status)
    pub fn writer_status(&self) -> WriterStatusList {
        WriterStatusList::new(Arc::downgrade(&self.core))
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize for backup, optionally from a saved backup document
    ///
    /// # Errors
    ///
    /// - `SessionClosed` if released
    /// - `InvalidSequence` if already initialized
    pub fn initialize_for_backup(&mut self, document: Option<&str>) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_uninitialized("initialize for backup")?;

        check_result(core.native_mut()?.initialize_for_backup(document))?;
        core.milestones.mode = Some(Mode::Backup);
        core.milestones.document_loaded = document.is_some();
        debug!(target: "shadowset::session", session = self.id, from_document = document.is_some(), "Initialized for backup");
        Ok(())
    }

    /// Initialize for restore from a saved backup document
    ///
    /// # Errors
    ///
    /// - `SessionClosed` if released
    /// - `InvalidArgument` if the document is empty
    /// - `InvalidSequence` if already initialized
    /// - `InvalidXmlDocument` if the provider cannot load the document
    pub fn initialize_for_restore(&mut self, document: &str) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        if document.trim().is_empty() {
            return Err(OrchestrationError::invalid_argument(
                "backup document must not be empty",
            ));
        }
        core.milestones.require_uninitialized("initialize for restore")?;

        check_result(core.native_mut()?.initialize_for_restore(document))?;
        core.milestones.mode = Some(Mode::Restore);
        core.milestones.document_loaded = true;
        debug!(target: "shadowset::session", session = self.id, "Initialized for restore");
        Ok(())
    }

    /// Set the snapshot context
    ///
    /// Contexts other than `BACKUP` need `Server2003`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` for a non-backup context below `Server2003`
    /// - `InvalidArgument` for the `ALL` query filter
    /// - `InvalidSequence` unless initialized for backup, with no snapshot
    ///   set started and prepare not started
    pub fn set_context(&mut self, context: SnapshotContext) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        if context != SnapshotContext::BACKUP {
            self.gate.require("set context", PlatformLevel::Server2003)?;
        }
        if context == SnapshotContext::ALL {
            return Err(OrchestrationError::invalid_argument(
                "the ALL context is a query filter, not a creation context",
            ));
        }
        let m = &core.milestones;
        m.require_mode("set context", Mode::Backup)?;
        if m.snapshot_set.is_some() {
            return Err(OrchestrationError::invalid_sequence(
                "set context",
                "a snapshot set was already started",
            ));
        }
        m.require_not_started("set context", Step::Prepare)?;

        check_result(core.native_mut()?.set_context(context.bits()))?;
        core.milestones.context = context;
        debug!(target: "shadowset::session", session = self.id, %context, "Context set");
        Ok(())
    }

    // =========================================================================
    // Backup flow
    // =========================================================================

    /// Ask writers for their metadata
    ///
    /// At most once per session: a failed or cancelled gather is not retried.
    ///
    /// # Errors
    ///
    /// `InvalidSequence` if not initialized, if metadata was already
    /// requested, or if prepare for backup has started.
    pub fn gather_writer_metadata(&mut self) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        let m = &core.milestones;
        let mode = m.require_initialized("gather writer metadata")?;
        if m.metadata.is_started() {
            return Err(OrchestrationError::invalid_sequence(
                "gather writer metadata",
                "writer metadata was already requested",
            ));
        }
        if mode == Mode::Backup {
            m.require_not_started("gather writer metadata", Step::Prepare)?;
        }

        self.launch(
            &mut core,
            OperationKind::GatherWriterMetadata,
            Some(Step::Metadata),
            |native| native.gather_writer_metadata(),
        )
    }

    /// Ask writers for their current status
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless writer metadata was gathered successfully.
    pub fn gather_writer_status(&mut self) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_initialized("gather writer status")?;
        core.milestones
            .require_succeeded("gather writer status", Step::Metadata)?;

        self.launch(
            &mut core,
            OperationKind::GatherWriterStatus,
            Some(Step::WriterStatus),
            |native| native.gather_writer_status(),
        )
    }

    /// Release provider-side writer metadata
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless writer metadata was gathered successfully.
    pub fn free_writer_metadata(&mut self) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones
            .require_succeeded("free writer metadata", Step::Metadata)?;
        check_result(core.native_mut()?.free_writer_metadata())
    }

    /// Release provider-side writer status
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless writer status was gathered successfully.
    pub fn free_writer_status(&mut self) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones
            .require_succeeded("free writer status", Step::WriterStatus)?;
        check_result(core.native_mut()?.free_writer_status())?;
        core.milestones.writer_status = milestones::Stage::NotStarted;
        Ok(())
    }

    /// Declare the backup state
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized for backup with prepare not started.
    pub fn set_backup_state(&mut self, state: BackupState) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("set backup state", Mode::Backup)?;
        core.milestones
            .require_not_started("set backup state", Step::Prepare)?;

        check_result(core.native_mut()?.set_backup_state(&state))?;
        core.milestones.backup_state = Some(state);
        debug!(target: "shadowset::session", session = self.id, backup_type = ?state.backup_type, "Backup state set");
        Ok(())
    }

    /// Allocate the snapshot set identity
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless initialized for backup with no set started.
    pub fn start_snapshot_set(&mut self) -> Result<SnapshotSetId> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("start snapshot set", Mode::Backup)?;
        if core.milestones.snapshot_set.is_some() {
            return Err(OrchestrationError::invalid_sequence(
                "start snapshot set",
                "a snapshot set was already started",
            ));
        }

        let raw = check_value(core.native_mut()?.start_snapshot_set())?;
        let set_id = SnapshotSetId::from_native(raw);
        core.milestones.snapshot_set = Some(set_id);
        info!(target: "shadowset::session", session = self.id, snapshot_set = %set_id, "Snapshot set started");
        Ok(set_id)
    }

    /// Add a volume to the snapshot set
    ///
    /// `ProviderId::NULL` lets the system choose the provider.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty volume name
    /// - `InvalidSequence` unless a set is started and creation has not started
    /// - `VolumeNotSupported` (carrying the volume) if the provider rejects it
    pub fn add_to_snapshot_set(&mut self, volume: &str, provider: ProviderId) -> Result<SnapshotId> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        if volume.is_empty() {
            return Err(OrchestrationError::invalid_argument(
                "volume name must not be empty",
            ));
        }
        core.milestones.require_snapshot_set("add to snapshot set")?;
        core.milestones
            .require_not_started("add to snapshot set", Step::Create)?;

        let raw = core
            .native_mut()?
            .add_to_snapshot_set(volume, provider.to_native())
            .map_err(|code| shadowset_core::map_failure(code).with_volume(volume))?;
        let snapshot_id = SnapshotId::from_native(raw);
        core.milestones.snapshots.push(snapshot_id);
        debug!(target: "shadowset::session", session = self.id, volume, snapshot = %snapshot_id, "Volume added to snapshot set");
        Ok(snapshot_id)
    }

    /// Notify writers to prepare for backup
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless the backup state is declared, writer metadata
    /// was gathered (not needed when the context excludes writers) and
    /// prepare has not started.
    pub fn prepare_for_backup(&mut self) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        let m = &core.milestones;
        m.require_mode("prepare for backup", Mode::Backup)?;
        if m.backup_state.is_none() {
            return Err(OrchestrationError::invalid_sequence(
                "prepare for backup",
                "backup state has not been declared",
            ));
        }
        if !m.context.has(VolumeSnapshotAttributes::NO_WRITERS) {
            m.require_succeeded("prepare for backup", Step::Metadata)?;
        }
        m.require_not_started("prepare for backup", Step::Prepare)?;

        self.launch(
            &mut core,
            OperationKind::PrepareForBackup,
            Some(Step::Prepare),
            |native| native.prepare_for_backup(),
        )
    }

    /// Create every snapshot of the set
    ///
    /// Never retried: after a failure the session stays in
    /// `CreatingSnapshots` and further lifecycle calls are rejected.
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless a set with at least one volume is started,
    /// prepare succeeded and creation has not started.
    pub fn do_snapshot_set(&mut self) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        let m = &core.milestones;
        m.require_snapshot_set("do snapshot set")?;
        if m.snapshots.is_empty() {
            return Err(OrchestrationError::invalid_sequence(
                "do snapshot set",
                "the snapshot set has no volumes",
            ));
        }
        m.require_succeeded("do snapshot set", Step::Prepare)?;
        m.require_not_started("do snapshot set", Step::Create)?;

        let volumes = m.snapshots.len();
        let op = self.launch(
            &mut core,
            OperationKind::DoSnapshotSet,
            Some(Step::Create),
            |native| native.do_snapshot_set(),
        )?;
        info!(target: "shadowset::session", session = self.id, volumes, "Snapshot set creation started");
        Ok(op)
    }

    /// Notify writers that the backup is complete
    ///
    /// # Errors
    ///
    /// `InvalidSequence` unless snapshots were created and completion has
    /// not started.
    pub fn backup_complete(&mut self) -> Result<AsyncOperation> {
        let mut core = self.core.lock();
        core.ensure_open()?;
        core.milestones.require_mode("backup complete", Mode::Backup)?;
        core.milestones
            .require_succeeded("backup complete", Step::Create)?;
        core.milestones
            .require_not_started("backup complete", Step::Complete)?;

        self.launch(
            &mut core,
            OperationKind::BackupComplete,
            Some(Step::Complete),
            |native| native.backup_complete(),
        )
    }

    /// Serialize the backup document
    ///
    /// # Errors
    ///
    /// `InvalidSequence` in backup mode before snapshots are created, or
    /// before initialization.
    pub fn save_as_xml(&self) -> Result<String> {
        let core = self.core.lock();
        core.ensure_open()?;
        let mode = core.milestones.require_initialized("save as xml")?;
        if mode == Mode::Backup {
            core.milestones.require_succeeded("save as xml", Step::Create)?;
        }
        check_value(core.native()?.save_as_xml())
    }

    // =========================================================================
    // Termination
    // =========================================================================

    /// Abort the backup and release the native handle
    ///
    /// Safe in any phase. On an already closed session this is a no-op.
    ///
    /// # Errors
    ///
    /// The mapped provider error if the native abort fails. The session is
    /// `Aborted` and its handle released either way.
    pub fn abort_backup(&mut self) -> Result<()> {
        let mut core = self.core.lock();
        let native = match core.native_mut() {
            Ok(native) => native,
            Err(_) => return Ok(()),
        };
        let code = native.abort_backup();
        let phase = core.milestones.phase();
        core.close(Closure::Aborted);
        warn!(target: "shadowset::session", session = self.id, %phase, "Backup aborted");
        check_result(code)
    }

    /// Release the native handle
    ///
    /// Idempotent. Moves the session to `Disposed`, including after an abort.
    pub fn release(&mut self) {
        let mut core = self.core.lock();
        if core.milestones.closed == Some(Closure::Disposed) {
            return;
        }
        core.close(Closure::Disposed);
        debug!(target: "shadowset::session", session = self.id, "Session released");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Start a native async operation and wrap it
    ///
    /// The step (if any) is marked in flight only once the provider accepted
    /// the call; its terminal status is recorded by the completion hook.
    fn launch<F>(
        &self,
        core: &mut SessionCore,
        kind: OperationKind,
        step: Option<Step>,
        start: F,
    ) -> Result<AsyncOperation>
    where
        F: FnOnce(&mut dyn NativeSession) -> NativeResult<Box<dyn NativeAsync>>,
    {
        let handle = check_value(start(core.native_mut()?))?;
        let mut op = AsyncOperation::new(kind, handle).with_default_timeout(self.default_timeout);
        if let Some(step) = step {
            *core.milestones.stage_mut(step) = milestones::Stage::InFlight;
            let weak = Arc::downgrade(&self.core);
            let session = self.id;
            op = op.with_completion(Box::new(move |status| {
                if let Some(core) = weak.upgrade() {
                    let mut core = core.lock();
                    core.milestones.finish(step, status);
                    debug!(target: "shadowset::session", session, ?step, ?status, phase = %core.milestones.phase(), "Async step finished");
                }
            }));
        }
        debug!(target: "shadowset::session", session = self.id, %kind, "Async operation started");
        Ok(op)
    }
}

impl Drop for SnapshotSetSession {
    fn drop(&mut self) {
        let mut core = self.core.lock();
        if core.milestones.closed.is_none() {
            core.close(Closure::Disposed);
            debug!(target: "shadowset::session", session = self.id, "Session dropped");
        }
    }
}

impl fmt::Debug for SnapshotSetSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotSetSession")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("level", &self.gate.level())
            .finish()
    }
}
