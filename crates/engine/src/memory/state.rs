//! Provider-wide state of the in-memory provider

use super::async_op::{AsyncCell, Job, MemoryAsync};
use super::FailPoint;
use crate::provider::{NativeAsync, NativeProviderProperties, NativeSnapshotProperties};
use parking_lot::Mutex;
use shadowset_core::codec::codes;
use shadowset_core::{
    NativeId, RestoreMethod, StatusCode, WriterComponent, WriterFailure, WriterId,
    WriterInstanceId, WriterState, WriterUsageType,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// A writer registered with the in-memory provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWriter {
    /// Writer class
    pub writer_id: WriterId,
    /// Writer instance
    pub instance_id: WriterInstanceId,
    /// Writer name
    pub name: String,
    /// Usage type reported in metadata
    pub usage_type: WriterUsageType,
    /// Restore method reported in metadata
    pub restore_method: RestoreMethod,
    /// Declared components
    pub components: Vec<WriterComponent>,
    /// State reported by writer status gathering
    pub state: WriterState,
    /// Failure reported by writer status gathering
    pub failure: WriterFailure,
}

impl MemoryWriter {
    /// A stable writer with fresh identities and no components
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            writer_id: WriterId::generate(),
            instance_id: WriterInstanceId::generate(),
            name: name.into(),
            usage_type: WriterUsageType::UserData,
            restore_method: RestoreMethod::RestoreIfCanReplace,
            components: Vec::new(),
            state: WriterState::Stable,
            failure: WriterFailure::None,
        }
    }

    /// Declare a component
    pub fn with_component(mut self, component: WriterComponent) -> Self {
        self.components.push(component);
        self
    }

    /// Report this state and failure when status is gathered
    pub fn with_status(mut self, state: WriterState, failure: WriterFailure) -> Self {
        self.state = state;
        self.failure = failure;
        self
    }

    /// Set the usage type
    pub fn with_usage(mut self, usage_type: WriterUsageType) -> Self {
        self.usage_type = usage_type;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct VolumeEntry {
    pub(crate) supported: bool,
    pub(crate) compatibility: u32,
    pub(crate) revert_blocked: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredSnapshot {
    pub(crate) props: NativeSnapshotProperties,
    /// Session that deletes the snapshot when it ends, if auto-released
    pub(crate) owner: Option<u64>,
}

pub(crate) struct MemoryState {
    pub(crate) machine: String,
    pub(crate) volumes: BTreeMap<String, VolumeEntry>,
    pub(crate) writers: Vec<MemoryWriter>,
    pub(crate) providers: Vec<NativeProviderProperties>,
    pub(crate) snapshots: BTreeMap<NativeId, StoredSnapshot>,
    pub(crate) protected: HashSet<NativeId>,
    pub(crate) reverts: HashSet<String>,
    pub(crate) call_failures: HashMap<FailPoint, StatusCode>,
    pub(crate) completion_failures: HashMap<FailPoint, StatusCode>,
    pub(crate) next_device: u32,
}

impl MemoryState {
    pub(crate) fn new(system_provider: NativeProviderProperties) -> Self {
        Self {
            machine: "memory-host".to_string(),
            volumes: BTreeMap::new(),
            writers: Vec::new(),
            providers: vec![system_provider],
            snapshots: BTreeMap::new(),
            protected: HashSet::new(),
            reverts: HashSet::new(),
            call_failures: HashMap::new(),
            completion_failures: HashMap::new(),
            next_device: 1,
        }
    }

    pub(crate) fn is_registered(&self, provider: NativeId) -> bool {
        self.providers.iter().any(|p| p.provider_id == provider)
    }

    pub(crate) fn default_provider(&self) -> NativeId {
        self.providers
            .first()
            .map(|p| p.provider_id)
            .unwrap_or(NativeId::NULL)
    }

    pub(crate) fn next_device_object(&mut self) -> String {
        let n = self.next_device;
        self.next_device += 1;
        format!("\\\\?\\GLOBALROOT\\Device\\HarddiskVolumeShadowCopy{}", n)
    }

    /// Snapshot ids of a set, in id order
    pub(crate) fn set_members(&self, set: NativeId) -> Vec<NativeId> {
        self.snapshots
            .values()
            .filter(|s| s.props.snapshot_set_id == set)
            .map(|s| s.props.snapshot_id)
            .collect()
    }

    pub(crate) fn exposed_names(&self) -> HashSet<String> {
        self.snapshots
            .values()
            .filter_map(|s| s.props.exposed_name.clone())
            .collect()
    }

    /// Delete one snapshot unless protected (and not forced)
    pub(crate) fn delete_one(&mut self, id: NativeId, force: bool) -> StatusCode {
        if !self.snapshots.contains_key(&id) {
            return StatusCode(codes::OBJECT_NOT_FOUND);
        }
        if self.protected.contains(&id) && !force {
            return StatusCode(codes::VOLUME_IN_USE);
        }
        self.snapshots.remove(&id);
        self.protected.remove(&id);
        StatusCode::OK
    }

    /// Delete every snapshot owned by an ending session
    pub(crate) fn release_owned(&mut self, session: u64) -> usize {
        let owned: Vec<NativeId> = self
            .snapshots
            .values()
            .filter(|s| s.owner == Some(session))
            .map(|s| s.props.snapshot_id)
            .collect();
        for id in &owned {
            self.snapshots.remove(id);
            self.protected.remove(id);
        }
        owned.len()
    }
}

#[derive(Default)]
pub(crate) struct HoldControl {
    pub(crate) hold_new: bool,
    pub(crate) cells: Vec<Arc<AsyncCell>>,
}

/// Everything the provider, its sessions and its async cells share
pub(crate) struct Shared {
    pub(crate) state: Mutex<MemoryState>,
    pub(crate) hold: Mutex<HoldControl>,
    pub(crate) live_sessions: AtomicUsize,
    pub(crate) live_async: AtomicUsize,
    pub(crate) async_created: AtomicUsize,
    pub(crate) async_released: AtomicUsize,
    pub(crate) next_session: AtomicU64,
}

impl Shared {
    pub(crate) fn new(state: MemoryState) -> Self {
        Self {
            state: Mutex::new(state),
            hold: Mutex::new(HoldControl::default()),
            live_sessions: AtomicUsize::new(0),
            live_async: AtomicUsize::new(0),
            async_created: AtomicUsize::new(0),
            async_released: AtomicUsize::new(0),
            next_session: AtomicU64::new(1),
        }
    }

    pub(crate) fn call_failure(&self, point: FailPoint) -> Option<StatusCode> {
        self.state.lock().call_failures.get(&point).copied()
    }

    pub(crate) fn completion_failure(&self, point: FailPoint) -> Option<StatusCode> {
        self.state.lock().completion_failures.get(&point).copied()
    }

    /// Create an async handle for `job`
    ///
    /// The job runs right away, unless the provider is holding new
    /// operations; held jobs run on release, whether or not their handle
    /// still exists.
    pub(crate) fn spawn(self: &Arc<Self>, job: Job) -> Box<dyn NativeAsync> {
        let held = self.hold.lock().hold_new;
        let cell = AsyncCell::new(job, held);
        if held {
            let mut hold = self.hold.lock();
            hold.cells.retain(|c| c.is_held());
            hold.cells.push(Arc::clone(&cell));
        }
        self.live_async.fetch_add(1, Ordering::SeqCst);
        self.async_created.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryAsync::new(cell, Arc::clone(self)))
    }

    /// Let every held operation run
    pub(crate) fn release_held(&self) {
        let cells: Vec<Arc<AsyncCell>> = {
            let mut hold = self.hold.lock();
            hold.cells.drain(..).collect()
        };
        for cell in cells {
            cell.release();
        }
    }
}
