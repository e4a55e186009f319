//! Native session of the in-memory provider

use super::document::{DocSnapshot, DocWriter, Document};
use super::state::{MemoryState, MemoryWriter, Shared, StoredSnapshot};
use super::FailPoint;
use crate::provider::{
    NativeAsync, NativeComponentRef, NativeDeleteOutcome, NativeProviderProperties, NativeSession,
    NativeSnapshotProperties, NativeWriterComponents, NativeWriterMetadata, NativeWriterStatus,
};
use chrono::Utc;
use parking_lot::Mutex;
use shadowset_core::codec::codes;
use shadowset_core::{
    datetime_to_filetime, to_guid, to_native_id, BackupState, FileRestoreStatus, LocationMapping,
    NativeId, NativeResult, ObjectType, RestoreType, SnapshotState, StatusCode,
    VolumeSnapshotAttributes, WriterComponent,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Most volumes a single snapshot set may hold
const MAX_VOLUMES_PER_SET: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalMode {
    Backup,
    Restore,
}

#[derive(Debug, Clone)]
struct PendingSnapshot {
    id: NativeId,
    volume: String,
    provider: NativeId,
}

/// Per-session provider state, reachable from async jobs
#[derive(Default)]
struct LocalState {
    mode: Option<LocalMode>,
    context: u32,
    backup_state: Option<BackupState>,
    restore_type: RestoreType,
    disabled_classes: Vec<NativeId>,
    enabled_classes: Option<Vec<NativeId>>,
    disabled_instances: Vec<NativeId>,
    metadata: Option<Vec<NativeWriterMetadata>>,
    status: Option<Vec<NativeWriterStatus>>,
    /// Writers with selected components (backup) or loaded from the document (restore)
    selections: Vec<DocWriter>,
    document: Option<Document>,
    snapshot_set: Option<NativeId>,
    pending: Vec<PendingSnapshot>,
    created: bool,
    completed: bool,
}

impl LocalState {
    fn writer_enabled(&self, writer: &MemoryWriter) -> bool {
        let class = writer.writer_id.to_native();
        let instance = writer.instance_id.to_native();
        if self.disabled_classes.contains(&class) || self.disabled_instances.contains(&instance) {
            return false;
        }
        self.enabled_classes
            .as_ref()
            .map(|enabled| enabled.contains(&class))
            .unwrap_or(true)
    }

    fn selected_component(
        &mut self,
        instance: Option<NativeId>,
        component: &NativeComponentRef,
    ) -> Option<&mut WriterComponent> {
        self.selections
            .iter_mut()
            .filter(|w| w.writer_id == component.writer_id)
            .filter(|w| instance.map(|i| w.instance_id == i).unwrap_or(true))
            .flat_map(|w| w.components.iter_mut())
            .find(|c| component.matches(c))
    }
}

/// Native session handed out by [`super::MemoryProvider`]
pub(crate) struct MemorySession {
    session_id: u64,
    shared: Arc<Shared>,
    local: Arc<Mutex<LocalState>>,
}

impl MemorySession {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let session_id = shared.next_session.fetch_add(1, Ordering::SeqCst);
        shared.live_sessions.fetch_add(1, Ordering::SeqCst);
        Self {
            session_id,
            shared,
            local: Arc::new(Mutex::new(LocalState::default())),
        }
    }

    fn fail(&self, point: FailPoint) -> StatusCode {
        self.shared.call_failure(point).unwrap_or(StatusCode::OK)
    }

    fn check(&self, point: FailPoint) -> NativeResult<()> {
        match self.shared.call_failure(point) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    /// Run `point`'s call check, then hand `work` to an async cell
    ///
    /// `work` sees the session state and the provider state, in that lock order.
    fn spawn<F>(&self, point: FailPoint, work: F) -> NativeResult<Box<dyn NativeAsync>>
    where
        F: FnOnce(&mut LocalState, &mut MemoryState) -> StatusCode + Send + 'static,
    {
        self.check(point)?;
        let shared = Arc::clone(&self.shared);
        let local = Arc::clone(&self.local);
        Ok(self.shared.spawn(Box::new(move || {
            if let Some(code) = shared.completion_failure(point) {
                return code;
            }
            let mut local = local.lock();
            let mut state = shared.state.lock();
            work(&mut local, &mut state)
        })))
    }

    fn with_component<F>(
        &mut self,
        point: FailPoint,
        instance: Option<NativeId>,
        component: &NativeComponentRef,
        update: F,
    ) -> StatusCode
    where
        F: FnOnce(&mut WriterComponent),
    {
        let code = self.fail(point);
        if code.is_failure() {
            return code;
        }
        let mut local = self.local.lock();
        match local.selected_component(instance, component) {
            Some(found) => {
                update(found);
                StatusCode::OK
            }
            None => StatusCode(codes::OBJECT_NOT_FOUND),
        }
    }

    fn document(&self) -> Document {
        let local = self.local.lock();
        let state = self.shared.state.lock();
        let snapshots = if local.created {
            local
                .pending
                .iter()
                .filter_map(|p| state.snapshots.get(&p.id))
                .map(|s| DocSnapshot {
                    id: s.props.snapshot_id,
                    volume: s.props.original_volume_name.clone(),
                    device: s.props.snapshot_device_object.clone(),
                    attributes: s.props.attributes,
                })
                .collect()
        } else {
            local
                .document
                .as_ref()
                .map(|d| d.snapshots.clone())
                .unwrap_or_default()
        };
        Document {
            context: local.context,
            backup_state: local.backup_state,
            snapshot_set: local
                .snapshot_set
                .or_else(|| local.document.as_ref().and_then(|d| d.snapshot_set)),
            snapshots,
            writers: local.selections.clone(),
        }
    }
}

fn new_id() -> NativeId {
    to_native_id(Uuid::new_v4())
}

fn metadata_of(writer: &MemoryWriter) -> NativeWriterMetadata {
    NativeWriterMetadata {
        instance_id: writer.instance_id.to_native(),
        writer_id: writer.writer_id.to_native(),
        name: writer.name.clone(),
        usage_type: writer.usage_type.as_raw(),
        restore_method: writer.restore_method.as_raw(),
        components: writer.components.clone(),
    }
}

fn status_of(writer: &MemoryWriter) -> NativeWriterStatus {
    NativeWriterStatus {
        instance_id: writer.instance_id.to_native(),
        writer_id: writer.writer_id.to_native(),
        name: writer.name.clone(),
        state: writer.state.as_raw(),
        failure: writer.failure.to_status(),
    }
}

impl NativeSession for MemorySession {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn initialize_for_backup(&mut self, document: Option<&str>) -> StatusCode {
        let code = self.fail(FailPoint::InitializeForBackup);
        if code.is_failure() {
            return code;
        }
        let mut local = self.local.lock();
        if local.mode.is_some() {
            return StatusCode(codes::BAD_STATE);
        }
        if let Some(text) = document {
            match Document::parse(text) {
                Ok(doc) => {
                    local.context = doc.context;
                    local.document = Some(doc);
                }
                Err(code) => return code,
            }
        }
        local.mode = Some(LocalMode::Backup);
        StatusCode::OK
    }

    fn initialize_for_restore(&mut self, document: &str) -> StatusCode {
        let code = self.fail(FailPoint::InitializeForRestore);
        if code.is_failure() {
            return code;
        }
        let mut local = self.local.lock();
        if local.mode.is_some() {
            return StatusCode(codes::BAD_STATE);
        }
        match Document::parse(document) {
            Ok(doc) => {
                local.context = doc.context;
                local.backup_state = doc.backup_state;
                local.selections = doc.writers.clone();
                local.document = Some(doc);
                local.mode = Some(LocalMode::Restore);
                StatusCode::OK
            }
            Err(code) => code,
        }
    }

    fn set_context(&mut self, context: u32) -> StatusCode {
        let code = self.fail(FailPoint::SetContext);
        if code.is_success() {
            self.local.lock().context = context;
        }
        code
    }

    fn set_backup_state(&mut self, state: &BackupState) -> StatusCode {
        let code = self.fail(FailPoint::SetBackupState);
        if code.is_success() {
            self.local.lock().backup_state = Some(*state);
        }
        code
    }

    fn abort_backup(&mut self) -> StatusCode {
        let code = self.fail(FailPoint::AbortBackup);
        let local = self.local.lock();
        if !local.completed {
            let mut state = self.shared.state.lock();
            let mut removed = 0;
            for pending in &local.pending {
                if state.snapshots.remove(&pending.id).is_some() {
                    removed += 1;
                }
            }
            debug!(target: "shadowset::memory", session = self.session_id, removed, "Backup aborted");
        }
        code
    }

    // =========================================================================
    // Writers
    // =========================================================================

    fn gather_writer_metadata(&mut self) -> NativeResult<Box<dyn NativeAsync>> {
        if self.local.lock().mode.is_none() {
            return Err(StatusCode(codes::BAD_STATE));
        }
        self.spawn(FailPoint::GatherWriterMetadata, |local, state| {
            let metadata = state
                .writers
                .iter()
                .filter(|w| local.writer_enabled(w))
                .map(metadata_of)
                .collect();
            local.metadata = Some(metadata);
            StatusCode::OK
        })
    }

    fn gather_writer_status(&mut self) -> NativeResult<Box<dyn NativeAsync>> {
        if self.local.lock().metadata.is_none() {
            return Err(StatusCode(codes::BAD_STATE));
        }
        self.spawn(FailPoint::GatherWriterStatus, |local, state| {
            let status = state
                .writers
                .iter()
                .filter(|w| local.writer_enabled(w))
                .map(status_of)
                .collect();
            local.status = Some(status);
            StatusCode::OK
        })
    }

    fn free_writer_metadata(&mut self) -> StatusCode {
        self.local.lock().metadata = None;
        StatusCode::OK
    }

    fn free_writer_status(&mut self) -> StatusCode {
        self.local.lock().status = None;
        StatusCode::OK
    }

    fn writer_metadata_count(&self) -> NativeResult<usize> {
        self.check(FailPoint::ListWriters)?;
        let local = self.local.lock();
        local
            .metadata
            .as_ref()
            .map(Vec::len)
            .ok_or(StatusCode(codes::BAD_STATE))
    }

    fn writer_metadata(&self, index: usize) -> NativeResult<NativeWriterMetadata> {
        self.check(FailPoint::ListWriters)?;
        let local = self.local.lock();
        let metadata = local.metadata.as_ref().ok_or(StatusCode(codes::BAD_STATE))?;
        metadata
            .get(index)
            .cloned()
            .ok_or(StatusCode(codes::OBJECT_NOT_FOUND))
    }

    fn writer_components_count(&self) -> NativeResult<usize> {
        self.check(FailPoint::ListWriters)?;
        let local = self.local.lock();
        if local.mode.is_none() {
            return Err(StatusCode(codes::BAD_STATE));
        }
        Ok(local.selections.len())
    }

    fn writer_components(&self, index: usize) -> NativeResult<NativeWriterComponents> {
        self.check(FailPoint::ListWriters)?;
        let local = self.local.lock();
        local
            .selections
            .get(index)
            .map(|w| NativeWriterComponents {
                instance_id: w.instance_id,
                writer_id: w.writer_id,
                components: w.components.clone(),
            })
            .ok_or(StatusCode(codes::OBJECT_NOT_FOUND))
    }

    fn writer_status_count(&self) -> NativeResult<usize> {
        self.check(FailPoint::ListWriters)?;
        let local = self.local.lock();
        local
            .status
            .as_ref()
            .map(Vec::len)
            .ok_or(StatusCode(codes::BAD_STATE))
    }

    fn writer_status(&self, index: usize) -> NativeResult<NativeWriterStatus> {
        self.check(FailPoint::ListWriters)?;
        let local = self.local.lock();
        let status = local.status.as_ref().ok_or(StatusCode(codes::BAD_STATE))?;
        status
            .get(index)
            .cloned()
            .ok_or(StatusCode(codes::OBJECT_NOT_FOUND))
    }

    fn disable_writer_classes(&mut self, writer_ids: &[NativeId]) -> StatusCode {
        self.local
            .lock()
            .disabled_classes
            .extend_from_slice(writer_ids);
        StatusCode::OK
    }

    fn enable_writer_classes(&mut self, writer_ids: &[NativeId]) -> StatusCode {
        self.local
            .lock()
            .enabled_classes
            .get_or_insert_with(Vec::new)
            .extend_from_slice(writer_ids);
        StatusCode::OK
    }

    fn disable_writer_instances(&mut self, instance_ids: &[NativeId]) -> StatusCode {
        self.local
            .lock()
            .disabled_instances
            .extend_from_slice(instance_ids);
        StatusCode::OK
    }

    // =========================================================================
    // Snapshot set
    // =========================================================================

    fn start_snapshot_set(&mut self) -> NativeResult<NativeId> {
        self.check(FailPoint::StartSnapshotSet)?;
        let mut local = self.local.lock();
        if local.mode != Some(LocalMode::Backup) {
            return Err(StatusCode(codes::BAD_STATE));
        }
        if local.snapshot_set.is_some() {
            return Err(StatusCode(codes::SNAPSHOT_SET_IN_PROGRESS));
        }
        let id = new_id();
        local.snapshot_set = Some(id);
        Ok(id)
    }

    fn add_to_snapshot_set(&mut self, volume: &str, provider: NativeId) -> NativeResult<NativeId> {
        self.check(FailPoint::AddToSnapshotSet)?;
        let mut local = self.local.lock();
        let state = self.shared.state.lock();
        if local.snapshot_set.is_none() || local.created {
            return Err(StatusCode(codes::BAD_STATE));
        }
        match state.volumes.get(volume) {
            Some(entry) if entry.supported => {}
            _ => return Err(StatusCode(codes::VOLUME_NOT_SUPPORTED)),
        }
        let provider = if provider.is_null() {
            state.default_provider()
        } else if state.is_registered(provider) {
            provider
        } else {
            return Err(StatusCode(codes::PROVIDER_NOT_REGISTERED));
        };
        if local.pending.iter().any(|p| p.volume == volume) {
            return Err(StatusCode(codes::OBJECT_ALREADY_EXISTS));
        }
        if local.pending.len() >= MAX_VOLUMES_PER_SET {
            return Err(StatusCode(codes::MAXIMUM_NUMBER_OF_VOLUMES_REACHED));
        }
        let id = new_id();
        local.pending.push(PendingSnapshot {
            id,
            volume: volume.to_string(),
            provider,
        });
        Ok(id)
    }

    fn is_volume_supported(&self, provider: NativeId, volume: &str) -> NativeResult<bool> {
        self.check(FailPoint::IsVolumeSupported)?;
        let state = self.shared.state.lock();
        if !provider.is_null() && !state.is_registered(provider) {
            return Err(StatusCode(codes::PROVIDER_NOT_REGISTERED));
        }
        Ok(state
            .volumes
            .get(volume)
            .map(|entry| entry.supported)
            .unwrap_or(false))
    }

    fn prepare_for_backup(&mut self) -> NativeResult<Box<dyn NativeAsync>> {
        self.spawn(FailPoint::PrepareForBackup, |_, _| StatusCode::OK)
    }

    fn do_snapshot_set(&mut self) -> NativeResult<Box<dyn NativeAsync>> {
        let session = self.session_id;
        self.spawn(FailPoint::DoSnapshotSet, move |local, state| {
            let Some(set) = local.snapshot_set else {
                return StatusCode(codes::BAD_STATE);
            };
            let attributes = VolumeSnapshotAttributes::from_bits(local.context);
            let owner = if attributes.contains(VolumeSnapshotAttributes::NO_AUTO_RELEASE) {
                None
            } else {
                Some(session)
            };
            let created_at = datetime_to_filetime(Utc::now());
            let count = local.pending.len() as u32;
            for pending in &local.pending {
                let device = state.next_device_object();
                let props = NativeSnapshotProperties {
                    snapshot_id: pending.id,
                    snapshot_set_id: set,
                    snapshots_count: count,
                    snapshot_device_object: device,
                    original_volume_name: pending.volume.clone(),
                    originating_machine: state.machine.clone(),
                    service_machine: state.machine.clone(),
                    exposed_name: None,
                    exposed_path: None,
                    provider_id: pending.provider,
                    attributes: attributes.bits(),
                    creation_timestamp: created_at,
                    state: SnapshotState::Created.as_raw(),
                };
                state.snapshots.insert(pending.id, StoredSnapshot { props, owner });
            }
            local.created = true;
            info!(target: "shadowset::memory", session, snapshot_set = %to_guid(set), count, "Snapshots created");
            StatusCode::OK
        })
    }

    fn backup_complete(&mut self) -> NativeResult<Box<dyn NativeAsync>> {
        self.spawn(FailPoint::BackupComplete, |local, _| {
            local.completed = true;
            StatusCode::OK
        })
    }

    fn save_as_xml(&self) -> NativeResult<String> {
        self.check(FailPoint::SaveAsXml)?;
        Ok(self.document().render())
    }

    // =========================================================================
    // Components
    // =========================================================================

    fn add_component(&mut self, instance: NativeId, component: &NativeComponentRef) -> StatusCode {
        let code = self.fail(FailPoint::AddComponent);
        if code.is_failure() {
            return code;
        }
        let mut local = self.local.lock();
        let Some(metadata) = local.metadata.as_ref() else {
            return StatusCode(codes::BAD_STATE);
        };
        let Some(writer) = metadata
            .iter()
            .find(|w| w.instance_id == instance && w.writer_id == component.writer_id)
        else {
            return StatusCode(codes::OBJECT_NOT_FOUND);
        };
        let Some(declared) = writer.components.iter().find(|c| component.matches(c)) else {
            return StatusCode(codes::OBJECT_NOT_FOUND);
        };
        let mut selected = declared.clone();
        selected.selected = true;
        let name = writer.name.clone();

        if local.selected_component(Some(instance), component).is_some() {
            return StatusCode(codes::OBJECT_ALREADY_EXISTS);
        }
        match local
            .selections
            .iter()
            .position(|w| w.instance_id == instance && w.writer_id == component.writer_id)
        {
            Some(at) => local.selections[at].components.push(selected),
            None => local.selections.push(DocWriter {
                instance_id: instance,
                writer_id: component.writer_id,
                name,
                components: vec![selected],
            }),
        }
        StatusCode::OK
    }

    fn set_backup_succeeded(
        &mut self,
        instance: NativeId,
        component: &NativeComponentRef,
        succeeded: bool,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, Some(instance), component, |c| {
            c.backup_succeeded = Some(succeeded)
        })
    }

    fn set_backup_options(&mut self, component: &NativeComponentRef, options: &str) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            c.backup_options = Some(options.to_string())
        })
    }

    fn set_previous_backup_stamp(
        &mut self,
        component: &NativeComponentRef,
        stamp: &str,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            c.previous_backup_stamp = Some(stamp.to_string())
        })
    }

    // =========================================================================
    // Restore
    // =========================================================================

    fn set_selected_for_restore(
        &mut self,
        component: &NativeComponentRef,
        selected: bool,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            c.selected_for_restore = selected
        })
    }

    fn set_restore_options(&mut self, component: &NativeComponentRef, options: &str) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            c.restore_options = Some(options.to_string())
        })
    }

    fn set_additional_restores(
        &mut self,
        component: &NativeComponentRef,
        additional: bool,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            c.additional_restores = additional
        })
    }

    fn set_file_restore_status(
        &mut self,
        instance: NativeId,
        component: &NativeComponentRef,
        status: FileRestoreStatus,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, Some(instance), component, |c| {
            c.file_restore_status = status
        })
    }

    fn add_restore_subcomponent(
        &mut self,
        component: &NativeComponentRef,
        sub_path: &str,
        sub_name: &str,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            c.restore_subcomponents
                .push((sub_path.to_string(), sub_name.to_string()))
        })
    }

    fn add_alternative_location_mapping(
        &mut self,
        component: &NativeComponentRef,
        mapping: &LocationMapping,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            c.alternative_locations.push(mapping.clone())
        })
    }

    fn add_new_target(
        &mut self,
        component: &NativeComponentRef,
        target: &LocationMapping,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            c.new_targets.push(target.clone())
        })
    }

    fn set_ranges_file_path(
        &mut self,
        component: &NativeComponentRef,
        partial_file_index: u32,
        ranges_file: &str,
    ) -> StatusCode {
        self.with_component(FailPoint::AnnotateComponent, None, component, |c| {
            match c.ranges_files.iter_mut().find(|(i, _)| *i == partial_file_index) {
                Some(entry) => entry.1 = ranges_file.to_string(),
                None => c.ranges_files.push((partial_file_index, ranges_file.to_string())),
            }
        })
    }

    fn set_restore_state(&mut self, restore_type: RestoreType) -> StatusCode {
        let code = self.fail(FailPoint::SetRestoreState);
        if code.is_success() {
            self.local.lock().restore_type = restore_type;
        }
        code
    }

    fn pre_restore(&mut self) -> NativeResult<Box<dyn NativeAsync>> {
        self.spawn(FailPoint::PreRestore, |_, _| StatusCode::OK)
    }

    fn post_restore(&mut self) -> NativeResult<Box<dyn NativeAsync>> {
        self.spawn(FailPoint::PostRestore, |local, _| {
            debug!(target: "shadowset::memory", restore_type = ?local.restore_type, "Restore finished");
            StatusCode::OK
        })
    }

    // =========================================================================
    // Snapshot management
    // =========================================================================

    fn delete_snapshots(
        &mut self,
        id: NativeId,
        object_type: ObjectType,
        force: bool,
    ) -> NativeDeleteOutcome {
        let outcome = |deleted, non_deleted, status| NativeDeleteOutcome {
            deleted,
            non_deleted,
            status,
        };
        if let Some(code) = self.shared.call_failure(FailPoint::DeleteSnapshots) {
            return outcome(0, id, code);
        }
        let mut state = self.shared.state.lock();
        match object_type {
            ObjectType::Snapshot => {
                let code = state.delete_one(id, force);
                if code.is_success() {
                    outcome(1, NativeId::NULL, StatusCode::OK)
                } else {
                    outcome(0, id, code)
                }
            }
            ObjectType::SnapshotSet => {
                let members = state.set_members(id);
                if members.is_empty() {
                    return outcome(0, id, StatusCode(codes::OBJECT_NOT_FOUND));
                }
                let mut deleted = 0;
                let mut first_failure = None;
                for member in members {
                    let code = state.delete_one(member, force);
                    if code.is_success() {
                        deleted += 1;
                    } else if first_failure.is_none() {
                        first_failure = Some((member, code));
                    }
                }
                match first_failure {
                    Some((member, code)) => outcome(deleted, member, code),
                    None => outcome(deleted, NativeId::NULL, StatusCode::OK),
                }
            }
            _ => outcome(0, id, StatusCode(codes::INVALID_ARG)),
        }
    }

    fn get_snapshot_properties(&self, id: NativeId) -> NativeResult<NativeSnapshotProperties> {
        self.check(FailPoint::QuerySnapshots)?;
        let state = self.shared.state.lock();
        state
            .snapshots
            .get(&id)
            .map(|s| s.props.clone())
            .ok_or(StatusCode(codes::OBJECT_NOT_FOUND))
    }

    fn query_snapshots(&self) -> NativeResult<Vec<NativeSnapshotProperties>> {
        self.check(FailPoint::QuerySnapshots)?;
        let state = self.shared.state.lock();
        Ok(state.snapshots.values().map(|s| s.props.clone()).collect())
    }

    fn query_providers(&self) -> NativeResult<Vec<NativeProviderProperties>> {
        self.check(FailPoint::QueryProviders)?;
        Ok(self.shared.state.lock().providers.clone())
    }

    fn expose_snapshot(
        &mut self,
        id: NativeId,
        path_from_root: Option<&str>,
        attributes: u32,
        expose: Option<&str>,
    ) -> NativeResult<String> {
        self.check(FailPoint::ExposeSnapshot)?;
        let mut state = self.shared.state.lock();
        let taken = state.exposed_names();
        let volumes: Vec<String> = state.volumes.keys().cloned().collect();
        let snapshot = state
            .snapshots
            .get(&id)
            .ok_or(StatusCode(codes::OBJECT_NOT_FOUND))?;
        if snapshot.props.exposed_name.is_some() {
            return Err(StatusCode(codes::OBJECT_ALREADY_EXISTS));
        }
        if !snapshot.props.is_persistent() {
            return Err(StatusCode(codes::UNSUPPORTED_CONTEXT));
        }

        let requested = VolumeSnapshotAttributes::from_bits(attributes);
        let name = match expose {
            Some(name) if taken.contains(name) => {
                return Err(StatusCode(codes::OBJECT_ALREADY_EXISTS))
            }
            Some(name) => name.to_string(),
            None if requested.contains(VolumeSnapshotAttributes::EXPOSED_LOCALLY) => ('E'..='Z')
                .map(|letter| format!("{}:", letter))
                .find(|drive| {
                    !taken.contains(drive) && !volumes.iter().any(|v| v.starts_with(drive.as_str()))
                })
                .ok_or(StatusCode(codes::UNEXPECTED_PROVIDER_ERROR))?,
            None => {
                let simple = to_guid(id).simple().to_string();
                format!("shadow-{}", &simple[..8])
            }
        };

        let snapshot = state
            .snapshots
            .get_mut(&id)
            .ok_or(StatusCode(codes::OBJECT_NOT_FOUND))?;
        snapshot.props.exposed_name = Some(name.clone());
        snapshot.props.exposed_path = path_from_root.map(str::to_string);
        snapshot.props.attributes |= attributes;
        debug!(target: "shadowset::memory", snapshot = %to_guid(id), exposed = %name, "Snapshot exposed");
        Ok(name)
    }

    fn break_snapshot_set(&mut self, id: NativeId) -> StatusCode {
        let code = self.fail(FailPoint::BreakSnapshotSet);
        if code.is_failure() {
            return code;
        }
        let mut state = self.shared.state.lock();
        let members = state.set_members(id);
        if members.is_empty() {
            return StatusCode(codes::OBJECT_NOT_FOUND);
        }
        for member in members {
            state.snapshots.remove(&member);
            state.protected.remove(&member);
        }
        StatusCode::OK
    }

    fn import_snapshots(&mut self) -> NativeResult<Box<dyn NativeAsync>> {
        let has_snapshots = self
            .local
            .lock()
            .document
            .as_ref()
            .map(|d| d.snapshot_set.is_some() && !d.snapshots.is_empty())
            .unwrap_or(false);
        if !has_snapshots {
            return Err(StatusCode(codes::BAD_STATE));
        }
        self.spawn(FailPoint::ImportSnapshots, |local, state| {
            let Some(doc) = local.document.as_ref() else {
                return StatusCode(codes::BAD_STATE);
            };
            let Some(set) = doc.snapshot_set else {
                return StatusCode(codes::BAD_STATE);
            };
            if doc.snapshots.iter().any(|s| state.snapshots.contains_key(&s.id)) {
                return StatusCode(codes::OBJECT_ALREADY_EXISTS);
            }
            let provider = state.default_provider();
            let created_at = datetime_to_filetime(Utc::now());
            let count = doc.snapshots.len() as u32;
            for snapshot in &doc.snapshots {
                let device = state.next_device_object();
                let props = NativeSnapshotProperties {
                    snapshot_id: snapshot.id,
                    snapshot_set_id: set,
                    snapshots_count: count,
                    snapshot_device_object: device,
                    original_volume_name: snapshot.volume.clone(),
                    originating_machine: state.machine.clone(),
                    service_machine: state.machine.clone(),
                    exposed_name: None,
                    exposed_path: None,
                    provider_id: provider,
                    attributes: snapshot.attributes | VolumeSnapshotAttributes::IMPORTED.bits(),
                    creation_timestamp: created_at,
                    state: SnapshotState::Created.as_raw(),
                };
                state.snapshots.insert(snapshot.id, StoredSnapshot { props, owner: None });
            }
            info!(target: "shadowset::memory", snapshot_set = %to_guid(set), count, "Snapshots imported");
            StatusCode::OK
        })
    }

    fn revert_to_snapshot(&mut self, id: NativeId, force_dismount: bool) -> StatusCode {
        let code = self.fail(FailPoint::RevertToSnapshot);
        if code.is_failure() {
            return code;
        }
        let mut state = self.shared.state.lock();
        let Some(snapshot) = state.snapshots.get(&id) else {
            return StatusCode(codes::OBJECT_NOT_FOUND);
        };
        if !snapshot.props.is_persistent() {
            return StatusCode(codes::UNSUPPORTED_CONTEXT);
        }
        if state.protected.contains(&id) && !force_dismount {
            return StatusCode(codes::VOLUME_IN_USE);
        }
        let volume = snapshot.props.original_volume_name.clone();
        state.snapshots.remove(&id);
        state.protected.remove(&id);
        state.reverts.insert(volume);
        StatusCode::OK
    }

    fn query_revert_status(&mut self, volume: &str) -> NativeResult<Box<dyn NativeAsync>> {
        if !self.shared.state.lock().reverts.contains(volume) {
            return Err(StatusCode(codes::OBJECT_NOT_FOUND));
        }
        self.spawn(FailPoint::QueryRevertStatus, |_, _| StatusCode::OK)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let released = self.shared.state.lock().release_owned(self.session_id);
        self.shared.live_sessions.fetch_sub(1, Ordering::SeqCst);
        debug!(target: "shadowset::memory", session = self.session_id, released, "Native session released");
    }
}
