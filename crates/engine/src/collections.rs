//! Entity collections
//!
//! Live, read-only views over provider-side writer state. A view holds a
//! non-owning reference to its session: once the session is released,
//! aborted or dropped, every access fails with `SessionClosed`.
//!
//! Nothing is cached. Each `count`, `at` and `to_vec` re-queries the
//! provider and materializes fresh entries.

use crate::provider::NativeSession;
use crate::session::SessionCore;
use parking_lot::Mutex;
use shadowset_core::{
    check_value, NativeResult, OrchestrationError, Result, WriterComponentsEntry,
    WriterMetadataEntry, WriterStatusEntry,
};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// Which provider-side list a view reads
pub trait ViewKind {
    /// Materialized entry type
    type Entry;

    /// Collection name for diagnostics
    const NAME: &'static str;

    /// Number of entries
    fn count(native: &dyn NativeSession) -> NativeResult<usize>;

    /// Entry at `index` (already bounds-checked)
    fn fetch(native: &dyn NativeSession, index: usize) -> NativeResult<Self::Entry>;
}

/// Writer metadata entries
#[derive(Debug, Clone, Copy)]
pub struct MetadataKind;

impl ViewKind for MetadataKind {
    type Entry = WriterMetadataEntry;
    const NAME: &'static str = "writer metadata";

    fn count(native: &dyn NativeSession) -> NativeResult<usize> {
        native.writer_metadata_count()
    }

    fn fetch(native: &dyn NativeSession, index: usize) -> NativeResult<Self::Entry> {
        native.writer_metadata(index).map(|entry| entry.into_entry())
    }
}

/// Writer components entries
#[derive(Debug, Clone, Copy)]
pub struct ComponentsKind;

impl ViewKind for ComponentsKind {
    type Entry = WriterComponentsEntry;
    const NAME: &'static str = "writer components";

    fn count(native: &dyn NativeSession) -> NativeResult<usize> {
        native.writer_components_count()
    }

    fn fetch(native: &dyn NativeSession, index: usize) -> NativeResult<Self::Entry> {
        native.writer_components(index).map(|entry| entry.into_entry())
    }
}

/// Writer status entries
#[derive(Debug, Clone, Copy)]
pub struct StatusKind;

impl ViewKind for StatusKind {
    type Entry = WriterStatusEntry;
    const NAME: &'static str = "writer status";

    fn count(native: &dyn NativeSession) -> NativeResult<usize> {
        native.writer_status_count()
    }

    fn fetch(native: &dyn NativeSession, index: usize) -> NativeResult<Self::Entry> {
        native.writer_status(index).map(|entry| entry.into_entry())
    }
}

/// Live view over one provider-side list
pub struct LiveView<K: ViewKind> {
    core: Weak<Mutex<SessionCore>>,
    _kind: PhantomData<fn() -> K>,
}

/// Writer metadata view
pub type WriterMetadataList = LiveView<MetadataKind>;
/// Writer components view
pub type WriterComponentsList = LiveView<ComponentsKind>;
/// Writer status view
pub type WriterStatusList = LiveView<StatusKind>;

impl<K: ViewKind> LiveView<K> {
    pub(crate) fn new(core: Weak<Mutex<SessionCore>>) -> Self {
        Self {
            core,
            _kind: PhantomData,
        }
    }

    fn session(&self) -> Result<Arc<Mutex<SessionCore>>> {
        self.core.upgrade().ok_or(OrchestrationError::SessionClosed)
    }

    /// Number of entries
    ///
    /// # Errors
    ///
    /// `SessionClosed` if the session is gone, or the mapped provider error.
    pub fn count(&self) -> Result<usize> {
        let session = self.session()?;
        let core = session.lock();
        check_value(K::count(core.native()?))
    }

    /// Entry at `index`
    ///
    /// # Errors
    ///
    /// - `SessionClosed` if the session is gone
    /// - `IndexOutOfRange` if `index < 0` or `index >= count()`
    pub fn at(&self, index: isize) -> Result<K::Entry> {
        let session = self.session()?;
        let core = session.lock();
        let native = core.native()?;
        let count = check_value(K::count(native))?;
        let position = usize::try_from(index)
            .ok()
            .filter(|position| *position < count)
            .ok_or(OrchestrationError::IndexOutOfRange { index, count })?;
        check_value(K::fetch(native, position))
    }

    /// Every entry, in provider order
    ///
    /// # Errors
    ///
    /// `SessionClosed` if the session is gone, or the mapped provider error.
    pub fn to_vec(&self) -> Result<Vec<K::Entry>> {
        let session = self.session()?;
        let core = session.lock();
        let native = core.native()?;
        let count = check_value(K::count(native))?;
        (0..count)
            .map(|position| check_value(K::fetch(native, position)))
            .collect()
    }
}

impl<K: ViewKind> Clone for LiveView<K> {
    fn clone(&self) -> Self {
        Self::new(self.core.clone())
    }
}

impl<K: ViewKind> fmt::Debug for LiveView<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveView")
            .field("kind", &K::NAME)
            .field("attached", &(self.core.strong_count() > 0))
            .finish()
    }
}
