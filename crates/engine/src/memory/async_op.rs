//! Async cells of the in-memory provider
//!
//! A cell runs its job as soon as it is created. Held cells run their job
//! when released instead, even if the handle was dropped in the meantime;
//! waiting on a held cell blocks on a condition variable until the release,
//! a cancellation, or the timeout.

use super::state::Shared;
use crate::provider::NativeAsync;
use parking_lot::{Condvar, Mutex};
use shadowset_core::StatusCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Work performed when the operation runs
pub(crate) type Job = Box<dyn FnOnce() -> StatusCode + Send>;

enum CellState {
    Held(Job),
    Finished(StatusCode),
    Cancelled,
}

pub(crate) struct AsyncCell {
    state: Mutex<CellState>,
    ready: Condvar,
}

impl AsyncCell {
    pub(crate) fn new(job: Job, held: bool) -> Arc<Self> {
        let state = if held {
            CellState::Held(job)
        } else {
            CellState::Finished(Self::run(job))
        };
        Arc::new(Self {
            state: Mutex::new(state),
            ready: Condvar::new(),
        })
    }

    pub(crate) fn is_held(&self) -> bool {
        matches!(*self.state.lock(), CellState::Held(_))
    }

    /// Run a held job now; finished and cancelled cells are left alone
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, CellState::Cancelled);
        *state = match previous {
            CellState::Held(job) => CellState::Finished(Self::run(job)),
            other => other,
        };
        self.ready.notify_all();
    }

    fn run(job: Job) -> StatusCode {
        let code = job();
        let code = if code.is_success() {
            StatusCode::ASYNC_FINISHED
        } else {
            code
        };
        debug!(target: "shadowset::memory", code = %code, "Async job finished");
        code
    }

    /// Terminal code, or `None` while held
    fn check(state: &CellState) -> Option<StatusCode> {
        match state {
            CellState::Finished(code) => Some(*code),
            CellState::Cancelled => Some(StatusCode::ASYNC_CANCELLED),
            CellState::Held(_) => None,
        }
    }
}

/// Native async handle handed out by the in-memory provider
pub(crate) struct MemoryAsync {
    cell: Arc<AsyncCell>,
    shared: Arc<Shared>,
}

impl MemoryAsync {
    pub(crate) fn new(cell: Arc<AsyncCell>, shared: Arc<Shared>) -> Self {
        Self { cell, shared }
    }
}

impl NativeAsync for MemoryAsync {
    fn wait(&mut self, timeout: Option<Duration>) -> StatusCode {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.cell.state.lock();
        loop {
            if let Some(code) = AsyncCell::check(&state) {
                return code;
            }
            match deadline {
                None => self.cell.ready.wait(&mut state),
                Some(deadline) => {
                    if self.cell.ready.wait_until(&mut state, deadline).timed_out() {
                        return AsyncCell::check(&state).unwrap_or(StatusCode::ASYNC_PENDING);
                    }
                }
            }
        }
    }

    fn query_status(&mut self) -> StatusCode {
        AsyncCell::check(&self.cell.state.lock()).unwrap_or(StatusCode::ASYNC_PENDING)
    }

    fn cancel(&mut self) -> StatusCode {
        let mut state = self.cell.state.lock();
        match &*state {
            CellState::Finished(_) => StatusCode::ASYNC_FINISHED,
            CellState::Cancelled => StatusCode::ASYNC_CANCELLED,
            CellState::Held(_) => {
                *state = CellState::Cancelled;
                self.cell.ready.notify_all();
                StatusCode::OK
            }
        }
    }
}

impl Drop for MemoryAsync {
    fn drop(&mut self) {
        self.shared.live_async.fetch_sub(1, Ordering::SeqCst);
        self.shared.async_released.fetch_add(1, Ordering::SeqCst);
    }
}
