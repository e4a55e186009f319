//! Async operation handle
//!
//! Wraps one native background operation. The wrapper owns the native handle
//! exclusively and releases it exactly once when dropped, waited or not.
//!
//! # State Transition
//!
//! `Pending` → `Succeeded` | `Failed` | `Cancelled`, exactly once. The first
//! terminal status observed is reported to the owning session (if it is
//! still alive) through the completion hook, so the session lifecycle
//! advances without the caller having to tell it. Dropping an operation
//! queries the native status one last time, so a finished operation that
//! was never waited still reaches its session.

use crate::provider::NativeAsync;
use shadowset_core::{map_failure, OrchestrationError, Result, StatusCode};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Status of an async operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncStatus {
    /// Still running
    Pending,
    /// Finished successfully
    Succeeded,
    /// Finished with an error (see [`AsyncOperation::error`])
    Failed,
    /// Cancelled before finishing
    Cancelled,
}

impl AsyncStatus {
    /// Check for a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AsyncStatus::Pending)
    }
}

/// Session operation that produced an async handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Writer metadata gathering
    GatherWriterMetadata,
    /// Writer status gathering
    GatherWriterStatus,
    /// Prepare for backup
    PrepareForBackup,
    /// Snapshot set creation
    DoSnapshotSet,
    /// Backup completion
    BackupComplete,
    /// Pre-restore notification
    PreRestore,
    /// Post-restore notification
    PostRestore,
    /// Revert progress tracking
    QueryRevertStatus,
    /// Transportable snapshot import
    ImportSnapshots,
}

impl OperationKind {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::GatherWriterMetadata => "gather writer metadata",
            OperationKind::GatherWriterStatus => "gather writer status",
            OperationKind::PrepareForBackup => "prepare for backup",
            OperationKind::DoSnapshotSet => "do snapshot set",
            OperationKind::BackupComplete => "backup complete",
            OperationKind::PreRestore => "pre-restore",
            OperationKind::PostRestore => "post-restore",
            OperationKind::QueryRevertStatus => "query revert status",
            OperationKind::ImportSnapshots => "import snapshots",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callback run once with the terminal status
pub(crate) type CompletionHook = Box<dyn FnOnce(AsyncStatus) + Send>;

/// Handle to a long-running provider operation
pub struct AsyncOperation {
    kind: OperationKind,
    native: Box<dyn NativeAsync>,
    status: AsyncStatus,
    error: Option<OrchestrationError>,
    on_complete: Option<CompletionHook>,
    default_timeout: Option<Duration>,
}

impl AsyncOperation {
    /// Wrap a native async handle
    pub fn new(kind: OperationKind, native: Box<dyn NativeAsync>) -> Self {
        Self {
            kind,
            native,
            status: AsyncStatus::Pending,
            error: None,
            on_complete: None,
            default_timeout: None,
        }
    }

    pub(crate) fn with_completion(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    pub(crate) fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Operation that produced this handle
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Last observed status (no native call)
    pub fn status(&self) -> AsyncStatus {
        self.status
    }

    /// Mapped error when the status is `Failed`
    pub fn error(&self) -> Option<&OrchestrationError> {
        self.error.as_ref()
    }

    /// Check for a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Block until terminal or until `timeout` elapses
    ///
    /// `None` waits without limit. A timeout returns `Pending` and changes
    /// nothing.
    pub fn wait(&mut self, timeout: Option<Duration>) -> AsyncStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        let code = self.native.wait(timeout);
        self.observe(code)
    }

    /// Wait using the configured default timeout
    pub fn wait_default(&mut self) -> AsyncStatus {
        self.wait(self.default_timeout)
    }

    /// Query the native status without blocking
    pub fn poll(&mut self) -> AsyncStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        let code = self.native.query_status();
        self.observe(code)
    }

    /// Wait (default timeout) and convert the outcome into a `Result`
    ///
    /// # Errors
    ///
    /// - the mapped provider error if the operation `Failed`
    /// - `Cancelled` if it was cancelled
    /// - `InvalidSequence` if it is still pending when the wait returns
    pub fn wait_ok(&mut self) -> Result<()> {
        match self.wait_default() {
            AsyncStatus::Succeeded => Ok(()),
            AsyncStatus::Failed => Err(self
                .error
                .clone()
                .unwrap_or(OrchestrationError::NativeFailure {
                    code: StatusCode(shadowset_core::codec::codes::UNEXPECTED),
                })),
            AsyncStatus::Cancelled => Err(OrchestrationError::Cancelled {
                operation: self.kind.name(),
            }),
            AsyncStatus::Pending => Err(OrchestrationError::invalid_sequence(
                self.kind.name(),
                "operation is still pending after the wait timed out",
            )),
        }
    }

    /// Request cooperative cancellation
    ///
    /// Does not change the stored status: wait or poll to observe
    /// `Cancelled`. Terminal operations return `Ok` without a native call.
    ///
    /// # Errors
    ///
    /// The mapped provider error if the provider refuses the request.
    pub fn cancel(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Ok(());
        }
        let code = self.native.cancel();
        if code.is_success() {
            debug!(target: "shadowset::async", kind = %self.kind, code = %code, "Cancellation requested");
            Ok(())
        } else {
            Err(map_failure(code))
        }
    }

    fn observe(&mut self, code: StatusCode) -> AsyncStatus {
        let status = if code == StatusCode::ASYNC_PENDING {
            AsyncStatus::Pending
        } else if code == StatusCode::ASYNC_CANCELLED {
            AsyncStatus::Cancelled
        } else if code.is_success() {
            AsyncStatus::Succeeded
        } else {
            self.error = Some(map_failure(code));
            AsyncStatus::Failed
        };

        if status.is_terminal() {
            self.status = status;
            match status {
                AsyncStatus::Failed => {
                    warn!(target: "shadowset::async", kind = %self.kind, code = %code, "Async operation failed")
                }
                _ => debug!(target: "shadowset::async", kind = %self.kind, ?status, "Async operation finished"),
            }
            if let Some(hook) = self.on_complete.take() {
                hook(status);
            }
        }
        status
    }
}

impl Drop for AsyncOperation {
    fn drop(&mut self) {
        if self.on_complete.is_none() || self.status.is_terminal() {
            return;
        }
        let code = self.native.query_status();
        if self.observe(code) == AsyncStatus::Pending {
            debug!(target: "shadowset::async", kind = %self.kind, "Async operation dropped while pending");
        }
    }
}

impl fmt::Debug for AsyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish()
    }
}
