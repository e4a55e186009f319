//! Recorded session milestones and the phase derived from them
//!
//! The session never stores its phase. It records what has happened (mode,
//! stages of each async step, the snapshot set) and derives the phase on
//! demand, so a rejected call can never move it.

use crate::async_op::AsyncStatus;
use shadowset_core::{
    BackupState, OrchestrationError, Phase, Result, SnapshotContext, SnapshotId, SnapshotSetId,
};

/// Progress of one async lifecycle step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Stage {
    #[default]
    NotStarted,
    InFlight,
    Succeeded,
    Failed,
}

impl Stage {
    pub(crate) fn is_started(&self) -> bool {
        !matches!(self, Stage::NotStarted)
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    fn describe(&self) -> &'static str {
        match self {
            Stage::NotStarted => "has not started",
            Stage::InFlight => "is still in flight",
            Stage::Succeeded => "already succeeded",
            Stage::Failed => "failed",
        }
    }
}

/// What the session was initialized for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Backup,
    Restore,
}

/// How the session was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Closure {
    Aborted,
    Disposed,
}

/// Async steps whose outcome the session tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Metadata,
    WriterStatus,
    Prepare,
    Create,
    Complete,
    PreRestore,
    PostRestore,
    Import,
}

impl Step {
    fn label(&self) -> &'static str {
        match self {
            Step::Metadata => "writer metadata gathering",
            Step::WriterStatus => "writer status gathering",
            Step::Prepare => "prepare for backup",
            Step::Create => "snapshot creation",
            Step::Complete => "backup completion",
            Step::PreRestore => "pre-restore",
            Step::PostRestore => "post-restore",
            Step::Import => "snapshot import",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Milestones {
    pub(crate) mode: Option<Mode>,
    pub(crate) closed: Option<Closure>,
    pub(crate) context: SnapshotContext,
    pub(crate) metadata: Stage,
    pub(crate) writer_status: Stage,
    pub(crate) prepare: Stage,
    pub(crate) create: Stage,
    pub(crate) complete: Stage,
    pub(crate) pre_restore: Stage,
    pub(crate) post_restore: Stage,
    pub(crate) import: Stage,
    pub(crate) backup_state: Option<BackupState>,
    pub(crate) snapshot_set: Option<SnapshotSetId>,
    pub(crate) snapshots: Vec<SnapshotId>,
    pub(crate) document_loaded: bool,
}

impl Milestones {
    /// Derive the lifecycle phase
    pub(crate) fn phase(&self) -> Phase {
        match self.closed {
            Some(Closure::Aborted) => return Phase::Aborted,
            Some(Closure::Disposed) => return Phase::Disposed,
            None => {}
        }
        match self.mode {
            None => Phase::Created,
            Some(Mode::Restore) => {
                if self.post_restore == Stage::Succeeded {
                    Phase::Done
                } else {
                    Phase::Restoring
                }
            }
            Some(Mode::Backup) => {
                if self.complete == Stage::Succeeded {
                    Phase::Done
                } else if self.complete.is_started() {
                    Phase::Completing
                } else if self.create == Stage::Succeeded {
                    Phase::SnapshotsCreated
                } else if self.create.is_started() {
                    Phase::CreatingSnapshots
                } else if self.prepare.is_started() {
                    Phase::Preparing
                } else if self.snapshot_set.is_some() {
                    Phase::SnapshotSetStarted
                } else if self.backup_state.is_some() {
                    Phase::BackupStateSet
                } else if self.metadata.is_started() {
                    Phase::MetadataGathering
                } else {
                    Phase::Initialized
                }
            }
        }
    }

    pub(crate) fn stage_mut(&mut self, step: Step) -> &mut Stage {
        match step {
            Step::Metadata => &mut self.metadata,
            Step::WriterStatus => &mut self.writer_status,
            Step::Prepare => &mut self.prepare,
            Step::Create => &mut self.create,
            Step::Complete => &mut self.complete,
            Step::PreRestore => &mut self.pre_restore,
            Step::PostRestore => &mut self.post_restore,
            Step::Import => &mut self.import,
        }
    }

    fn stage(&self, step: Step) -> Stage {
        match step {
            Step::Metadata => self.metadata,
            Step::WriterStatus => self.writer_status,
            Step::Prepare => self.prepare,
            Step::Create => self.create,
            Step::Complete => self.complete,
            Step::PreRestore => self.pre_restore,
            Step::PostRestore => self.post_restore,
            Step::Import => self.import,
        }
    }

    /// Record the terminal status of an async step
    pub(crate) fn finish(&mut self, step: Step, status: AsyncStatus) {
        let stage = self.stage_mut(step);
        *stage = match status {
            AsyncStatus::Succeeded => Stage::Succeeded,
            AsyncStatus::Pending => return,
            AsyncStatus::Failed | AsyncStatus::Cancelled => Stage::Failed,
        };
    }

    // =========================================================================
    // Preconditions
    // =========================================================================

    pub(crate) fn require_uninitialized(&self, operation: &'static str) -> Result<()> {
        match self.mode {
            None => Ok(()),
            Some(_) => Err(OrchestrationError::invalid_sequence(
                operation,
                "session is already initialized",
            )),
        }
    }

    pub(crate) fn require_initialized(&self, operation: &'static str) -> Result<Mode> {
        self.mode.ok_or_else(|| {
            OrchestrationError::invalid_sequence(operation, "session is not initialized")
        })
    }

    pub(crate) fn require_mode(&self, operation: &'static str, mode: Mode) -> Result<()> {
        match self.mode {
            Some(current) if current == mode => Ok(()),
            Some(_) | None => Err(OrchestrationError::invalid_sequence(
                operation,
                match mode {
                    Mode::Backup => "session is not initialized for backup",
                    Mode::Restore => "session is not initialized for restore",
                },
            )),
        }
    }

    pub(crate) fn require_not_started(&self, operation: &'static str, step: Step) -> Result<()> {
        let stage = self.stage(step);
        if stage.is_started() {
            return Err(OrchestrationError::invalid_sequence(
                operation,
                format!("{} {}", step.label(), stage.describe()),
            ));
        }
        Ok(())
    }

    pub(crate) fn require_succeeded(&self, operation: &'static str, step: Step) -> Result<()> {
        let stage = self.stage(step);
        if stage != Stage::Succeeded {
            return Err(OrchestrationError::invalid_sequence(
                operation,
                format!("{} {}", step.label(), stage.describe()),
            ));
        }
        Ok(())
    }

    pub(crate) fn require_unfinished(&self, operation: &'static str, step: Step) -> Result<()> {
        let stage = self.stage(step);
        if stage.is_finished() {
            return Err(OrchestrationError::invalid_sequence(
                operation,
                format!("{} {}", step.label(), stage.describe()),
            ));
        }
        Ok(())
    }

    pub(crate) fn require_snapshot_set(&self, operation: &'static str) -> Result<SnapshotSetId> {
        self.snapshot_set.ok_or_else(|| {
            OrchestrationError::invalid_sequence(operation, "no snapshot set has been started")
        })
    }
}
