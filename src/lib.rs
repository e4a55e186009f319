//! Shadowset - coordination engine for point-in-time volume snapshot sets
//!
//! Shadowset drives a snapshot provider through the backup and restore
//! lifecycle: writer metadata gathering, snapshot set creation, completion,
//! restore notification, and snapshot management (delete, expose, revert,
//! break, import).
//!
//! # Quick Start
//!
//! ```ignore
//! use shadowset::{MemoryProvider, ShadowConfig, ShadowEngine, ProviderId, BackupState};
//! use std::sync::Arc;
//!
//! let provider = MemoryProvider::new().with_volume("C:\\");
//! let engine = ShadowEngine::new(Arc::new(provider), ShadowConfig::default())?;
//!
//! let mut session = engine.begin_backup(None)?;
//! session.gather_writer_metadata()?.wait_ok()?;
//! session.set_backup_state(BackupState::default())?;
//! session.start_snapshot_set()?;
//! session.add_to_snapshot_set("C:\\", ProviderId::NULL)?;
//! session.prepare_for_backup()?.wait_ok()?;
//! session.do_snapshot_set()?.wait_ok()?;
//! session.backup_complete()?.wait_ok()?;
//! ```
//!
//! # Architecture
//!
//! - `shadowset-core`: identifiers, status codes, records, errors
//! - `shadowset-engine`: provider boundary, session, async handles,
//!   collections, capability gate, configuration, in-memory provider

pub use shadowset_core::*;
pub use shadowset_engine::*;
