//! Snapshot-set session integration tests
//!
//! Drive `SnapshotSetSession` end to end against the in-memory provider.

#[path = "../common/mod.rs"]
mod common;

mod async_ops;
mod delete;
mod disposal;
mod lifecycle;
