//! Test infrastructure for the FortiManager JSON-RPC connector
//!
//! Provides:
//! - An in-memory controller with per-session ADOM locks ([`FakeFmg`])
//! - Scripted exec replies and task progress
//! - A call journal for ordering assertions
//! - Request fixtures for common operations

mod fake;
pub mod fixtures;

pub use fake::{
    FakeFmg, FakeSession, JournalEntry, WorkspaceMode, LOCKED_BY_OTHER, NOT_LOCKED,
    OBJECT_NOT_FOUND,
};
pub use fixtures::*;
