//! Repository test suite
//!
//! - `crud_tests`: save/insert/delete semantics, point reads, paging, batches
//! - `query_tests`: field queries and composed specifications
//! - `workspace_tests`: key-space isolation between workspaces
//! - `async_tests`: the tokio-backed entry points

#[path = "../common/mod.rs"]
mod common;

mod query_tests;

use std::sync::Arc;

use atlas_persist::{Collection, Repository, StorageManager};

// =============================================================================
// Helper Functions
// =============================================================================

/// Repository for `C` in `workspace`, backed by fixture types
pub fn repository<C: Collection>(storage: &Arc<StorageManager>, workspace: &str) -> Repository<C> {
    Repository::new(Arc::clone(storage), common::fixture_serializer(), workspace).unwrap()
}
