//! Storage manager test suite
//!
//! - `manager_tests`: connections, handle registry, lifecycle, limits
//! - `transaction_tests`: scope primitives, commit/abort, snapshots,
//!   single-writer exclusion


use std::path::PathBuf;

use atlas_persist::{StorageManager, StoreConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

pub fn setup_temp_storage() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

pub fn open_manager(path: &PathBuf) -> StorageManager {
    StorageManager::new(StoreConfig::builder().base_dir(path).build()).unwrap()
}
