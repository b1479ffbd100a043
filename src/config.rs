//! Configuration for atlas-persist
//!
//! Centralized configuration with sensible defaults. Limits are fixed once a
//! [`StorageManager`](crate::storage::StorageManager) is constructed.

use std::path::PathBuf;

use crate::error::{RepositoryError, Result};
use crate::repository::keys;
use crate::serialization::Encoding;

/// Main configuration for a storage manager
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory handed to the default workspace resolver
    /// Internal structure:
    ///   {base_dir}/
    ///     └── workspaces/
    ///           └── {workspace}/
    ///                 └── {database}.redb
    pub base_dir: PathBuf,

    /// Hard upper bound on the bytes a single backing file may hold
    pub map_size: u64,

    /// Max named sub-databases (collections) per backing file
    pub max_sub_databases: u32,

    /// Engine page cache size (in bytes)
    pub cache_size: usize,

    // -------------------------------------------------------------------------
    // Key Space Configuration
    // -------------------------------------------------------------------------
    /// Workspace used when a caller passes none
    pub default_workspace: String,

    // -------------------------------------------------------------------------
    // Serialization Configuration
    // -------------------------------------------------------------------------
    /// Preferred envelope codec for new writes
    pub encoding: Encoding,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./atlas_data"),
            map_size: 1024 * 1024 * 1024, // 1 GiB
            max_sub_databases: 32,
            cache_size: 64 * 1024 * 1024, // 64 MiB
            default_workspace: "default".to_string(),
            encoding: Encoding::Structured,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Check limits and names before any file is touched
    pub fn validate(&self) -> Result<()> {
        if self.map_size == 0 {
            return Err(RepositoryError::Config("map_size must be positive".to_string()));
        }
        if self.max_sub_databases == 0 {
            return Err(RepositoryError::Config(
                "max_sub_databases must be positive".to_string(),
            ));
        }
        keys::validate_workspace(&self.default_workspace).map_err(|e| {
            RepositoryError::Config(format!("default_workspace: {}", e))
        })?;
        Ok(())
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the base directory (root for all workspaces)
    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_dir = path.into();
        self
    }

    /// Set the map size limit (in bytes)
    pub fn map_size(mut self, bytes: u64) -> Self {
        self.config.map_size = bytes;
        self
    }

    /// Set the maximum number of sub-databases per backing file
    pub fn max_sub_databases(mut self, count: u32) -> Self {
        self.config.max_sub_databases = count;
        self
    }

    /// Set the engine cache size (in bytes)
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.config.cache_size = bytes;
        self
    }

    /// Set the workspace used when none is given
    pub fn default_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.config.default_workspace = workspace.into();
        self
    }

    /// Set the preferred envelope encoding
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
