//! Storage Manager
//!
//! Owns the backing files and scopes every transaction.
//!
//! ## Responsibilities
//! - Resolve `(workspace, database)` to a backing file, creating it lazily
//! - Cache one handle per `(workspace, database, readonly)` key
//! - Hand out read/write scopes bound to one sub-database
//! - Enforce the configured map size and sub-database count

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use redb::TableHandle;

use crate::config::StoreConfig;
use crate::error::{RepositoryError, Result};
use crate::repository::keys;

use super::connection::{ConnectionHandle, ConnectionKey, HandleRegistry};
use super::resolver::{PerWorkspaceResolver, WorkspaceResolver};
use super::transaction::{ReadScope, ScopedTransaction, WriteLimits, WriteScope};

/// Manages backing files and transaction scopes
///
/// ## Concurrency:
/// - `registry`: internal Mutex, held only while resolving a handle
/// - Writers: the engine allows one write transaction per backing file;
///   a second `begin_write` on the same file blocks until the first ends
/// - Readers: unlimited, each on its own snapshot
/// - All methods use `&self`; share the manager with `Arc`
pub struct StorageManager {
    config: StoreConfig,

    /// Maps workspace names to directories
    resolver: Arc<dyn WorkspaceResolver>,

    /// Open handles, owned by this manager
    registry: HandleRegistry,

    closed: AtomicBool,
}

impl StorageManager {
    const FILE_EXTENSION: &'static str = "redb";

    /// Create a manager rooted at `config.base_dir` with one directory per
    /// workspace
    pub fn new(config: StoreConfig) -> Result<Self> {
        let resolver = Arc::new(PerWorkspaceResolver::new(config.base_dir.clone()));
        Self::with_resolver(config, resolver)
    }

    /// Create a manager with a caller-supplied workspace resolver
    pub fn with_resolver(config: StoreConfig, resolver: Arc<dyn WorkspaceResolver>) -> Result<Self> {
        config.validate()?;

        tracing::debug!(
            base_dir = %config.base_dir.display(),
            map_size = config.map_size,
            max_sub_databases = config.max_sub_databases,
            "storage manager created"
        );

        Ok(Self {
            registry: HandleRegistry::new(config.cache_size),
            config,
            resolver,
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a base path (convenience method)
    ///
    /// Uses default config with the specified base directory
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::builder().base_dir(path).build())
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Get (or lazily open) the handle for a backing file
    ///
    /// Idempotent: the same key always yields a handle over the same engine
    /// instance. Parent directories and the file itself are created if
    /// absent, including for read-only requests. A successful call on a
    /// closed manager reopens it.
    pub fn get_connection(
        &self,
        db_name: &str,
        workspace: Option<&str>,
        readonly: bool,
    ) -> Result<ConnectionHandle> {
        let workspace = self.resolve_workspace(workspace)?;
        let path = self.backing_file_path(db_name, Some(workspace))?;
        let key = ConnectionKey::new(workspace, db_name, readonly);

        let handle = self.registry.get_or_open(key, &path)?;
        self.closed.store(false, Ordering::SeqCst);
        Ok(handle)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Begin a scoped transaction on one sub-database
    pub fn get_transaction(
        &self,
        db_name: &str,
        workspace: Option<&str>,
        write: bool,
        sub_db: &str,
    ) -> Result<ScopedTransaction> {
        if write {
            self.begin_write(db_name, workspace, sub_db)
                .map(ScopedTransaction::Write)
        } else {
            self.begin_read(db_name, workspace, sub_db)
                .map(ScopedTransaction::Read)
        }
    }

    /// Begin a snapshot read
    pub fn begin_read(&self, db_name: &str, workspace: Option<&str>, sub_db: &str) -> Result<ReadScope> {
        validate_name("sub-database", sub_db)?;
        let handle = self.get_connection(db_name, workspace, true)?;
        ReadScope::begin(&handle, sub_db)
    }

    /// Begin the write transaction of a backing file (blocks while another
    /// writer holds it)
    pub fn begin_write(&self, db_name: &str, workspace: Option<&str>, sub_db: &str) -> Result<WriteScope> {
        validate_name("sub-database", sub_db)?;
        let handle = self.get_connection(db_name, workspace, false)?;
        WriteScope::begin(&handle, sub_db, self.write_limits())
    }

    /// Run `f` against a snapshot
    pub fn read<R>(
        &self,
        db_name: &str,
        workspace: Option<&str>,
        sub_db: &str,
        f: impl FnOnce(&ReadScope) -> Result<R>,
    ) -> Result<R> {
        let scope = self.begin_read(db_name, workspace, sub_db)?;
        f(&scope)
    }

    /// Run `f` inside a write transaction
    ///
    /// Commits when `f` returns `Ok`, aborts when it returns `Err`. If `f`
    /// panics the scope is dropped during unwinding, which also aborts.
    pub fn write<R>(
        &self,
        db_name: &str,
        workspace: Option<&str>,
        sub_db: &str,
        f: impl FnOnce(&mut WriteScope) -> Result<R>,
    ) -> Result<R> {
        let mut scope = self.begin_write(db_name, workspace, sub_db)?;
        match f(&mut scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = scope.abort() {
                    tracing::warn!(error = %abort_err, "abort after failed write body also failed");
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Names of the sub-databases stored in a backing file
    pub fn list_sub_databases(&self, db_name: &str, workspace: Option<&str>) -> Result<Vec<String>> {
        let handle = self.get_connection(db_name, workspace, true)?;
        let txn = handle.database().begin_read()?;
        let names = txn
            .list_tables()?
            .map(|table| table.name().to_string())
            .collect();
        Ok(names)
    }

    /// `{workspace root}/{db_name}.redb`
    pub fn backing_file_path(&self, db_name: &str, workspace: Option<&str>) -> Result<PathBuf> {
        validate_name("database", db_name)?;
        let workspace = self.resolve_workspace(workspace)?;
        let root = self.resolver.workspace_root(workspace);
        Ok(root.join(format!("{}.{}", db_name, Self::FILE_EXTENSION)))
    }

    /// `workspace`, or the configured default
    pub fn resolve_workspace<'a>(&'a self, workspace: Option<&'a str>) -> Result<&'a str> {
        let workspace = workspace.unwrap_or(&self.config.default_workspace);
        keys::validate_workspace(workspace)?;
        Ok(workspace)
    }

    /// Number of cached logical handles
    pub fn open_handle_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of distinct backing files currently open
    pub fn open_file_count(&self) -> usize {
        self.registry.file_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Release every cached handle
    ///
    /// Safe to call repeatedly and from `Drop`. A later `get_connection`
    /// reopens files lazily.
    pub fn close(&self) {
        let released = self.registry.close_all();
        if !self.closed.swap(true, Ordering::SeqCst) && released > 0 {
            tracing::debug!(released, "storage manager closed");
        }
    }

    /// Whether `close` ran with no successful `get_connection` since
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_limits(&self) -> WriteLimits {
        WriteLimits {
            map_size: self.config.map_size,
            max_sub_databases: self.config.max_sub_databases,
        }
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Database and sub-database names become file names and table names
fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RepositoryError::InvalidKey(format!("{} name is empty", kind)));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(RepositoryError::InvalidKey(format!(
            "{} name '{}' is not a valid file name",
            kind, name
        )));
    }
    Ok(())
}
