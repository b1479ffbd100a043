//! Connection handles and the handle registry
//!
//! ## Concurrency:
//! - `handles`/`files`: one `parking_lot::Mutex`, held only while a handle is
//!   looked up or opened, never across a transaction
//! - Handles are cheap clones of an `Arc<Database>`
//!
//! The engine refuses to open one file twice (in-process it would corrupt the
//! shared mapping; across processes it is a file lock). The registry therefore
//! keeps exactly one engine instance per physical path and hands out as many
//! logical handles over it as there are `(workspace, database, readonly)`
//! keys.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use redb::{Builder, Database};

use crate::error::Result;

/// Registry key for a logical connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub workspace: String,
    pub database: String,
    pub readonly: bool,
}

impl ConnectionKey {
    pub fn new(workspace: impl Into<String>, database: impl Into<String>, readonly: bool) -> Self {
        Self {
            workspace: workspace.into(),
            database: database.into(),
            readonly,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.readonly { "ro" } else { "rw" };
        write!(f, "{}/{} ({})", self.workspace, self.database, mode)
    }
}

/// An open backing file, as seen through one registry key
#[derive(Clone)]
pub struct ConnectionHandle {
    key: ConnectionKey,
    path: PathBuf,
    db: Arc<Database>,
}

impl ConnectionHandle {
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Physical backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_readonly(&self) -> bool {
        self.key.readonly
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// True when both handles share one engine instance
    pub fn same_file(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.db, &other.db)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.key)
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    /// Logical handles by key
    handles: HashMap<ConnectionKey, ConnectionHandle>,

    /// The single engine instance per canonical file path
    files: HashMap<PathBuf, Arc<Database>>,
}

/// Owned registry of open handles
///
/// Constructed by (and owned by) a `StorageManager`; there is no global
/// instance, so every test gets a fresh one.
pub struct HandleRegistry {
    state: Mutex<RegistryState>,
    cache_size: usize,
}

impl HandleRegistry {
    pub fn new(cache_size: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            cache_size,
        }
    }

    /// Return the cached handle for `key`, opening `path` if needed
    ///
    /// A read-only request for a file that does not exist yet first creates
    /// the file with a short-lived writable instance: the engine cannot open
    /// a missing file without creating it.
    pub fn get_or_open(&self, key: ConnectionKey, path: &Path) -> Result<ConnectionHandle> {
        let mut state = self.state.lock();

        if let Some(handle) = state.handles.get(&key) {
            return Ok(handle.clone());
        }

        let path = Self::canonical_path(path)?;

        let db = match state.files.get(&path) {
            Some(db) => Arc::clone(db),
            None => {
                let db = Arc::new(self.open_file(&path, key.readonly)?);
                state.files.insert(path.clone(), Arc::clone(&db));
                db
            }
        };

        tracing::debug!(key = %key, path = %path.display(), "opened connection handle");

        let handle = ConnectionHandle { key: key.clone(), path, db };
        state.handles.insert(key, handle.clone());
        Ok(handle)
    }

    /// Drop every cached handle and engine instance. Returns how many logical
    /// handles were released. Handles cloned out by callers keep their file
    /// open until they are dropped too.
    pub fn close_all(&self) -> usize {
        let mut state = self.state.lock();
        let released = state.handles.len();
        state.handles.clear();
        state.files.clear();
        released
    }

    /// Number of cached logical handles
    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct physical files currently open
    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn open_file(&self, path: &Path, readonly: bool) -> Result<Database> {
        let mut builder = Builder::new();
        builder.set_cache_size(self.cache_size);

        if readonly && !path.exists() {
            tracing::info!(path = %path.display(), "materialising backing file for read-only access");
            let writable = builder.create(path)?;
            drop(writable);
        }

        let db = if readonly {
            builder.open(path)?
        } else {
            builder.create(path)?
        };
        Ok(db)
    }

    /// Create the parent directory and resolve symlinks/relative segments so
    /// two spellings of one file map to the same registry entry.
    fn canonical_path(path: &Path) -> Result<PathBuf> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let parent = fs::canonicalize(&parent)?;
        Ok(match path.file_name() {
            Some(name) => parent.join(name),
            None => parent,
        })
    }
}
