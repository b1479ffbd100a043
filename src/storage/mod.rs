//! Storage Module
//!
//! Transactional access to memory-mapped, copy-on-write backing files.
//!
//! ## Responsibilities
//! - One backing file per `(workspace, database)` pair, created lazily
//! - Named sub-databases partition collections inside one file
//! - Read scopes see an MVCC snapshot; one write scope per file at a time
//! - Every engine error leaves this module as a `RepositoryError`
//!
//! ## On-disk Layout (default resolver)
//! ```text
//! {base_dir}/
//!   └── workspaces/
//!         ├── demo/
//!         │     └── app.redb        ← sub-databases: templates, runs, ...
//!         └── default/
//!               └── app.redb
//! ```

mod connection;
mod manager;
mod resolver;
mod transaction;

pub use connection::{ConnectionHandle, ConnectionKey, HandleRegistry};
pub use manager::StorageManager;
pub use resolver::{PerWorkspaceResolver, SharedRootResolver, WorkspaceResolver};
pub use transaction::{ReadScope, ScanResult, ScopedTransaction, WriteScope};
