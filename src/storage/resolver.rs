//! Workspace path resolution
//!
//! Maps a workspace name to the directory holding its backing files. The
//! storage manager never invents paths itself; it asks a resolver.

use std::path::{Path, PathBuf};

/// Resolves the root directory for a workspace's backing files
pub trait WorkspaceResolver: Send + Sync {
    fn workspace_root(&self, workspace: &str) -> PathBuf;
}

/// One directory per workspace: `{base}/workspaces/{workspace}`
#[derive(Debug, Clone)]
pub struct PerWorkspaceResolver {
    base: PathBuf,
}

impl PerWorkspaceResolver {
    const WORKSPACES_DIR: &'static str = "workspaces";

    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl WorkspaceResolver for PerWorkspaceResolver {
    fn workspace_root(&self, workspace: &str) -> PathBuf {
        self.base.join(Self::WORKSPACES_DIR).join(workspace)
    }
}

/// Every workspace shares one root, so all workspaces of a database live in
/// the same backing file and are separated only by key prefix.
#[derive(Debug, Clone)]
pub struct SharedRootResolver {
    root: PathBuf,
}

impl SharedRootResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl WorkspaceResolver for SharedRootResolver {
    fn workspace_root(&self, _workspace: &str) -> PathBuf {
        self.root.clone()
    }
}
