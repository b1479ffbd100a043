//! Storage key derivation
//!
//! ## Key Format
//! ```text
//! ┌──────┬─────────────┬───┬──────────────┐
//! │ "ws:"│  workspace  │":"│  entity id   │
//! └──────┴─────────────┴───┴──────────────┘
//! ```
//!
//! Keys are compared bytewise, so every key of one workspace sorts into a
//! contiguous run starting at [`workspace_prefix`]. A workspace name may not
//! contain `:`, otherwise `("a", "b:c")` and `("a:b", "c")` would collide.

use crate::error::{RepositoryError, Result};

/// Literal that opens every storage key
pub const KEY_PREFIX: &str = "ws:";

/// Separator between the workspace and the entity id
pub const SEPARATOR: char = ':';

/// Reject workspace names that would break prefix scans or escape the
/// workspace directory.
pub fn validate_workspace(workspace: &str) -> Result<()> {
    if workspace.is_empty() {
        return Err(RepositoryError::InvalidWorkspace(
            "workspace name is empty".to_string(),
        ));
    }
    if workspace.contains(SEPARATOR) {
        return Err(RepositoryError::InvalidWorkspace(format!(
            "'{}' contains the key separator ':'",
            workspace
        )));
    }
    if workspace.contains('/') || workspace.contains('\\') || workspace == "." || workspace == ".." {
        return Err(RepositoryError::InvalidWorkspace(format!(
            "'{}' is not a valid directory name",
            workspace
        )));
    }
    Ok(())
}

/// `"ws:" + workspace + ":"`
pub fn workspace_prefix(workspace: &str) -> Result<String> {
    validate_workspace(workspace)?;
    Ok(format!("{}{}{}", KEY_PREFIX, workspace, SEPARATOR))
}

/// `"ws:" + workspace + ":" + id`
pub fn storage_key(workspace: &str, id: &str) -> Result<String> {
    if id.is_empty() {
        return Err(RepositoryError::InvalidKey("entity id is empty".to_string()));
    }
    let mut key = workspace_prefix(workspace)?;
    key.push_str(id);
    Ok(key)
}

/// Split a storage key back into `(workspace, id)`
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(KEY_PREFIX)?;
    rest.split_once(SEPARATOR)
}
