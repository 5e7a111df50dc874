//! Workspace store traits.

use async_trait::async_trait;
use crate::error::Result;
use crate::fs_policy::WorkspaceRoot;

/// Durable directory tree holding the caller's source files.
///
/// All `path` arguments are relative to the workspace root and must pass the
/// containment guard before any I/O happens.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// The containment root of this workspace.
    fn root(&self) -> &WorkspaceRoot;

    /// Read a file as UTF-8 text.
    async fn read(&self, path: &str) -> Result<String>;

    /// Write a file, creating parent directories and overwriting existing content.
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Delete a file.
    async fn delete(&self, path: &str) -> Result<()>;

    /// List entry names in a directory (`""` or `"."` is the root), sorted.
    async fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// Remove every entry under the root, keeping the root itself.
    async fn reset(&self) -> Result<()>;
}
