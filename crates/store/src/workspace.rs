//! Filesystem-backed workspace store.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use vibebolt_core::{traits::WorkspaceStore, Error, Result, WorkspaceRoot};

/// Workspace store rooted at a host directory.
///
/// Paths are checked lexically by [`WorkspaceRoot`] and then against the real
/// filesystem, so a symlink planted inside the workspace cannot be used to
/// reach files outside of it.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: WorkspaceRoot,
}

impl LocalWorkspace {
    /// Open (creating if necessary) a workspace at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::storage(format!(
                "Failed to create workspace root {}: {}",
                root.display(),
                e
            ))
        })?;
        let canonical = tokio::fs::canonicalize(&root).await.map_err(|e| {
            Error::storage(format!(
                "Failed to resolve workspace root {}: {}",
                root.display(),
                e
            ))
        })?;
        tracing::info!(root = %canonical.display(), "Workspace opened");
        Ok(Self {
            root: WorkspaceRoot::new(canonical)?,
        })
    }

    async fn checked(&self, path: &str) -> Result<PathBuf> {
        let full = self.root.resolve(path)?;
        self.ensure_no_symlink_escape(path, &full).await?;
        Ok(full)
    }

    async fn checked_dir(&self, path: &str) -> Result<PathBuf> {
        let full = self.root.resolve_dir(path)?;
        self.ensure_no_symlink_escape(path, &full).await?;
        Ok(full)
    }

    /// The deepest existing ancestor of `full` must canonicalize inside the root.
    async fn ensure_no_symlink_escape(&self, input: &str, full: &Path) -> Result<()> {
        let mut probe = Some(full);
        while let Some(candidate) = probe {
            match tokio::fs::canonicalize(candidate).await {
                Ok(real) => {
                    if real.starts_with(self.root.path()) {
                        return Ok(());
                    }
                    tracing::warn!(path = %input, resolved = %real.display(), "Symlink escape rejected");
                    return Err(Error::path_escape(format!(
                        "Path resolves outside the workspace: {}",
                        input
                    )));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => probe = candidate.parent(),
                Err(e) => {
                    return Err(Error::storage(format!(
                        "Failed to resolve '{}': {}",
                        input, e
                    )))
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceStore for LocalWorkspace {
    fn root(&self) -> &WorkspaceRoot {
        &self.root
    }

    async fn read(&self, path: &str) -> Result<String> {
        let full = self.checked(path).await?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| Error::storage(format!("Failed to read '{}': {}", path, e)))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.checked(path).await?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::storage(format!("Failed to create directory for '{}': {}", path, e))
            })?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| Error::storage(format!("Failed to write '{}': {}", path, e)))?;
        tracing::debug!(path = %path, bytes = content.len(), "Workspace file written");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.checked(path).await?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| Error::storage(format!("Failed to delete '{}': {}", path, e)))?;
        tracing::debug!(path = %path, "Workspace file deleted");
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let full = self.checked_dir(dir).await?;
        let mut entries = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| Error::storage(format!("Failed to list '{}': {}", dir, e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(format!("Failed to list '{}': {}", dir, e)))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn reset(&self) -> Result<()> {
        let root = self.root.path();
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| Error::storage(format!("Failed to read workspace root: {}", e)))?;

        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(format!("Failed to read workspace root: {}", e)))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::storage(format!("Failed to stat entry: {}", e)))?;
            let path = entry.path();
            // file_type() does not follow symlinks, so a link to a directory is unlinked, not emptied
            let outcome = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            outcome.map_err(|e| {
                Error::storage(format!("Failed to remove {}: {}", path.display(), e))
            })?;
            removed += 1;
        }

        tracing::info!(removed, "Workspace reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn workspace() -> (tempfile::TempDir, LocalWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::open(dir.path().join("workspace")).await.unwrap();
        (dir, ws)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_dir, ws) = workspace().await;
        ws.write("src/main.rs", "fn main() {}\n").await.unwrap();
        assert_eq!(ws.read("src/main.rs").await.unwrap(), "fn main() {}\n");

        ws.write("src/main.rs", "fn main() { println!(\"hi\"); }").await.unwrap();
        assert_eq!(
            ws.read("src/main.rs").await.unwrap(),
            "fn main() { println!(\"hi\"); }"
        );
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (_dir, ws) = workspace().await;
        ws.write("b.rs", "").await.unwrap();
        ws.write("a.rs", "").await.unwrap();
        ws.write("nested/c.rs", "").await.unwrap();

        assert_eq!(ws.list("").await.unwrap(), vec!["a.rs", "b.rs", "nested"]);
        assert_eq!(ws.list("nested").await.unwrap(), vec!["c.rs"]);

        ws.delete("a.rs").await.unwrap();
        assert_eq!(ws.list(".").await.unwrap(), vec!["b.rs", "nested"]);
        assert!(ws.delete("a.rs").await.is_err());
    }

    #[tokio::test]
    async fn test_reset_empties_workspace() {
        let (_dir, ws) = workspace().await;
        ws.write("main.rs", "fn main() {}").await.unwrap();
        ws.write("deep/er/file.txt", "x").await.unwrap();

        ws.reset().await.unwrap();
        assert!(ws.list("").await.unwrap().is_empty());
        // The root survives and is usable
        ws.write("again.rs", "").await.unwrap();
    }

    #[tokio::test]
    async fn test_traversal_rejected_before_io() {
        let (_dir, ws) = workspace().await;
        assert!(matches!(
            ws.read("../../etc/passwd").await,
            Err(Error::PathEscape(_))
        ));
        assert!(matches!(
            ws.write("/etc/evil", "x").await,
            Err(Error::PathEscape(_))
        ));
        assert!(matches!(ws.list("..").await, Err(Error::PathEscape(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let (dir, ws) = workspace().await;
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(&outside, ws.root().path().join("link")).unwrap();

        assert!(matches!(
            ws.read("link/secret.txt").await,
            Err(Error::PathEscape(_))
        ));
        assert!(matches!(
            ws.write("link/new.txt", "x").await,
            Err(Error::PathEscape(_))
        ));

        // Reset removes the link without touching its target
        ws.reset().await.unwrap();
        assert!(outside.join("secret.txt").exists());
    }
}
