//! Transient per-session artifact area.
//!
//! Each sandbox session owns `{artifact_root}/{session_id}`. The directory is
//! cleared when the session prepares it and removed when the session closes,
//! so concurrent sessions never touch each other's files.

use std::path::{Path, PathBuf};

use vibebolt_core::{Error, Result};

/// File name of the staged stdin payload.
pub const INPUT_FILE: &str = "input.txt";

/// Host directory holding per-session transient files.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open (creating if necessary) the artifact area at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::storage(format!(
                "Failed to create artifact root {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::internal(format!(
                "Invalid session id for artifact cache: {:?}",
                session_id
            )));
        }
        Ok(self.root.join(session_id))
    }

    /// Create an empty directory for the session, discarding stale content.
    pub async fn prepare(&self, session_id: &str) -> Result<PathBuf> {
        let dir = self.session_dir(session_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(session_id = %session_id, "Cleared stale artifact directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::storage(format!(
                    "Failed to clear artifact directory {}: {}",
                    dir.display(),
                    e
                )))
            }
        }
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::storage(format!(
                "Failed to create artifact directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(dir)
    }

    /// Persist a stdin payload for the session and return its host path.
    pub async fn write_input(&self, session_id: &str, payload: &str) -> Result<PathBuf> {
        let path = self.prepare(session_id).await?.join(INPUT_FILE);
        tokio::fs::write(&path, payload).await.map_err(|e| {
            Error::storage(format!("Failed to write input payload: {}", e))
        })?;
        Ok(path)
    }

    /// Remove the session's directory. Missing directories are not an error.
    pub async fn remove(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!(
                "Failed to remove artifact directory {}: {}",
                dir.display(),
                e
            ))),
        }
    }
}
