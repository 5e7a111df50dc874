//! Staging transfer: package the workspace into session storage.

use std::io::Read;
use std::path::{Path, PathBuf};

use vibebolt_core::{Error, Result};
use vibebolt_store::artifacts::INPUT_FILE;

use crate::runtime::{ContainerSpec, SandboxSettings};
use crate::session::{SandboxSession, StageContainer};

/// Directory (relative to the mount point) holding the binary, emissions and input.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Build the staging archive: workspace contents at `.`, an `artifacts/`
/// directory, and `artifacts/input.txt` when `input` is given.
///
/// Symlinks are archived as links and never followed.
pub async fn build_archive(workspace: PathBuf, input: Option<PathBuf>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || pack(&workspace, input.as_deref()))
        .await
        .map_err(|e| Error::transfer(format!("Archive task failed: {}", e)))?
}

fn pack(workspace: &Path, input: Option<&Path>) -> Result<Vec<u8>> {
    let io_err = |e: std::io::Error| Error::transfer(format!("Failed to build staging archive: {}", e));

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", workspace).map_err(io_err)?;

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_size(0);
    dir.set_mode(0o755);
    dir.set_cksum();
    builder
        .append_data(&mut dir, format!("{}/", ARTIFACTS_DIR), std::io::empty())
        .map_err(io_err)?;

    if let Some(input) = input {
        let payload = std::fs::read(input).map_err(io_err)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(
                &mut header,
                format!("{}/{}", ARTIFACTS_DIR, INPUT_FILE),
                payload.as_slice(),
            )
            .map_err(io_err)?;
    }

    builder.into_inner().map_err(io_err)
}

/// Inject a staging archive into the session's storage through a throwaway
/// placer container. Any failure is a [`Error::Transfer`] except a refused
/// launch, which stays a [`Error::ContainerLaunch`].
pub async fn inject(
    session: &SandboxSession,
    settings: &SandboxSettings,
    archive: Vec<u8>,
) -> Result<()> {
    let spec = ContainerSpec::new(
        format!("placer_{}", session.id()),
        &settings.image,
        vec!["sleep".to_string(), "infinity".to_string()],
    )
    .working_dir(&settings.mount_point)
    .bind(session.binding(&settings.mount_point, false))
    .limits(settings);

    // The placer is always removed; only stage containers honor retention
    let placer = StageContainer::launch(session, &spec, true).await?;
    let bytes = archive.len();
    let result = session
        .runtime()
        .put_archive(placer.handle(), &settings.mount_point, archive)
        .await
        .map_err(|e| Error::transfer(format!("Failed to stage workspace: {}", e)));
    placer.release().await;

    result?;
    tracing::debug!(session_id = %session.id(), bytes, "Workspace staged");
    Ok(())
}

/// Extract the single regular file from an archive returned by `get_archive`.
pub fn unpack_single_file(archive: &[u8]) -> Result<Vec<u8>> {
    let bad = |e: std::io::Error| Error::runtime(format!("Invalid artifact archive: {}", e));
    let mut tar = tar::Archive::new(archive);
    for entry in tar.entries().map_err(bad)? {
        let mut entry = entry.map_err(bad)?;
        if entry.header().entry_type().is_file() {
            let mut content = Vec::new();
            entry.read_to_end(&mut content).map_err(bad)?;
            return Ok(content);
        }
    }
    Err(Error::runtime("Artifact archive contains no file"))
}
