//! Container runtime boundary.
//!
//! The pipeline talks to the container engine only through [`ContainerRuntime`].
//! [`crate::docker::DockerRuntime`] implements it against a Docker daemon and
//! [`crate::mock::MockRuntime`] implements it in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use vibebolt_core::config::SandboxSection;
use vibebolt_core::Result;

// =============================================================================
// Runtime Types
// =============================================================================

/// A named volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBinding {
    /// Runtime-managed volume name.
    pub volume: String,
    /// Mount point inside the container.
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to launch one stage container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Unique container name.
    pub name: String,
    pub image: String,
    /// Argument vector; never interpreted by a shell.
    pub cmd: Vec<String>,
    pub working_dir: String,
    pub binds: Vec<VolumeBinding>,
    pub env: Vec<(String, String)>,
    pub network_disabled: bool,
    /// Payload streamed into the process's standard input.
    pub stdin: Option<Vec<u8>>,
    pub memory_limit_bytes: Option<i64>,
    pub pids_limit: Option<i64>,
}

impl ContainerSpec {
    /// Start a network-disabled spec with no binds or environment.
    pub fn new(name: impl Into<String>, image: impl Into<String>, cmd: Vec<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd,
            working_dir: "/".to_string(),
            binds: Vec::new(),
            env: Vec::new(),
            network_disabled: true,
            stdin: None,
            memory_limit_bytes: None,
            pids_limit: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn bind(mut self, binding: VolumeBinding) -> Self {
        self.binds.push(binding);
        self
    }

    pub fn env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn stdin(mut self, payload: Option<Vec<u8>>) -> Self {
        self.stdin = payload;
        self
    }

    /// Apply the resource limits from the sandbox settings.
    pub fn limits(mut self, settings: &SandboxSettings) -> Self {
        self.memory_limit_bytes = Some(settings.memory_limit_bytes);
        self.pids_limit = Some(settings.pids_limit);
        self
    }
}

/// Handle to a launched container.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Runtime-assigned id.
    pub id: String,
    /// Name given at launch.
    pub name: String,
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Process-wide sandbox settings, injected into the pipeline.
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    /// Toolchain image used by every stage.
    pub image: String,
    /// Mount point of session storage inside containers.
    pub mount_point: String,
    /// Prefix for session volume names.
    pub volume_prefix: String,
    /// Upper bound for retrieving one emitted artifact.
    pub extract_timeout: Duration,
    pub memory_limit_bytes: i64,
    pub pids_limit: i64,
}

impl SandboxSettings {
    /// Directory for binaries and emitted artifacts inside containers.
    pub fn artifacts_dir(&self) -> String {
        format!("{}/artifacts", self.mount_point.trim_end_matches('/'))
    }
}

impl From<&SandboxSection> for SandboxSettings {
    fn from(section: &SandboxSection) -> Self {
        Self {
            image: section.image.clone(),
            mount_point: section.mount_point.clone(),
            volume_prefix: section.volume_prefix.clone(),
            extract_timeout: Duration::from_secs(section.extract_timeout_secs),
            memory_limit_bytes: section.memory_limit_bytes,
            pids_limit: section.pids_limit,
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self::from(&SandboxSection::default())
    }
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Operations the sandbox pipeline needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a named storage volume.
    async fn create_volume(&self, name: &str) -> Result<()>;

    /// Remove a named storage volume, forcing removal.
    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Create and start a detached container.
    ///
    /// When the spec carries a stdin payload it is streamed into the process
    /// and the stream closed afterwards.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;

    /// Block until the container reaches a terminal state; returns its exit status.
    async fn wait(&self, handle: &ContainerHandle) -> Result<i64>;

    /// Combined stdout and stderr of the container.
    async fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>>;

    /// Extract a tar archive into `target_dir` inside the container.
    async fn put_archive(&self, handle: &ContainerHandle, target_dir: &str, archive: Vec<u8>)
        -> Result<()>;

    /// Retrieve `path` from the container as a tar archive, or `None` if it does not exist.
    async fn get_archive(&self, handle: &ContainerHandle, path: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the container.
    async fn remove_container(&self, handle: &ContainerHandle, force: bool) -> Result<()>;

    /// Check if the runtime is reachable.
    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let settings = SandboxSettings::default();
        assert_eq!(settings.image, "rust:latest");
        assert_eq!(settings.artifacts_dir(), "/workspace/artifacts");
        assert_eq!(settings.extract_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_spec_builder_defaults_to_no_network() {
        let spec = ContainerSpec::new("c", "img", vec!["true".into()]);
        assert!(spec.network_disabled);
        assert!(spec.binds.is_empty());
        assert!(spec.stdin.is_none());
    }
}
