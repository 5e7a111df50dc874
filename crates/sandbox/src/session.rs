//! Scoped sandbox resources.
//!
//! A [`SandboxSession`] owns one session volume, the host-side scratch
//! directory of the call and every [`StageContainer`] launched into it.
//! Containers are released by the consuming [`StageContainer::release`] and
//! the session by [`SandboxSession::close`], so release happens at most once.
//!
//! A value dropped without being released (panic, cancelled future) leaves
//! teardown to its session: the session schedules a single task on the
//! current tokio runtime that removes unreleased containers first, then the
//! volume, then the scratch directory. Docker refuses to remove a volume that
//! a container still references, so the order matters.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use vibebolt_core::{Error, Result};
use vibebolt_store::ArtifactCache;

use crate::request::StageResult;
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, SandboxSettings, VolumeBinding};

/// Containers launched into a session and not yet released.
///
/// `None` once the session has started its teardown.
type Unreleased = Arc<Mutex<Option<Vec<ContainerHandle>>>>;

fn lock(unreleased: &Unreleased) -> MutexGuard<'_, Option<Vec<ContainerHandle>>> {
    unreleased.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything a session still has to remove, in removal order.
struct Teardown {
    session_id: String,
    runtime: Arc<dyn ContainerRuntime>,
    containers: Vec<ContainerHandle>,
    volume: Option<String>,
    scratch: Option<ArtifactCache>,
}

impl Teardown {
    /// Failures are logged, never returned.
    async fn run(self) {
        for container in &self.containers {
            tracing::warn!(session_id = %self.session_id, container = %container, "Removing unreleased stage container");
            if let Err(e) = self.runtime.remove_container(container, true).await {
                tracing::warn!(container = %container, error = %e, "Failed to remove stage container");
            }
        }

        if let Some(volume) = &self.volume {
            if let Err(e) = self.runtime.remove_volume(volume).await {
                tracing::warn!(session_id = %self.session_id, volume = %volume, error = %e, "Failed to remove session storage");
            }
        }

        if let Some(scratch) = &self.scratch {
            if let Err(e) = scratch.remove(&self.session_id).await {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to remove artifact directory");
            }
        }
    }
}

// =============================================================================
// Sandbox Session
// =============================================================================

/// One invocation's isolated storage volume plus its identifier.
pub struct SandboxSession {
    session_id: String,
    volume: String,
    created_at: DateTime<Utc>,
    retain: bool,
    runtime: Arc<dyn ContainerRuntime>,
    scratch: Option<ArtifactCache>,
    unreleased: Unreleased,
    released: bool,
}

impl SandboxSession {
    /// Allocate a fresh, uniquely named storage volume.
    ///
    /// With `retain` set, the volume survives [`SandboxSession::close`].
    pub async fn create(
        runtime: Arc<dyn ContainerRuntime>,
        settings: &SandboxSettings,
        retain: bool,
    ) -> Result<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let volume = format!("{}_{}", settings.volume_prefix, session_id);

        runtime.create_volume(&volume).await.map_err(|e| {
            Error::container_launch(format!("Failed to allocate session storage: {}", e))
        })?;

        tracing::info!(session_id = %session_id, volume = %volume, "Sandbox session created");

        Ok(Self {
            session_id,
            volume,
            created_at: Utc::now(),
            retain,
            runtime,
            scratch: None,
            unreleased: Arc::new(Mutex::new(Some(Vec::new()))),
            released: false,
        })
    }

    /// Remove this session's directory in `cache` when the session ends.
    pub fn with_scratch(mut self, cache: ArtifactCache) -> Self {
        self.scratch = Some(cache);
        self
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Bind the session volume at `target`.
    pub fn binding(&self, target: &str, read_only: bool) -> VolumeBinding {
        VolumeBinding {
            volume: self.volume.clone(),
            target: target.to_string(),
            read_only,
        }
    }

    /// Container name for a stage of this session, e.g. `build_container_<id>`.
    pub fn container_name(&self, stage: &str) -> String {
        format!("{}_container_{}", stage, self.session_id)
    }

    fn teardown(&mut self) -> Teardown {
        self.released = true;
        Teardown {
            session_id: self.session_id.clone(),
            runtime: self.runtime.clone(),
            containers: lock(&self.unreleased).take().unwrap_or_default(),
            volume: (!self.retain).then(|| self.volume.clone()),
            scratch: self.scratch.take(),
        }
    }

    /// Release the session: unreleased containers, then storage (unless
    /// retained), then the scratch directory. Failures are logged, never returned.
    pub async fn close(mut self) {
        let age_ms = (Utc::now() - self.created_at).num_milliseconds();
        let teardown = self.teardown();
        teardown.run().await;

        if self.retain {
            tracing::info!(session_id = %self.session_id, volume = %self.volume, age_ms, "Session storage retained");
        } else {
            tracing::info!(session_id = %self.session_id, age_ms, "Sandbox session closed");
        }
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!(session_id = %self.session_id, "Session dropped without close, scheduling teardown");
        let teardown = self.teardown();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(teardown.run());
        }
    }
}

// =============================================================================
// Stage Container
// =============================================================================

/// A launched stage container that must be released after use.
pub struct StageContainer {
    handle: ContainerHandle,
    runtime: Arc<dyn ContainerRuntime>,
    unreleased: Unreleased,
    remove_on_release: bool,
    launched_at: Instant,
    released: bool,
}

impl StageContainer {
    /// Launch a container into `session`; a runtime refusal is a [`Error::ContainerLaunch`].
    ///
    /// Until released, a removable container is tracked by the session and
    /// removed by the session's teardown.
    pub async fn launch(
        session: &SandboxSession,
        spec: &ContainerSpec,
        remove_on_release: bool,
    ) -> Result<Self> {
        let runtime = session.runtime.clone();
        let handle = runtime.run_container(spec).await.map_err(|e| match e {
            Error::ContainerLaunch(_) => e,
            other => Error::container_launch(other.to_string()),
        })?;
        tracing::debug!(container = %handle, cmd = ?spec.cmd, "Stage container launched");

        if remove_on_release {
            if let Some(tracked) = lock(&session.unreleased).as_mut() {
                tracked.push(handle.clone());
            }
        }
        Ok(Self {
            handle,
            runtime,
            unreleased: session.unreleased.clone(),
            remove_on_release,
            launched_at: Instant::now(),
            released: false,
        })
    }

    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    /// Block until the container terminates and collect its exit status and logs.
    ///
    /// Runtime failures after launch are folded into the result.
    pub async fn collect(&self) -> StageResult {
        let exit_code = match self.runtime.wait(&self.handle).await {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(container = %self.handle, error = %e, "Wait failed");
                return StageResult {
                    exit_code: -1,
                    combined_log: format!("[sandbox error: {}]", e),
                };
            }
        };

        let combined_log = match self.runtime.logs(&self.handle).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!(container = %self.handle, error = %e, "Log collection failed");
                format!("[sandbox error: {}]", e)
            }
        };

        tracing::debug!(
            container = %self.handle,
            exit_code,
            elapsed_ms = self.launched_at.elapsed().as_millis() as u64,
            "Stage container finished"
        );
        StageResult {
            exit_code,
            combined_log,
        }
    }

    /// Stop tracking this container. Returns false when the session has
    /// already taken it over for teardown.
    fn untrack(&self) -> bool {
        match lock(&self.unreleased).as_mut() {
            Some(tracked) => {
                tracked.retain(|h| h.id != self.handle.id);
                true
            }
            None => false,
        }
    }

    /// Remove the container (unless retained). Failures are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        if !self.remove_on_release {
            tracing::info!(container = %self.handle, "Stage container retained");
            return;
        }
        if !self.untrack() {
            return;
        }
        if let Err(e) = self.runtime.remove_container(&self.handle, true).await {
            tracing::warn!(container = %self.handle, error = %e, "Failed to remove stage container");
        }
    }
}

impl Drop for StageContainer {
    fn drop(&mut self) {
        if self.released || !self.remove_on_release {
            return;
        }
        // Still tracked: the session's teardown removes it before the volume
        tracing::warn!(container = %self.handle, "Stage container dropped without release, left to session teardown");
    }
}
