//! Build pipeline orchestrator.
//!
//! One call to [`BuildPipeline::execute`] owns one [`SandboxSession`]:
//!
//! ```text
//! validate ─▶ session ─▶ stage workspace ─▶ build ─┬─▶ extract (build container) ─▶ release
//!                                                  └─ build failed: stop
//!                                        ─▶ run (unless skipped) ─▶ cleanup (always)
//! ```
//!
//! Validation (containment, reserved flags, environment names) happens before
//! any container or volume exists. Per-stage failures after launch are part of
//! the returned result; only staging and launch failures are errors.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use vibebolt_core::traits::WorkspaceStore;
use vibebolt_core::Result;
use vibebolt_governance::metrics::{track_extraction, track_stage};
use vibebolt_store::ArtifactCache;

use crate::request::{
    env_pairs, normalize_emissions, validate_compiler_args, BuildAndRunRequest, BuildAndRunResult,
    BuildRequest, EmitKind, StageResult,
};
use crate::runtime::{ContainerRuntime, ContainerSpec, SandboxSettings};
use crate::session::{SandboxSession, StageContainer};
use crate::staging::{self, unpack_single_file};

/// Fixed base name of the compiled binary and its emissions.
///
/// The `-o` path carries no extension, so it stays the binary's path even when
/// rustc derives the emission names from it (`a.s`, `a.ll`, `a.mir`).
const BINARY_STEM: &str = "a";

fn binary_path(settings: &SandboxSettings) -> String {
    format!("{}/{}", settings.artifacts_dir(), BINARY_STEM)
}

/// A request that passed validation.
struct ValidatedRequest<'a> {
    request: &'a BuildAndRunRequest,
    entry: String,
    emit: Vec<EmitKind>,
    build_env: Vec<(String, String)>,
    run_env: Vec<(String, String)>,
}

/// Sequences staging, build, extraction and run inside an ephemeral session.
pub struct BuildPipeline {
    runtime: Arc<dyn ContainerRuntime>,
    workspace: Arc<dyn WorkspaceStore>,
    artifacts: ArtifactCache,
    settings: SandboxSettings,
}

impl BuildPipeline {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        workspace: Arc<dyn WorkspaceStore>,
        artifacts: ArtifactCache,
        settings: SandboxSettings,
    ) -> Self {
        Self {
            runtime,
            workspace,
            artifacts,
            settings,
        }
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    pub fn workspace(&self) -> &Arc<dyn WorkspaceStore> {
        &self.workspace
    }

    /// Compile the entry file and (unless skipped or the build failed) run the binary.
    pub async fn execute(&self, request: &BuildAndRunRequest) -> Result<BuildAndRunResult> {
        let validated = self.validate(request)?;

        // The session owns teardown, so a cancelled call still cleans up in order
        let session = SandboxSession::create(
            self.runtime.clone(),
            &self.settings,
            !request.delete_storage_on_exit,
        )
        .await?
        .with_scratch(self.artifacts.clone());
        let span = tracing::info_span!("sandbox_session", session_id = %session.id());
        let outcome = self
            .run_session(&session, &validated)
            .instrument(span)
            .await;

        session.close().await;

        outcome
    }

    fn validate<'a>(&self, request: &'a BuildAndRunRequest) -> Result<ValidatedRequest<'a>> {
        let entry = self
            .workspace
            .root()
            .to_container_path(&request.build.entry)?;
        validate_compiler_args(&request.build.compiler_args)?;
        let build_env = env_pairs(&request.build.env)?;
        let run_env = env_pairs(&request.run.env)?;

        Ok(ValidatedRequest {
            request,
            entry,
            emit: normalize_emissions(request.build.emit.iter().copied()),
            build_env,
            run_env,
        })
    }

    async fn run_session(
        &self,
        session: &SandboxSession,
        validated: &ValidatedRequest<'_>,
    ) -> Result<BuildAndRunResult> {
        let request = validated.request;

        // Stage workspace (and stdin payload) into session storage
        let input = match &request.run.stdin {
            Some(payload) => Some(self.artifacts.write_input(session.id(), payload).await?),
            None => {
                self.artifacts.prepare(session.id()).await?;
                None
            }
        };
        let archive =
            staging::build_archive(self.workspace.root().path().to_path_buf(), input).await?;
        staging::inject(session, &self.settings, archive).await?;

        // Build, then extract from the stopped build container before releasing it
        let build_spec = ContainerSpec::new(
            session.container_name("build"),
            &self.settings.image,
            build_command(&validated.entry, &request.build, &validated.emit, &self.settings),
        )
        .working_dir(&self.settings.mount_point)
        .bind(session.binding(&self.settings.mount_point, false))
        .env(validated.build_env.clone())
        .limits(&self.settings);

        let started = Instant::now();
        let container = StageContainer::launch(
            session,
            &build_spec,
            request.delete_containers_on_exit,
        )
        .await?;
        let build = container.collect().await;
        track_stage("build", build.exit_code, started.elapsed().as_secs_f64());
        tracing::info!(session_id = %session.id(), stage = "build", exit_code = build.exit_code, "Build finished");

        let extracted = if build.succeeded() && !validated.emit.is_empty() {
            Some(self.extract(&container, &validated.emit).await)
        } else {
            None
        };
        container.release().await;

        if !build.succeeded() {
            return Ok(BuildAndRunResult {
                build,
                run: None,
                extracted,
            });
        }

        let run = if request.skip_run {
            None
        } else {
            Some(self.run_binary(session, validated).await?)
        };

        Ok(BuildAndRunResult {
            build,
            run,
            extracted,
        })
    }

    async fn run_binary(
        &self,
        session: &SandboxSession,
        validated: &ValidatedRequest<'_>,
    ) -> Result<StageResult> {
        let run = &validated.request.run;
        let mut cmd = vec![binary_path(&self.settings)];
        cmd.extend(run.args.iter().cloned());

        let spec = ContainerSpec::new(session.container_name("run"), &self.settings.image, cmd)
            .working_dir(&self.settings.mount_point)
            .bind(session.binding(&self.settings.mount_point, false))
            .env(validated.run_env.clone())
            .stdin(run.stdin.as_ref().map(|s| s.clone().into_bytes()))
            .limits(&self.settings);

        let started = Instant::now();
        let container = StageContainer::launch(
            session,
            &spec,
            validated.request.delete_containers_on_exit,
        )
        .await?;
        let result = container.collect().await;
        container.release().await;

        track_stage("run", result.exit_code, started.elapsed().as_secs_f64());
        tracing::info!(session_id = %session.id(), stage = "run", exit_code = result.exit_code, "Run finished");
        Ok(result)
    }

    /// Retrieve each requested emission; misses are logged and omitted.
    async fn extract(&self, container: &StageContainer, kinds: &[EmitKind]) -> BTreeMap<String, String> {
        let mut outputs = BTreeMap::new();
        for kind in kinds {
            let path = format!("{}{}", binary_path(&self.settings), kind.suffix());
            let retrieved = tokio::time::timeout(
                self.settings.extract_timeout,
                self.runtime.get_archive(container.handle(), &path),
            )
            .await;

            let text = match retrieved {
                Ok(Ok(Some(archive))) => unpack_single_file(&archive).and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|e| {
                        vibebolt_core::Error::runtime(format!("Artifact is not UTF-8: {}", e))
                    })
                }),
                Ok(Ok(None)) => {
                    tracing::warn!(kind = kind.key(), path = %path, "Requested artifact was not produced");
                    track_extraction(kind.key(), false);
                    continue;
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(vibebolt_core::Error::runtime(format!(
                    "Timed out after {:?}",
                    self.settings.extract_timeout
                ))),
            };

            match text {
                Ok(text) => {
                    track_extraction(kind.key(), true);
                    outputs.insert(kind.key().to_string(), text);
                }
                Err(e) => {
                    tracing::warn!(kind = kind.key(), path = %path, error = %e, "Failed to extract artifact");
                    track_extraction(kind.key(), false);
                }
            }
        }
        outputs
    }
}

/// `rustc <entry> -o <artifacts>/a -C opt-level=<lvl> <args…> [--emit=link,<kinds…>]`
fn build_command(
    entry: &str,
    build: &BuildRequest,
    emit: &[EmitKind],
    settings: &SandboxSettings,
) -> Vec<String> {
    let mut cmd = vec![
        "rustc".to_string(),
        entry.to_string(),
        "-o".to_string(),
        binary_path(settings),
        "-C".to_string(),
        format!("opt-level={}", build.opt_level),
    ];
    cmd.extend(build.compiler_args.iter().cloned());
    if !emit.is_empty() {
        let kinds: Vec<&str> = emit.iter().map(EmitKind::rustc_name).collect();
        cmd.push(format!("--emit=link,{}", kinds.join(",")));
    }
    cmd
}
