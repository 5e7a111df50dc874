#![deny(unused)]
//! Vibebolt - sandboxed compile-and-run service for tool-calling agents.
//!
//! Serves the workspace and build tools over HTTP. Every build runs in
//! ephemeral, network-disabled Docker containers.

use std::sync::Arc;

use vibebolt_core::config::AppConfig;
use vibebolt_core::traits::ToolRegistry;
use vibebolt_gateway::{GatewayConfig, GatewayServer};
use vibebolt_sandbox::{BuildPipeline, ContainerRuntime, DockerRuntime, SandboxSettings};
use vibebolt_skills::DefaultToolRegistry;
use vibebolt_store::{ArtifactCache, LocalWorkspace};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Initialize tracing
    vibebolt_governance::configure_tracing(&config.logging)?;

    tracing::info!("Starting Vibebolt v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = vibebolt_governance::setup_metrics_recorder()?;

    // =========================================================================
    // Workspace Store & Artifact Cache
    // =========================================================================
    let workspace = Arc::new(LocalWorkspace::open(config.workspace.root.clone()).await?);
    let artifacts = ArtifactCache::open(config.workspace.artifact_root.clone()).await?;
    tracing::info!(
        root = %config.workspace.root.display(),
        artifact_root = %config.workspace.artifact_root.display(),
        "Workspace ready"
    );

    // =========================================================================
    // Container Runtime
    // =========================================================================
    let runtime = Arc::new(DockerRuntime::connect()?);
    if !runtime.is_available().await {
        anyhow::bail!("Docker daemon is not reachable; refusing to start without a sandbox");
    }
    let settings = SandboxSettings::from(&config.sandbox);
    tracing::info!(image = %settings.image, mount = %settings.mount_point, "Docker runtime connected");

    // =========================================================================
    // Tools
    // =========================================================================
    let pipeline = Arc::new(BuildPipeline::new(runtime, workspace, artifacts, settings));
    let registry = Arc::new(DefaultToolRegistry::new());
    for tool in vibebolt_sandbox::tools::all_tools(pipeline) {
        registry.register(tool).await?;
    }
    tracing::info!(tools = registry.len(), "Tools registered");

    // =========================================================================
    // Gateway
    // =========================================================================
    let server = GatewayServer::new(GatewayConfig::from(&config.server), registry)
        .with_metrics(metrics_handle);
    server.run().await?;

    Ok(())
}
