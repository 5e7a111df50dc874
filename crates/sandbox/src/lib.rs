#![deny(unused)]
//! Sandboxed compile-and-run pipeline for Vibebolt.
//!
//! Source files staged in the workspace are compiled by `rustc` inside a
//! network-disabled Docker container, and the binary is run in a second
//! container. Both share one ephemeral storage volume per invocation, which
//! is removed when the invocation ends.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Tools (build_and_run, get_asm, ...)   │
//! │    ↓ BuildAndRunRequest                │
//! ├────────────────────────────────────────┤
//! │  BuildPipeline                         │
//! │    session → staging → build → run     │
//! ├────────────────────────────────────────┤
//! │  ContainerRuntime (DockerRuntime)      │
//! │    ↓ Docker API via bollard            │
//! ├────────────────────────────────────────┤
//! │  Stage containers (isolated)           │
//! │    /workspace  (session volume)        │
//! │    No network, no caps                 │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use vibebolt_sandbox::{BuildPipeline, DockerRuntime, SandboxSettings};
//!
//! let runtime = Arc::new(DockerRuntime::connect()?);
//! let pipeline = Arc::new(BuildPipeline::new(runtime, workspace, artifacts, SandboxSettings::default()));
//!
//! for tool in vibebolt_sandbox::tools::all_tools(pipeline) {
//!     registry.register(tool).await?;
//! }
//! ```

pub mod docker;
pub mod mock;
pub mod pipeline;
pub mod request;
pub mod runtime;
pub mod session;
pub mod staging;
pub mod tools;

pub use docker::DockerRuntime;
pub use mock::{MockOutcome, MockRuntime, ToolchainSimulator};
pub use pipeline::BuildPipeline;
pub use request::{
    BuildAndRunReport, BuildAndRunRequest, BuildAndRunResult, BuildRequest, EmitKind, OptLevel,
    RunRequest, StageResult,
};
pub use runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, SandboxSettings, VolumeBinding};
pub use session::{SandboxSession, StageContainer};
