//! Tool-call boundary implementing the `Tool` trait.
//!
//! - Workspace tools (`read_file`, `write_file`, `delete_file`, `list_files`,
//!   `reset_workspace`) operate on the durable [`WorkspaceStore`].
//! - Build tools (`build_and_run`, `get_asm`) drive the [`BuildPipeline`].

pub mod build;
pub mod workspace;

pub use build::{BuildAndRunTool, GetAsmTool};
pub use workspace::{DeleteFileTool, ListFilesTool, ReadFileTool, ResetWorkspaceTool, WriteFileTool};

use std::sync::Arc;

use vibebolt_core::traits::{Tool, WorkspaceStore};

use crate::pipeline::BuildPipeline;

/// Every tool the service exposes, wired to one workspace and one pipeline.
pub fn all_tools(pipeline: Arc<BuildPipeline>) -> Vec<Box<dyn Tool>> {
    let store: Arc<dyn WorkspaceStore> = pipeline.workspace().clone();
    vec![
        Box::new(ReadFileTool::new(store.clone())),
        Box::new(WriteFileTool::new(store.clone())),
        Box::new(DeleteFileTool::new(store.clone())),
        Box::new(ListFilesTool::new(store.clone())),
        Box::new(ResetWorkspaceTool::new(store)),
        Box::new(BuildAndRunTool::new(pipeline.clone())),
        Box::new(GetAsmTool::new(pipeline)),
    ]
}
