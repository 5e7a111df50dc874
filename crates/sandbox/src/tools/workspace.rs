//! Workspace file tools.
//!
//! Thin wrappers over [`WorkspaceStore`]; the store applies the containment
//! guard to every path before touching the filesystem.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use vibebolt_core::traits::{Tool, WorkspaceStore};
use vibebolt_core::types::{ToolOutput, ToolRiskLevel};
use vibebolt_core::{Error, Result};

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::invalid_request(format!("{} is required", key)))
}

// =============================================================================
// Read File Tool
// =============================================================================

/// Read a workspace file as text.
///
/// Risk level: LOW.
pub struct ReadFileTool {
    store: Arc<dyn WorkspaceStore>,
}

impl ReadFileTool {
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the content of a file in the workspace. Path is relative to the workspace root."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace root (e.g. 'src/main.rs')"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = required_str(&args, "path")?;
        let content = self.store.read(path).await?;
        Ok(ToolOutput::text(content))
    }
}

// =============================================================================
// Write File Tool
// =============================================================================

/// Write (create or overwrite) a workspace file.
///
/// Risk level: MEDIUM.
pub struct WriteFileTool {
    store: Arc<dyn WorkspaceStore>,
}

impl WriteFileTool {
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, creating parent directories as needed. \
         Existing files are overwritten."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The file content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::Medium
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        self.store.write(path, content).await?;
        Ok(ToolOutput::text(format!("File written: {} ({} bytes)", path, content.len()))
            .with_data(json!({ "path": path, "bytes": content.len() })))
    }
}

// =============================================================================
// Delete File Tool
// =============================================================================

/// Delete a workspace file.
///
/// Risk level: MEDIUM.
pub struct DeleteFileTool {
    store: Arc<dyn WorkspaceStore>,
}

impl DeleteFileTool {
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from the workspace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace root"
                }
            },
            "required": ["path"]
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::Medium
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = required_str(&args, "path")?;
        self.store.delete(path).await?;
        Ok(ToolOutput::text(format!("File deleted: {}", path)))
    }
}

// =============================================================================
// List Files Tool
// =============================================================================

/// List the entries of a workspace directory.
///
/// Risk level: LOW.
pub struct ListFilesTool {
    store: Arc<dyn WorkspaceStore>,
}

impl ListFilesTool {
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories in a workspace directory."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dir": {
                    "type": "string",
                    "description": "Directory relative to the workspace root (default: the root)",
                    "default": ""
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let dir = args.get("dir").and_then(|v| v.as_str()).unwrap_or("");
        let entries = self.store.list(dir).await?;
        Ok(ToolOutput::text(entries.join("\n")).with_data(json!({ "entries": entries })))
    }
}

// =============================================================================
// Reset Workspace Tool
// =============================================================================

/// Delete every file and directory in the workspace.
///
/// Risk level: HIGH.
pub struct ResetWorkspaceTool {
    store: Arc<dyn WorkspaceStore>,
}

impl ResetWorkspaceTool {
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ResetWorkspaceTool {
    fn name(&self) -> &str {
        "reset_workspace"
    }

    fn description(&self) -> &str {
        "Delete all files and directories in the workspace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::High
    }

    async fn execute(&self, _args: Value) -> Result<ToolOutput> {
        self.store.reset().await?;
        Ok(ToolOutput::text("Workspace reset"))
    }
}
