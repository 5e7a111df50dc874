//! Build tools: `build_and_run` and `get_asm`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use vibebolt_core::traits::Tool;
use vibebolt_core::types::{ToolOutput, ToolRiskLevel};
use vibebolt_core::{Error, Result};

use crate::pipeline::BuildPipeline;
use crate::request::{
    BuildAndRunRequest, BuildAndRunResult, BuildRequest, EmitKind, OptLevel, RunRequest,
};

fn default_true() -> bool {
    true
}

/// Arguments shared by both build tools. Older argument names are accepted as aliases.
#[derive(Debug, Deserialize)]
struct BuildArgs {
    entry: String,
    #[serde(default, alias = "opt_level")]
    optimization_level: OptLevel,
    #[serde(default, alias = "compile_args")]
    compiler_args: Vec<String>,
    #[serde(default)]
    run_args: Vec<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    build_env: BTreeMap<String, String>,
    #[serde(default)]
    run_env: BTreeMap<String, String>,
    #[serde(default)]
    additional_outputs: Vec<EmitKind>,
    #[serde(default = "default_true", alias = "delete_volumes_on_exit")]
    delete_storage_on_exit: bool,
    #[serde(default = "default_true")]
    delete_containers_on_exit: bool,
    /// Accepted for compatibility; has no effect.
    #[serde(default)]
    iterations: Option<u64>,
    /// Accepted for compatibility; has no effect.
    #[serde(default)]
    profile: Option<bool>,
}

impl BuildArgs {
    fn parse(tool: &str, args: Value) -> Result<Self> {
        let parsed: Self = serde_json::from_value(args)
            .map_err(|e| Error::invalid_request(format!("Invalid arguments for {}: {}", tool, e)))?;
        if parsed.iterations.is_some() || parsed.profile.is_some() {
            tracing::debug!(
                tool,
                iterations = ?parsed.iterations,
                profile = ?parsed.profile,
                "Ignoring unsupported iterations/profile arguments"
            );
        }
        Ok(parsed)
    }

    fn into_request(self) -> BuildAndRunRequest {
        BuildAndRunRequest {
            build: BuildRequest {
                entry: self.entry,
                opt_level: self.optimization_level,
                compiler_args: self.compiler_args,
                emit: self.additional_outputs,
                env: self.build_env,
            },
            run: RunRequest {
                args: self.run_args,
                env: self.run_env,
                stdin: self.input,
            },
            skip_run: false,
            delete_storage_on_exit: self.delete_storage_on_exit,
            delete_containers_on_exit: self.delete_containers_on_exit,
        }
    }
}

fn build_schema_properties() -> serde_json::Map<String, Value> {
    let schema = json!({
        "entry": {
            "type": "string",
            "description": "Path of the Rust source file to compile, relative to the workspace root"
        },
        "optimization_level": {
            "type": "string",
            "enum": ["0", "1", "2", "3", "s", "z"],
            "description": "Compiler optimization level (default: \"0\")",
            "default": "0"
        },
        "compiler_args": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Extra rustc flags. Flags controlling --emit, optimization or the output path are rejected."
        },
        "build_env": {
            "type": "object",
            "additionalProperties": { "type": "string" },
            "description": "Environment variables for the compiler"
        },
        "delete_storage_on_exit": {
            "type": "boolean",
            "description": "Remove the session storage after the call (default: true)",
            "default": true
        },
        "delete_containers_on_exit": {
            "type": "boolean",
            "description": "Remove the build and run containers after use (default: true)",
            "default": true
        }
    });
    match schema {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn report_output(result: &BuildAndRunResult, success: bool) -> Result<ToolOutput> {
    let data = serde_json::to_value(result.report())?;
    let content = serde_json::to_string_pretty(&data)?;
    Ok(ToolOutput {
        success,
        content,
        data: Some(data),
    })
}

// =============================================================================
// Build And Run Tool
// =============================================================================

/// Compile the workspace entry file in an isolated container and run the binary.
///
/// Risk level: HIGH.
pub struct BuildAndRunTool {
    pipeline: Arc<BuildPipeline>,
}

impl BuildAndRunTool {
    pub fn new(pipeline: Arc<BuildPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Tool for BuildAndRunTool {
    fn name(&self) -> &str {
        "build_and_run"
    }

    fn description(&self) -> &str {
        "Compile a Rust source file from the workspace with rustc inside a network-disabled \
         container, then run the compiled binary with the given arguments and input. \
         Returns the logs and exit codes of the build and the run."
    }

    fn parameters(&self) -> Value {
        let mut properties = build_schema_properties();
        properties.insert(
            "run_args".into(),
            json!({
                "type": "array",
                "items": { "type": "string" },
                "description": "Arguments passed to the compiled binary"
            }),
        );
        properties.insert(
            "input".into(),
            json!({
                "type": "string",
                "description": "Text piped into the binary's standard input"
            }),
        );
        properties.insert(
            "run_env".into(),
            json!({
                "type": "object",
                "additionalProperties": { "type": "string" },
                "description": "Environment variables for the binary"
            }),
        );
        properties.insert(
            "additional_outputs".into(),
            json!({
                "type": "array",
                "items": { "type": "string", "enum": ["llvm_ir", "asm", "mir"] },
                "description": "Extra compiler artifacts to return"
            }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": ["entry"]
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let request = BuildArgs::parse(self.name(), args)?.into_request();
        let result = self.pipeline.execute(&request).await?;
        report_output(&result, result.succeeded())
    }
}

// =============================================================================
// Get Asm Tool
// =============================================================================

/// Compile the entry file and return every intermediate artifact the compiler produced.
///
/// Risk level: HIGH.
pub struct GetAsmTool {
    pipeline: Arc<BuildPipeline>,
}

impl GetAsmTool {
    pub fn new(pipeline: Arc<BuildPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Tool for GetAsmTool {
    fn name(&self) -> &str {
        "get_asm"
    }

    fn description(&self) -> &str {
        "Compile a Rust source file from the workspace and return its assembly, LLVM IR \
         and MIR. The binary is not run."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": build_schema_properties(),
            "required": ["entry"]
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let mut request = BuildArgs::parse(self.name(), args)?.into_request();
        request.build.emit = EmitKind::ALL.to_vec();
        request.skip_run = true;
        let result = self.pipeline.execute(&request).await?;
        report_output(&result, result.build_succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;
    use crate::runtime::SandboxSettings;
    use vibebolt_core::traits::WorkspaceStore;
    use vibebolt_store::{ArtifactCache, LocalWorkspace};

    async fn pipeline() -> (tempfile::TempDir, Arc<LocalWorkspace>, Arc<BuildPipeline>) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(LocalWorkspace::open(dir.path().join("ws")).await.unwrap());
        let artifacts = ArtifactCache::open(dir.path().join("artifacts")).await.unwrap();
        let pipeline = Arc::new(BuildPipeline::new(
            Arc::new(MockRuntime::default()),
            workspace.clone(),
            artifacts,
            SandboxSettings::default(),
        ));
        (dir, workspace, pipeline)
    }

    #[test]
    fn test_legacy_argument_names() {
        let args = BuildArgs::parse(
            "build_and_run",
            json!({
                "entry": "main.rs",
                "opt_level": "3",
                "compile_args": ["--edition", "2021"],
                "delete_volumes_on_exit": false,
                "iterations": 100,
                "profile": true
            }),
        )
        .unwrap();
        assert_eq!(args.optimization_level, OptLevel::O3);
        assert_eq!(args.compiler_args.len(), 2);
        assert!(!args.delete_storage_on_exit);
        assert!(args.delete_containers_on_exit);
    }

    #[test]
    fn test_bad_arguments_are_invalid_request() {
        let err = BuildArgs::parse("build_and_run", json!({"entry": "main.rs", "optimization_level": "9"}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let err = BuildArgs::parse(
            "build_and_run",
            json!({"entry": "main.rs", "additional_outputs": ["bitcode"]}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_build_and_run_report_shape() {
        let (_dir, workspace, pipeline) = pipeline().await;
        workspace
            .write("main.rs", r#"fn main() { println!("42"); }"#)
            .await
            .unwrap();

        let output = BuildAndRunTool::new(pipeline)
            .execute(json!({"entry": "main.rs", "input": "7"}))
            .await
            .unwrap();
        assert!(output.success);
        let data = output.data.unwrap();
        assert_eq!(data["build_success"], true);
        assert_eq!(data["build_code"], 0);
        assert_eq!(data["run_code"], 0);
        assert!(data["run_logs"].as_str().unwrap().contains("42"));
        assert!(data.get("additional_outputs").is_none());
        assert!(output.content.contains("\"build_success\": true"));
    }

    #[tokio::test]
    async fn test_additional_outputs_with_run() {
        let (_dir, workspace, pipeline) = pipeline().await;
        workspace
            .write("main.rs", r#"fn main() { println!("asm and run"); }"#)
            .await
            .unwrap();

        let output = BuildAndRunTool::new(pipeline)
            .execute(json!({"entry": "main.rs", "additional_outputs": ["asm"]}))
            .await
            .unwrap();
        assert!(output.success);
        let data = output.data.unwrap();
        assert_eq!(data["run_code"], 0);
        assert!(data["run_logs"].as_str().unwrap().contains("asm and run"));
        assert!(data["additional_outputs"]["asm"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_build_failure_reports_without_run() {
        let (_dir, workspace, pipeline) = pipeline().await;
        workspace.write("main.rs", "COMPILE_ERROR").await.unwrap();

        let output = BuildAndRunTool::new(pipeline)
            .execute(json!({"entry": "main.rs"}))
            .await
            .unwrap();
        assert!(!output.success);
        let data = output.data.unwrap();
        assert_eq!(data["build_success"], false);
        assert!(!data["build_logs"].as_str().unwrap().is_empty());
        assert!(data.get("run_code").is_none());
    }

    #[tokio::test]
    async fn test_get_asm_returns_all_emissions_without_run() {
        let (_dir, workspace, pipeline) = pipeline().await;
        workspace.write("main.rs", "fn main() {}").await.unwrap();

        let output = GetAsmTool::new(pipeline)
            .execute(json!({"entry": "main.rs"}))
            .await
            .unwrap();
        assert!(output.success);
        let data = output.data.unwrap();
        let outputs = data["additional_outputs"].as_object().unwrap();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.contains_key("asm"));
        assert!(data.get("run_code").is_none());
    }

    #[tokio::test]
    async fn test_reserved_flag_is_config_conflict() {
        let (_dir, workspace, pipeline) = pipeline().await;
        workspace.write("main.rs", "fn main() {}").await.unwrap();

        let err = BuildAndRunTool::new(pipeline)
            .execute(json!({"entry": "main.rs", "compiler_args": ["--emit=asm"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigConflict(_)));
    }
}
