//! Sandbox integration tests.
//!
//! Drives the public tool surface end to end: Tool → BuildPipeline →
//! ContainerRuntime (MockRuntime). Docker is not required.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use vibebolt_core::traits::Tool;
use vibebolt_core::types::ToolRiskLevel;
use vibebolt_core::Error;
use vibebolt_sandbox::mock::RuntimeCall;
use vibebolt_sandbox::{tools, BuildPipeline, MockRuntime, SandboxSettings};
use vibebolt_store::{ArtifactCache, LocalWorkspace};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    _dir: tempfile::TempDir,
    runtime: Arc<MockRuntime>,
    tools: HashMap<String, Box<dyn Tool>>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MockRuntime::default());
        let workspace = Arc::new(LocalWorkspace::open(dir.path().join("workspace")).await.unwrap());
        let artifacts = ArtifactCache::open(dir.path().join("artifacts")).await.unwrap();
        let pipeline = Arc::new(BuildPipeline::new(
            runtime.clone(),
            workspace,
            artifacts,
            SandboxSettings::default(),
        ));
        let tools = tools::all_tools(pipeline)
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        Self {
            _dir: dir,
            runtime,
            tools,
        }
    }

    async fn call(&self, name: &str, args: serde_json::Value) -> vibebolt_core::Result<vibebolt_core::types::ToolOutput> {
        self.tools[name].execute(args).await
    }
}

// =============================================================================
// 1. Tool surface
// =============================================================================

#[tokio::test]
async fn test_all_tools_registered_with_risk_levels() {
    let h = Harness::new().await;
    let expected = [
        ("read_file", ToolRiskLevel::Low),
        ("write_file", ToolRiskLevel::Medium),
        ("delete_file", ToolRiskLevel::Medium),
        ("list_files", ToolRiskLevel::Low),
        ("reset_workspace", ToolRiskLevel::High),
        ("build_and_run", ToolRiskLevel::High),
        ("get_asm", ToolRiskLevel::High),
    ];
    assert_eq!(h.tools.len(), expected.len());
    for (name, risk) in expected {
        let tool = &h.tools[name];
        assert_eq!(tool.risk_level(), risk, "{}", name);
        assert_eq!(tool.parameters()["type"], "object");
    }
}

// =============================================================================
// 2. Edit, build and run
// =============================================================================

#[tokio::test]
async fn test_edit_build_run_cycle() {
    let h = Harness::new().await;
    h.call(
        "write_file",
        json!({"path": "src/main.rs", "content": "fn main() { println!(\"sum ready\"); }"}),
    )
    .await
    .unwrap();

    let output = h
        .call(
            "build_and_run",
            json!({
                "entry": "src/main.rs",
                "optimization_level": "2",
                "run_args": ["1", "2"],
                "input": "10 20",
                "run_env": {"VIBEBOLT_TRACE": "1"}
            }),
        )
        .await
        .unwrap();

    assert!(output.success);
    let data = output.data.unwrap();
    let run_logs = data["run_logs"].as_str().unwrap();
    assert!(run_logs.contains("sum ready"));
    assert!(run_logs.contains("stdin=10 20"));
    assert!(run_logs.contains("env VIBEBOLT_TRACE=1"));

    // The build received the optimization flag and the nested entry path
    let build = h
        .runtime
        .launched()
        .into_iter()
        .find(|spec| spec.name.starts_with("build_container_"))
        .unwrap();
    assert_eq!(build.cmd[1], "src/main.rs");
    assert!(build.cmd.contains(&"opt-level=2".to_string()));
    assert!(build.network_disabled);

    assert!(h.runtime.volumes().is_empty());
    assert!(h.runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_failing_program_reports_exit_code() {
    let h = Harness::new().await;
    h.call(
        "write_file",
        json!({"path": "main.rs", "content": "fn main() { std::process::exit(2) } // EXIT_CODE=2"}),
    )
    .await
    .unwrap();

    let output = h.call("build_and_run", json!({"entry": "main.rs"})).await.unwrap();
    assert!(!output.success);
    let data = output.data.unwrap();
    assert_eq!(data["build_success"], true);
    assert_eq!(data["run_code"], 2);
}

// =============================================================================
// 3. Rejections happen before any container exists
// =============================================================================

#[tokio::test]
async fn test_rejections_touch_no_runtime() {
    let h = Harness::new().await;
    h.call("write_file", json!({"path": "main.rs", "content": "fn main() {}"}))
        .await
        .unwrap();

    let err = h
        .call("build_and_run", json!({"entry": "../outside.rs"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PathEscape(_)));

    let err = h
        .call(
            "get_asm",
            json!({"entry": "main.rs", "compiler_args": ["-C", "opt-level=3"]}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConfigConflict(_)));

    let err = h
        .call(
            "build_and_run",
            json!({"entry": "main.rs", "build_env": {"": "x"}}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));

    assert!(h.runtime.calls().is_empty());
}

// =============================================================================
// 4. Reset
// =============================================================================

#[tokio::test]
async fn test_reset_empties_workspace() {
    let h = Harness::new().await;
    h.call("write_file", json!({"path": "a/b/c.rs", "content": "x"}))
        .await
        .unwrap();
    h.call("reset_workspace", json!({})).await.unwrap();

    let output = h.call("list_files", json!({"dir": ""})).await.unwrap();
    assert_eq!(output.data.unwrap()["entries"], json!([]));
}

// =============================================================================
// 5. Storage retention
// =============================================================================

#[tokio::test]
async fn test_retained_storage_survives_call() {
    let h = Harness::new().await;
    h.call("write_file", json!({"path": "main.rs", "content": "fn main() {}"}))
        .await
        .unwrap();

    h.call(
        "get_asm",
        json!({"entry": "main.rs", "delete_storage_on_exit": false}),
    )
    .await
    .unwrap();

    assert_eq!(h.runtime.volumes().len(), 1);
    assert!(!h
        .runtime
        .calls()
        .iter()
        .any(|call| matches!(call, RuntimeCall::RemoveVolume(_))));
}
