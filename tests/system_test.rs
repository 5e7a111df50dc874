//! End-to-end system tests: configuration → workspace → pipeline → registry →
//! gateway, with the in-memory container runtime standing in for Docker.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use vibebolt_core::config::AppConfig;
use vibebolt_core::traits::ToolRegistry;
use vibebolt_gateway::{GatewayConfig, GatewayServer};
use vibebolt_sandbox::{tools, BuildPipeline, MockRuntime, SandboxSettings};
use vibebolt_skills::DefaultToolRegistry;
use vibebolt_store::{ArtifactCache, LocalWorkspace};

struct System {
    _dir: tempfile::TempDir,
    runtime: Arc<MockRuntime>,
    app: Router,
}

async fn system() -> System {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.workspace.root = dir.path().join("workspace");
    config.workspace.artifact_root = dir.path().join("artifacts");
    config.sandbox.volume_prefix = "system_test".into();

    let workspace = Arc::new(LocalWorkspace::open(config.workspace.root.clone()).await.unwrap());
    let artifacts = ArtifactCache::open(config.workspace.artifact_root.clone()).await.unwrap();
    let runtime = Arc::new(MockRuntime::default());
    let pipeline = Arc::new(BuildPipeline::new(
        runtime.clone(),
        workspace,
        artifacts,
        SandboxSettings::from(&config.sandbox),
    ));

    let registry = Arc::new(DefaultToolRegistry::new());
    for tool in tools::all_tools(pipeline) {
        registry.register(tool).await.unwrap();
    }
    let app = GatewayServer::new(GatewayConfig::from(&config.server), registry).build_router();

    System {
        _dir: dir,
        runtime,
        app,
    }
}

async fn post(app: &Router, tool: &str, args: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/v1/tools/{}", tool))
        .header("content-type", "application/json")
        .body(Body::from(args.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_full_session_over_http() {
    let sys = system().await;

    let (status, _) = post(
        &sys.app,
        "write_file",
        json!({"path": "src/main.rs", "content": "fn main() { println!(\"ready\"); }"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &sys.app,
        "build_and_run",
        json!({
            "entry": "src/main.rs",
            "opt_level": 1,
            "run_args": ["x"],
            "additional_outputs": ["asm"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["output"]["data"];
    assert_eq!(data["build_success"], true);
    assert_eq!(data["run_code"], 0);
    assert!(data["additional_outputs"]["asm"].is_string());

    // Configured volume prefix flows through to the runtime
    assert!(sys
        .runtime
        .calls()
        .iter()
        .any(|call| format!("{:?}", call).contains("system_test_")));
    assert!(sys.runtime.volumes().is_empty());

    let (status, _) = post(&sys.app, "reset_workspace", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = post(&sys.app, "list_files", json!({})).await;
    assert_eq!(body["output"]["data"]["entries"], json!([]));
}

#[tokio::test]
async fn test_concurrent_calls_are_isolated() {
    let sys = system().await;
    post(
        &sys.app,
        "write_file",
        json!({"path": "main.rs", "content": "fn main() {}"}),
    )
    .await;

    let calls = (0..4).map(|i| {
        let app = sys.app.clone();
        async move {
            let (_, body) = post(
                &app,
                "build_and_run",
                json!({"entry": "main.rs", "input": format!("payload-{}", i)}),
            )
            .await;
            (i, body)
        }
    });

    for (i, body) in spawn_all(calls).await {
        let logs = body["output"]["data"]["run_logs"].as_str().unwrap().to_string();
        assert!(logs.contains(&format!("stdin=payload-{}", i)));
        for other in (0..4).filter(|o| *o != i) {
            assert!(!logs.contains(&format!("payload-{}", other)));
        }
    }
    assert!(sys.runtime.volumes().is_empty());
    assert!(sys.runtime.live_containers().is_empty());
}

async fn spawn_all<F: std::future::Future>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
where
    F: Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut outputs = Vec::new();
    for handle in handles {
        outputs.push(handle.await.unwrap());
    }
    outputs
}
