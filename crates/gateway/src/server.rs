//! Axum-based HTTP server for the tool-call gateway.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use vibebolt_core::{
    config::ServerConfig,
    traits::ToolRegistry,
    types::{ToolDefinition, ToolOutput},
    Error, Result,
};
use vibebolt_governance::track_request;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Enable CORS.
    pub enable_cors: bool,
    /// Enable request tracing.
    pub enable_tracing: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            ..Default::default()
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// Registered tools.
    pub registry: Arc<dyn ToolRegistry>,
}

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig, registry: Arc<dyn ToolRegistry>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { registry }),
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/v1/tools", get(list_tools_handler))
            .route("/v1/tools/:name", post(tool_call_handler))
            .with_state(self.state.clone());

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        if self.config.enable_cors {
            router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));
        }

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::internal(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = %addr, "Gateway server starting");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
}

/// Tool listing response.
#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDefinition>,
}

/// Tool call response.
#[derive(Debug, Serialize)]
pub struct ToolCallResponse {
    /// Trace ID for this call.
    pub trace_id: String,
    /// Tool name.
    pub tool: String,
    /// Tool output.
    pub output: ToolOutput,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Trace ID.
    pub trace_id: Option<String>,
}

/// HTTP status and machine-readable code for an error.
fn classify(error: &Error) -> (StatusCode, &'static str) {
    match error {
        Error::ToolNotFound(_) => (StatusCode::NOT_FOUND, "tool_not_found"),
        Error::PathEscape(_) => (StatusCode::BAD_REQUEST, "path_escape"),
        Error::ConfigConflict(_) => (StatusCode::BAD_REQUEST, "config_conflict"),
        Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        Error::Transfer(_) => (StatusCode::INTERNAL_SERVER_ERROR, "transfer_failed"),
        Error::ContainerLaunch(_) => (StatusCode::INTERNAL_SERVER_ERROR, "container_launch_failed"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List tool definitions.
async fn list_tools_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.list().await {
        Ok(tools) => Json(ToolListResponse { tools }).into_response(),
        Err(e) => {
            let (status, code) = classify(&e);
            (
                status,
                Json(ErrorResponse {
                    code: code.to_string(),
                    message: e.to_string(),
                    trace_id: None,
                }),
            )
                .into_response()
        }
    }
}

/// Execute one tool call.
async fn tool_call_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(args): Json<serde_json::Value>,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let started = Instant::now();
    tracing::info!(trace_id = %trace_id, tool = %name, "Tool call received");

    let (status, response) = match state.registry.execute(&name, args).await {
        Ok(output) => (
            StatusCode::OK,
            Json(ToolCallResponse {
                trace_id,
                tool: name.clone(),
                output,
            })
            .into_response(),
        ),
        Err(e) => {
            let (status, code) = classify(&e);
            if status.is_server_error() {
                tracing::error!(trace_id = %trace_id, tool = %name, error = %e, "Tool call failed");
            } else {
                tracing::warn!(trace_id = %trace_id, tool = %name, error = %e, "Tool call rejected");
            }
            (
                status,
                (
                    status,
                    Json(ErrorResponse {
                        code: code.to_string(),
                        message: e.to_string(),
                        trace_id: Some(trace_id),
                    }),
                )
                    .into_response(),
            )
        }
    };

    track_request(&name, status.as_u16(), started.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify(&Error::tool_not_found("x")).0, StatusCode::NOT_FOUND);
        assert_eq!(classify(&Error::path_escape("../x")).0, StatusCode::BAD_REQUEST);
        assert_eq!(classify(&Error::config_conflict("-O")).1, "config_conflict");
        assert_eq!(
            classify(&Error::transfer("upload failed")).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
