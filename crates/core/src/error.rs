//! Error types for Vibebolt.

use thiserror::Error;

/// Result type alias using Vibebolt's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Vibebolt.
///
/// A non-zero compiler or program exit status is not an error: it is reported
/// through the stage result. Only conditions that prevent the pipeline from
/// producing a result are represented here.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Validation (fail before any I/O)
    // =========================================================================
    #[error("Path escapes workspace: {0}")]
    PathEscape(String),

    #[error("Conflicting compiler configuration: {0}")]
    ConfigConflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    #[error("Staging transfer failed: {0}")]
    Transfer(String),

    #[error("Container launch failed: {0}")]
    ContainerLaunch(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    // =========================================================================
    // Tool Errors
    // =========================================================================
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a path escape error.
    pub fn path_escape(msg: impl Into<String>) -> Self {
        Self::PathEscape(msg.into())
    }

    /// Create a configuration conflict error.
    pub fn config_conflict(msg: impl Into<String>) -> Self {
        Self::ConfigConflict(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a staging transfer error.
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a container launch error.
    pub fn container_launch(msg: impl Into<String>) -> Self {
        Self::ContainerLaunch(msg.into())
    }

    /// Create a container runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create a tool execution error.
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::PathEscape(_) | Self::ConfigConflict(_) | Self::InvalidRequest(_)
        )
    }
}
