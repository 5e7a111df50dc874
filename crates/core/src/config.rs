//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then optional
//! `config/default`, `config/{VIBEBOLT_ENV}` and `config/local` files, then
//! `VIBEBOLT__SECTION__KEY` environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub sandbox: SandboxSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Host-side directories.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkspaceConfig {
    /// Durable source tree exposed to the tools.
    pub root: PathBuf,
    /// Transient per-session artifact area (stdin payloads).
    pub artifact_root: PathBuf,
}

/// Container settings for the compile-and-run pipeline.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SandboxSection {
    /// Toolchain image used by every stage.
    pub image: String,
    /// Where session storage is mounted inside each container.
    pub mount_point: String,
    /// Prefix for session volume names.
    pub volume_prefix: String,
    /// Upper bound for retrieving one emitted artifact.
    pub extract_timeout_secs: u64,
    pub memory_limit_bytes: i64,
    pub pids_limit: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("VIBEBOLT_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map VIBEBOLT__SERVER__PORT=9000 to server.port
            .add_source(Environment::with_prefix("VIBEBOLT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
            },
            workspace: WorkspaceConfig {
                root: PathBuf::from("/tmp/vibebolt/workspace"),
                artifact_root: PathBuf::from("/tmp/vibebolt/artifacts"),
            },
            sandbox: SandboxSection::default(),
            logging: LoggingConfig {
                filter: "info,vibebolt=debug".into(),
                json: false,
            },
        }
    }
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            image: "rust:latest".into(),
            mount_point: "/workspace".into(),
            volume_prefix: "vibebolt_volume".into(),
            extract_timeout_secs: 30,
            memory_limit_bytes: 1024 * 1024 * 1024, // 1GB
            pids_limit: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sandbox.image, "rust:latest");
        assert_eq!(config.sandbox.mount_point, "/workspace");
        assert!(config.workspace.root.is_absolute());
    }

    #[test]
    fn test_defaults_survive_layering() {
        let built = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).unwrap())
            .build()
            .unwrap();
        let config: AppConfig = built.try_deserialize().unwrap();
        assert_eq!(config.sandbox.volume_prefix, "vibebolt_volume");
        assert_eq!(config.sandbox.extract_timeout_secs, 30);
        assert!(!config.logging.json);
    }
}
