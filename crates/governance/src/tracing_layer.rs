//! Tracing subscriber configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vibebolt_core::config::LoggingConfig;
use vibebolt_core::{Error, Result};

/// Build the filter: `RUST_LOG` when set, otherwise the configured directive.
fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match std::env::var("RUST_LOG") {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(directive),
        _ => EnvFilter::try_new(&config.filter),
    }
    .map_err(|e| Error::internal(format!("Invalid log filter: {}", e)))
}

/// Install the global tracing subscriber.
pub fn configure_tracing(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config)?);

    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::debug!(json = config.json, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            filter: "info,[=".into(),
            json: false,
        };
        assert!(env_filter(&config).is_err());

        let config = LoggingConfig {
            filter: "info,vibebolt=debug".into(),
            json: true,
        };
        assert!(env_filter(&config).is_ok());
    }
}
