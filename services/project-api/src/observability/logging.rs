//! Structured logging setup.
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` overrides the
//! configured level when present.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Log level filter
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: "project-api-service".to_string(),
            log_level: "info".to_string(),
            json_output: true,
        }
    }
}

impl LoggingConfig {
    /// Derive logging settings from the service configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::default()
            .with_log_level(&config.log_level)
            .with_json_output(config.log_json)
    }

    /// Create config with custom log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Toggle JSON output.
    #[must_use]
    pub const fn with_json_output(mut self, json: bool) -> Self {
        self.json_output = json;
        self
    }
}

/// Initialize logging with the given configuration.
///
/// Should be called once at application startup; later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    if result.is_ok() {
        tracing::info!(service = %config.service_name, level = %config.log_level, "Logging initialized");
    }
}
