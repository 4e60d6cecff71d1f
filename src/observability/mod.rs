//! # Observability
//!
//! Logging setup and Prometheus metrics.
//!
//! - `metrics`: Prometheus metrics collection
//! - [`init_logging`]: `tracing` subscriber, text or JSON

pub mod metrics;

use crate::config::{GarageConfig, LogFormat};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
fn default_filter(log_level: &str) -> String {
    let level = match log_level.trim().to_ascii_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace") => level.to_string(),
        _ => "info".to_string(),
    };
    format!("garage_reconciler={level},garagectl={level}")
}

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` wins over `LOG_LEVEL`. Logs go to stderr so command output on
/// stdout stays machine-readable.
///
/// # Errors
/// Returns an error if a global subscriber is already installed
pub fn init_logging(config: &GarageConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}")),
        LogFormat::Text => builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}")),
    }
}
