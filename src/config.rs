//! # Configuration
//!
//! Connection and logging settings loaded from environment variables.
//!
//! All settings except the admin token have defaults. Values that fail to
//! parse fall back to the default, the same as unset ones.

use crate::constants::{
    DEFAULT_ADMIN_HOST, DEFAULT_ADMIN_SCHEME, DEFAULT_DATA_PLANE_PORT,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::endpoint::EndpointError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GARAGE_TOKEN is required but is not set")]
    MissingToken,

    #[error("invalid Garage endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Admin bearer token
///
/// Wiped from memory on drop; `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(Zeroizing<String>);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// `Authorization` header value
    pub fn authorization_header(&self) -> String {
        // Tolerate tokens supplied with the scheme already attached
        if self.0.starts_with("Bearer ") {
            self.0.as_str().to_string()
        } else {
            format!("Bearer {}", self.0.as_str())
        }
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Settings for reaching a Garage cluster
#[derive(Debug, Clone)]
pub struct GarageConfig {
    /// Admin API scheme (`http` or `https`)
    pub scheme: String,
    /// Admin API `host[:port]`
    pub host: String,
    /// Admin bearer token
    pub token: Option<BearerToken>,
    /// Port of the S3-compatible endpoint on the admin host
    pub data_plane_port: u16,
    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Log level used when `RUST_LOG` is unset (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for GarageConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_ADMIN_SCHEME.to_string(),
            host: DEFAULT_ADMIN_HOST.to_string(),
            token: None,
            data_plane_port: DEFAULT_DATA_PLANE_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_level: "INFO".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl GarageConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            scheme: env_var_or_default_str(&lookup, "GARAGE_SCHEME", DEFAULT_ADMIN_SCHEME),
            host: env_var_or_default_str(&lookup, "GARAGE_HOST", DEFAULT_ADMIN_HOST),
            token: lookup("GARAGE_TOKEN")
                .filter(|token| !token.trim().is_empty())
                .map(BearerToken::new),
            data_plane_port: env_var_or_default(&lookup, "GARAGE_S3_PORT", DEFAULT_DATA_PLANE_PORT),
            request_timeout_secs: env_var_or_default(
                &lookup,
                "GARAGE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            log_level: env_var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: env_var_or_default(&lookup, "LOG_FORMAT", LogFormat::Text),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Read a variable or return the default value
fn env_var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a variable as a string or return the default value
fn env_var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
