//! # Constants
//!
//! Shared constants used throughout the reconciler.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default scheme for the Garage admin API
pub const DEFAULT_ADMIN_SCHEME: &str = "http";

/// Default host and port for the Garage admin API
pub const DEFAULT_ADMIN_HOST: &str = "127.0.0.1:3903";

/// Default port of the S3-compatible data-plane endpoint
/// Garage serves its S3 API on 3900 and its admin API on 3903
pub const DEFAULT_DATA_PLANE_PORT: u16 = 3900;

/// Default per-request timeout for admin and data-plane calls (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Path prefix of the admin API version this crate speaks
pub const ADMIN_API_PREFIX: &str = "/v2";

/// Query string selecting the lifecycle sub-resource of a bucket
pub const LIFECYCLE_QUERY: &str = "lifecycle";

/// Identifier of the single lifecycle rule this crate manages
pub const MANAGED_RULE_ID: &str = "expire-after-days";

/// Maximum number of bytes of an error body kept in error messages
pub const MAX_ERROR_BODY_BYTES: usize = 512;
