//! Garage Reconciler Library
//!
//! Reconciles access keys, buckets and bucket/key grants of a Garage object
//! storage cluster against its admin API, and manages per-bucket object
//! expiration through the S3-compatible lifecycle endpoint.
//!
//! Tests are included in the module files and under `tests/`.

pub mod client;
pub mod config;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod permissions;
pub mod prelude;
pub mod reconciler;
pub mod transport;
pub mod validation;
