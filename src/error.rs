//! # Errors
//!
//! Error taxonomy for the gateway, the lifecycle bridge and the reconcilers.
//!
//! A not-found answer on a read is *not* an error: reconcilers turn it into
//! "absent" so the caller can stop tracking the identity. Everything else is
//! surfaced with the operation, the resource identity and the underlying cause.

use crate::client::AdminOperation;
use crate::endpoint::EndpointError;
use crate::lifecycle::xml::XmlError;
use crate::reconciler::{BucketState, ResourceKind};
use crate::transport::TransportError;
use crate::validation::ValidationError;
use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

/// Failure of a single admin API call
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{operation} returned HTTP {status}: {message}")]
    Status {
        operation: AdminOperation,
        status: StatusCode,
        message: String,
    },

    #[error("{operation} could not reach the admin API: {source}")]
    Transport {
        operation: AdminOperation,
        #[source]
        source: TransportError,
    },

    #[error("{operation} returned an unreadable body: {source}")]
    Decode {
        operation: AdminOperation,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation} request could not be encoded: {source}")]
    Encode {
        operation: AdminOperation,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation} has no valid URL: {source}")]
    Endpoint {
        operation: AdminOperation,
        #[source]
        source: EndpointError,
    },
}

impl ApiError {
    /// HTTP status of the failed call, when the server answered
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn operation(&self) -> AdminOperation {
        match self {
            Self::Status { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Decode { operation, .. }
            | Self::Encode { operation, .. }
            | Self::Endpoint { operation, .. } => *operation,
        }
    }
}

/// Step of the lifecycle sub-protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOperation {
    Set,
    Get,
    Clear,
}

impl LifecycleOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Get => "get",
            Self::Clear => "clear",
        }
    }
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the lifecycle sub-protocol on the data-plane endpoint
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("expiration for bucket {bucket} must be at least one day; clear the policy instead")]
    InvalidDays { bucket: String },

    #[error("could not resolve bucket {bucket} before the lifecycle {operation}: {source}")]
    ResolveBucket {
        operation: LifecycleOperation,
        bucket: String,
        #[source]
        source: ApiError,
    },

    #[error("could not serialize the lifecycle policy of bucket {bucket}: {source}")]
    Serialize {
        bucket: String,
        #[source]
        source: XmlError,
    },

    #[error("lifecycle {operation} for bucket {bucket} has no valid URL: {source}")]
    Endpoint {
        operation: LifecycleOperation,
        bucket: String,
        #[source]
        source: EndpointError,
    },

    #[error("lifecycle {operation} for bucket {bucket} failed: {source}")]
    Transport {
        operation: LifecycleOperation,
        bucket: String,
        #[source]
        source: TransportError,
    },

    #[error("lifecycle {operation} for bucket {bucket} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        operation: LifecycleOperation,
        bucket: String,
        status: StatusCode,
        body: String,
    },

    #[error("lifecycle policy of bucket {bucket} is not valid XML: {source}")]
    Parse {
        bucket: String,
        #[source]
        source: XmlError,
    },
}

impl LifecycleError {
    pub fn operation(&self) -> LifecycleOperation {
        match self {
            Self::InvalidDays { .. } | Self::Serialize { .. } => LifecycleOperation::Set,
            Self::Parse { .. } => LifecycleOperation::Get,
            Self::ResolveBucket { operation, .. }
            | Self::Endpoint { operation, .. }
            | Self::Transport { operation, .. }
            | Self::UnexpectedStatus { operation, .. } => *operation,
        }
    }
}

/// Failure of a reconcile step
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid {kind} configuration: {source}")]
    InvalidConfig {
        kind: ResourceKind,
        #[source]
        source: ValidationError,
    },

    #[error("failed to create {kind}: {source}")]
    RemoteCreate {
        kind: ResourceKind,
        #[source]
        source: ApiError,
    },

    #[error("failed to read {kind} {id}: {source}")]
    RemoteRead {
        kind: ResourceKind,
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to update {kind} {id}: {source}")]
    RemoteUpdate {
        kind: ResourceKind,
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to delete {kind} {id}: {source}")]
    RemoteDelete {
        kind: ResourceKind,
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("lifecycle step failed for bucket {bucket}: {source}")]
    Lifecycle {
        bucket: String,
        #[source]
        source: LifecycleError,
    },

    #[error("bucket {} was created but its expiration policy was not applied: {source}", .state.id)]
    PartialCreate {
        state: Box<BucketState>,
        #[source]
        source: LifecycleError,
    },

    #[error("bucket {} was read but its expiration policy could not be: {source}", .state.id)]
    PartialRead {
        state: Box<BucketState>,
        #[source]
        source: LifecycleError,
    },

    #[error("{kind} {id} was applied but is not visible on read-back")]
    NotObserved { kind: ResourceKind, id: String },

    #[error("{kind} is not tracked; create it first")]
    NotTracked { kind: ResourceKind },
}

impl ReconcileError {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Lifecycle { .. } | Self::PartialCreate { .. } | Self::PartialRead { .. } => {
                ResourceKind::Bucket
            }
            Self::InvalidConfig { kind, .. }
            | Self::RemoteCreate { kind, .. }
            | Self::RemoteRead { kind, .. }
            | Self::RemoteUpdate { kind, .. }
            | Self::RemoteDelete { kind, .. }
            | Self::NotObserved { kind, .. }
            | Self::NotTracked { kind } => *kind,
        }
    }

    /// The remote object exists even though the step failed
    pub fn is_partial_success(&self) -> bool {
        matches!(self, Self::PartialCreate { .. } | Self::PartialRead { .. })
    }
}
