//! # Prelude
//!
//! Re-exports commonly used types for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use garage_reconciler::prelude::*;
//!
//! let id: GrantId = "b1/GK1".parse().unwrap();
//! assert_eq!(id.bucket_id, "b1");
//! assert_eq!(derive_data_plane_host("127.0.0.1:3903", 3900), "127.0.0.1:3900");
//! ```

// Gateway and its configuration
pub use crate::client::{AdminOperation, GarageClient};
pub use crate::config::{BearerToken, GarageConfig};
pub use crate::endpoint::{derive_data_plane_host, Endpoint};
pub use crate::transport::{HttpTransport, ReqwestTransport};

// Errors
pub use crate::error::{ApiError, LifecycleError, ReconcileError};

// Lifecycle bridge
pub use crate::lifecycle::LifecycleBridge;

// Reconcilers and their desired/observed types
pub use crate::permissions::Permissions;
pub use crate::reconciler::{
    BucketReconciler, BucketSpec, BucketState, GrantId, GrantReconciler, GrantSpec, GrantState,
    KeyReconciler, KeySpec, KeyState, ManagedResource, Reconcile, ResourceKind, Tracking,
};
