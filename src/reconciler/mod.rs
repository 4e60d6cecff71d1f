//! # Reconciler
//!
//! Create/read/update/delete contract shared by the three resource kinds, and
//! the identity-tracking state machine that sits on top of it.
//!
//! A [`Reconcile`] implementation is stateless: it maps a desired
//! configuration to admin API calls and reports what the server holds.
//! [`ManagedResource`] remembers which remote identity the caller tracks and
//! moves between [`Tracking::Untracked`] and [`Tracking::Tracked`]:
//!
//! - create succeeds (or partially succeeds) -> tracked
//! - read finds nothing -> untracked (drift correction)
//! - update reports the resource absent -> untracked
//! - delete succeeds -> untracked
//!
//! Any other failure leaves the tracked identity untouched.

mod bucket;
mod grant;
mod key;

pub use bucket::{BucketReconciler, BucketSpec, BucketState};
pub use grant::{GrantId, GrantReconciler, GrantSpec, GrantState};
pub use key::{KeyReconciler, KeySpec, KeyState};

use crate::client::GarageClient;
use crate::error::ReconcileError;
use crate::observability::metrics;
use async_trait::async_trait;
use std::fmt;
use tracing::{debug, info, info_span, Instrument};

/// Resource kinds managed by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Key,
    Bucket,
    BucketKeyGrant,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Bucket => "bucket",
            Self::BucketKeyGrant => "bucket_key_grant",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create/read/update/delete for one resource kind
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Desired configuration
    type Desired: Send + Sync;
    /// Identity of a remote resource
    type Id: Clone + PartialEq + fmt::Display + Send + Sync;
    /// Observed remote state
    type Observed: Send;

    const KIND: ResourceKind;

    fn identity(observed: &Self::Observed) -> Self::Id;

    /// Identity of a resource that exists remotely even though `error` was returned
    fn recover_identity(_error: &ReconcileError) -> Option<Self::Id> {
        None
    }

    /// Materialize `desired` and return the resulting state
    async fn create(
        &self,
        client: &GarageClient,
        desired: &Self::Desired,
    ) -> Result<Self::Observed, ReconcileError>;

    /// Current state, or `None` when the server has no such resource
    async fn read(
        &self,
        client: &GarageClient,
        id: &Self::Id,
    ) -> Result<Option<Self::Observed>, ReconcileError>;

    /// Converge the resource to `desired`
    ///
    /// Returns `None` when the resource no longer exists afterwards. The
    /// returned state may carry a different identity than `id`.
    async fn update(
        &self,
        client: &GarageClient,
        id: &Self::Id,
        desired: &Self::Desired,
    ) -> Result<Option<Self::Observed>, ReconcileError>;

    /// Stop managing the resource
    async fn delete(&self, client: &GarageClient, id: &Self::Id) -> Result<(), ReconcileError>;
}

/// Whether the caller currently tracks a remote identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tracking<Id> {
    Untracked,
    Tracked(Id),
}

impl<Id> Default for Tracking<Id> {
    fn default() -> Self {
        Self::Untracked
    }
}

impl<Id> Tracking<Id> {
    pub fn id(&self) -> Option<&Id> {
        match self {
            Self::Untracked => None,
            Self::Tracked(id) => Some(id),
        }
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked(_))
    }
}

/// A reconciler together with the identity it tracks
pub struct ManagedResource<R: Reconcile> {
    reconciler: R,
    tracking: Tracking<R::Id>,
}

impl<R: Reconcile> fmt::Debug for ManagedResource<R>
where
    R::Id: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedResource")
            .field("kind", &R::KIND)
            .field("tracking", &self.tracking)
            .finish()
    }
}

impl<R: Reconcile> ManagedResource<R> {
    /// Nothing tracked yet
    pub fn new(reconciler: R) -> Self {
        Self {
            reconciler,
            tracking: Tracking::Untracked,
        }
    }

    /// Resume tracking a known identity
    pub fn tracked(reconciler: R, id: R::Id) -> Self {
        Self {
            reconciler,
            tracking: Tracking::Tracked(id),
        }
    }

    pub fn tracking(&self) -> &Tracking<R::Id> {
        &self.tracking
    }

    pub fn id(&self) -> Option<&R::Id> {
        self.tracking.id()
    }

    pub async fn create(
        &mut self,
        client: &GarageClient,
        desired: &R::Desired,
    ) -> Result<R::Observed, ReconcileError> {
        let span = info_span!("reconcile", kind = R::KIND.as_str(), action = "create");
        async move {
            metrics::increment_reconciliations(R::KIND.as_str(), "create");
            match self.reconciler.create(client, desired).await {
                Ok(observed) => {
                    let id = R::identity(&observed);
                    info!("Tracking {} {}", R::KIND, id);
                    self.tracking = Tracking::Tracked(id);
                    Ok(observed)
                }
                Err(error) => {
                    metrics::increment_reconciliation_errors(R::KIND.as_str(), "create");
                    if let Some(id) = R::recover_identity(&error) {
                        info!("Tracking partially created {} {}", R::KIND, id);
                        self.tracking = Tracking::Tracked(id);
                    }
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Refresh the tracked resource; `Ok(None)` when nothing is tracked or it is gone
    pub async fn read(
        &mut self,
        client: &GarageClient,
    ) -> Result<Option<R::Observed>, ReconcileError> {
        let span = info_span!("reconcile", kind = R::KIND.as_str(), action = "read");
        async move {
            let Tracking::Tracked(id) = &self.tracking else {
                debug!("No {} tracked; nothing to read", R::KIND);
                return Ok(None);
            };

            metrics::increment_reconciliations(R::KIND.as_str(), "read");
            match self.reconciler.read(client, id).await {
                Ok(Some(observed)) => {
                    self.tracking = Tracking::Tracked(R::identity(&observed));
                    Ok(Some(observed))
                }
                Ok(None) => {
                    info!("{} {} no longer exists; untracking", R::KIND, id);
                    metrics::increment_drift_corrections(R::KIND.as_str());
                    self.tracking = Tracking::Untracked;
                    Ok(None)
                }
                Err(error) => {
                    metrics::increment_reconciliation_errors(R::KIND.as_str(), "read");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn update(
        &mut self,
        client: &GarageClient,
        desired: &R::Desired,
    ) -> Result<Option<R::Observed>, ReconcileError> {
        let span = info_span!("reconcile", kind = R::KIND.as_str(), action = "update");
        async move {
            let Tracking::Tracked(id) = &self.tracking else {
                return Err(ReconcileError::NotTracked { kind: R::KIND });
            };

            metrics::increment_reconciliations(R::KIND.as_str(), "update");
            match self.reconciler.update(client, id, desired).await {
                Ok(Some(observed)) => {
                    let new_id = R::identity(&observed);
                    if new_id != *id {
                        info!("{} {} replaced by {}", R::KIND, id, new_id);
                    }
                    self.tracking = Tracking::Tracked(new_id);
                    Ok(Some(observed))
                }
                Ok(None) => {
                    info!("{} {} is absent after update; untracking", R::KIND, id);
                    self.tracking = Tracking::Untracked;
                    Ok(None)
                }
                Err(error) => {
                    metrics::increment_reconciliation_errors(R::KIND.as_str(), "update");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn delete(
        &mut self,
        client: &GarageClient,
    ) -> Result<(), ReconcileError> {
        let span = info_span!("reconcile", kind = R::KIND.as_str(), action = "delete");
        async move {
            let Tracking::Tracked(id) = &self.tracking else {
                debug!("No {} tracked; nothing to delete", R::KIND);
                return Ok(());
            };

            metrics::increment_reconciliations(R::KIND.as_str(), "delete");
            match self.reconciler.delete(client, id).await {
                Ok(()) => {
                    info!("Untracked {} {}", R::KIND, id);
                    self.tracking = Tracking::Untracked;
                    Ok(())
                }
                Err(error) => {
                    metrics::increment_reconciliation_errors(R::KIND.as_str(), "delete");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Key.to_string(), "key");
        assert_eq!(ResourceKind::BucketKeyGrant.to_string(), "bucket_key_grant");
    }

    #[test]
    fn test_tracking_accessors() {
        let untracked: Tracking<String> = Tracking::default();
        assert!(!untracked.is_tracked());
        assert_eq!(untracked.id(), None);

        let tracked = Tracking::Tracked("GK1".to_string());
        assert!(tracked.is_tracked());
        assert_eq!(tracked.id().map(String::as_str), Some("GK1"));
    }
}
