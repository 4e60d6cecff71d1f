//! Bucket/key grant reconciler
//!
//! A grant is the capability triple one key holds on one bucket. It has no
//! server-side identity of its own: it is found by scanning the key's
//! bucket-association list, and its identity is the `(bucket, key)` pair.

use super::{Reconcile, ResourceKind};
use crate::client::GarageClient;
use crate::error::{ApiError, ReconcileError};
use crate::permissions::{self, find_grant, Permissions};
use crate::validation::{validate_grant_permissions, validate_identifier, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// `(bucket, key)` pair identifying a grant, printed as `<bucket_id>/<access_key_id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantId {
    pub bucket_id: String,
    pub access_key_id: String,
}

impl GrantId {
    pub fn new(bucket_id: impl Into<String>, access_key_id: impl Into<String>) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            access_key_id: access_key_id.into(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("bucket_id", &self.bucket_id)?;
        validate_identifier("access_key_id", &self.access_key_id)
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket_id, self.access_key_id)
    }
}

impl FromStr for GrantId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (bucket_id, access_key_id) = value.split_once('/').ok_or_else(|| {
            ValidationError::new(
                "grant_id",
                format!("'{value}' must have the form <bucket_id>/<access_key_id>"),
            )
        })?;
        let id = Self::new(bucket_id, access_key_id);
        id.validate()?;
        Ok(id)
    }
}

/// Desired grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSpec {
    pub bucket_id: String,
    pub access_key_id: String,
    #[serde(default)]
    pub permissions: Permissions,
}

impl GrantSpec {
    pub fn new(
        bucket_id: impl Into<String>,
        access_key_id: impl Into<String>,
        permissions: Permissions,
    ) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            access_key_id: access_key_id.into(),
            permissions,
        }
    }

    pub fn id(&self) -> GrantId {
        GrantId::new(self.bucket_id.clone(), self.access_key_id.clone())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.id().validate()
    }
}

/// Observed grant; never all-false
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantState {
    pub bucket_id: String,
    pub access_key_id: String,
    pub permissions: Permissions,
}

impl GrantState {
    pub fn id(&self) -> GrantId {
        GrantId::new(self.bucket_id.clone(), self.access_key_id.clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GrantReconciler;

impl GrantReconciler {
    fn invalid(source: ValidationError) -> ReconcileError {
        ReconcileError::InvalidConfig {
            kind: ResourceKind::BucketKeyGrant,
            source,
        }
    }

    /// Currently recorded grant, or `Err` with the raw API error
    async fn recorded(client: &GarageClient, id: &GrantId) -> Result<Option<Permissions>, ApiError> {
        let key = client.get_key(&id.access_key_id).await?;
        Ok(find_grant(&key.buckets, &id.bucket_id))
    }

    /// Read back after a successful allow/deny
    async fn observe(&self, client: &GarageClient, id: &GrantId) -> Result<GrantState, ReconcileError> {
        self.read(client, id)
            .await?
            .ok_or_else(|| ReconcileError::NotObserved {
                kind: ResourceKind::BucketKeyGrant,
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl Reconcile for GrantReconciler {
    type Desired = GrantSpec;
    type Id = GrantId;
    type Observed = GrantState;

    const KIND: ResourceKind = ResourceKind::BucketKeyGrant;

    fn identity(observed: &GrantState) -> GrantId {
        observed.id()
    }

    async fn create(
        &self,
        client: &GarageClient,
        desired: &GrantSpec,
    ) -> Result<GrantState, ReconcileError> {
        desired.validate().map_err(Self::invalid)?;
        validate_grant_permissions(&desired.permissions).map_err(Self::invalid)?;

        let id = desired.id();
        let remote_create = |source: ApiError| ReconcileError::RemoteCreate {
            kind: Self::KIND,
            source,
        };

        let current = Self::recorded(client, &id).await.map_err(remote_create)?;
        let plan = permissions::plan(current, desired.permissions);
        permissions::apply(client, &id.bucket_id, &id.access_key_id, plan)
            .await
            .map_err(remote_create)?;

        info!("Granted {} on {}", desired.permissions, id);
        self.observe(client, &id).await
    }

    async fn read(
        &self,
        client: &GarageClient,
        id: &GrantId,
    ) -> Result<Option<GrantState>, ReconcileError> {
        match Self::recorded(client, id).await {
            Ok(Some(permissions)) => Ok(Some(GrantState {
                bucket_id: id.bucket_id.clone(),
                access_key_id: id.access_key_id.clone(),
                permissions,
            })),
            Ok(None) => {
                debug!("Key {} holds nothing on bucket {}", id.access_key_id, id.bucket_id);
                Ok(None)
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(source) => Err(ReconcileError::RemoteRead {
                kind: Self::KIND,
                id: id.to_string(),
                source,
            }),
        }
    }

    async fn update(
        &self,
        client: &GarageClient,
        id: &GrantId,
        desired: &GrantSpec,
    ) -> Result<Option<GrantState>, ReconcileError> {
        desired.validate().map_err(Self::invalid)?;
        if desired.id() != *id {
            return Err(Self::invalid(ValidationError::new(
                "grant_id",
                format!(
                    "desired grant {} does not match tracked grant {}; revoke and create instead",
                    desired.id(),
                    id
                ),
            )));
        }

        let remote_update = |source: ApiError| ReconcileError::RemoteUpdate {
            kind: Self::KIND,
            id: id.to_string(),
            source,
        };

        let current = match Self::recorded(client, id).await {
            Ok(current) => current,
            // The key is gone, and every grant it held with it
            Err(e) if e.is_not_found() => return Ok(None),
            Err(source) => return Err(remote_update(source)),
        };

        let plan = permissions::plan(current, desired.permissions);
        permissions::apply(client, &id.bucket_id, &id.access_key_id, plan)
            .await
            .map_err(remote_update)?;

        if desired.permissions.is_empty() {
            info!("Revoked every capability on {}", id);
            return Ok(None);
        }
        self.observe(client, id).await.map(Some)
    }

    async fn delete(&self, client: &GarageClient, id: &GrantId) -> Result<(), ReconcileError> {
        match client
            .deny_bucket_key(&id.bucket_id, &id.access_key_id, Permissions::all())
            .await
        {
            Ok(()) => {
                info!("Revoked grant {}", id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Grant {} is already gone: {}", id, e);
                Ok(())
            }
            Err(source) => Err(ReconcileError::RemoteDelete {
                kind: Self::KIND,
                id: id.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_id_round_trips_through_text() {
        let id: GrantId = "b1/GK1".parse().unwrap();
        assert_eq!(id, GrantId::new("b1", "GK1"));
        assert_eq!(id.to_string(), "b1/GK1");
    }

    #[test]
    fn test_grant_id_rejects_malformed_text() {
        assert!("b1".parse::<GrantId>().is_err());
        assert!("/GK1".parse::<GrantId>().is_err());
        assert!("b1/".parse::<GrantId>().is_err());
        assert!("b1/GK1/extra".parse::<GrantId>().is_err());
    }

    #[test]
    fn test_spec_identity() {
        let spec = GrantSpec::new("b1", "GK1", Permissions::new(true, false, false));
        assert_eq!(spec.id(), GrantId::new("b1", "GK1"));
        assert!(spec.validate().is_ok());
    }
}
