//! Bucket reconciler
//!
//! The admin API creates and reads buckets; expiration goes through the
//! lifecycle bridge. Aliases and usage counters are fixed after creation, so
//! an update only ever touches the expiration policy. Garage buckets are never
//! deleted here: delete stops tracking and the bucket persists.

use super::{Reconcile, ResourceKind};
use crate::client::{BucketInfo, GarageClient};
use crate::error::{LifecycleError, ReconcileError};
use crate::lifecycle::LifecycleBridge;
use crate::validation::{validate_bucket_alias, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Desired bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    /// Global alias given at creation
    #[serde(default)]
    pub global_alias: Option<String>,
    /// Days after which objects expire, 0 for no policy
    #[serde(default)]
    pub expiration_days: u32,
}

impl BucketSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.global_alias {
            Some(alias) => validate_bucket_alias(alias),
            None => Ok(()),
        }
    }
}

/// Observed bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketState {
    pub id: String,
    /// First global alias
    pub global_alias: Option<String>,
    pub global_aliases: Vec<String>,
    pub bytes: i64,
    pub objects: i64,
    pub expiration_days: u32,
}

impl BucketState {
    fn from_info(info: BucketInfo, expiration_days: u32) -> Self {
        Self {
            global_alias: info.global_aliases.first().cloned(),
            id: info.id,
            global_aliases: info.global_aliases,
            bytes: info.bytes,
            objects: info.objects,
            expiration_days,
        }
    }

    /// Name the bucket is addressed by on the data plane
    pub fn path_name(&self) -> &str {
        self.global_alias.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BucketReconciler;

impl BucketReconciler {
    /// Admin-side bucket info, `None` when the server has no such bucket
    async fn fetch(client: &GarageClient, id: &str) -> Result<Option<BucketInfo>, ReconcileError> {
        match client.get_bucket(id).await {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(source) => Err(ReconcileError::RemoteRead {
                kind: Self::KIND,
                id: id.to_string(),
                source,
            }),
        }
    }

    fn lifecycle_error(bucket: &BucketState, source: LifecycleError) -> ReconcileError {
        ReconcileError::Lifecycle {
            bucket: bucket.id.clone(),
            source,
        }
    }
}

#[async_trait]
impl Reconcile for BucketReconciler {
    type Desired = BucketSpec;
    type Id = String;
    type Observed = BucketState;

    const KIND: ResourceKind = ResourceKind::Bucket;

    fn identity(observed: &BucketState) -> String {
        observed.id.clone()
    }

    fn recover_identity(error: &ReconcileError) -> Option<String> {
        match error {
            ReconcileError::PartialCreate { state, .. } => Some(state.id.clone()),
            _ => None,
        }
    }

    async fn create(
        &self,
        client: &GarageClient,
        desired: &BucketSpec,
    ) -> Result<BucketState, ReconcileError> {
        desired
            .validate()
            .map_err(|source| ReconcileError::InvalidConfig {
                kind: Self::KIND,
                source,
            })?;

        let info = client
            .create_bucket(desired.global_alias.as_deref())
            .await
            .map_err(|source| ReconcileError::RemoteCreate {
                kind: Self::KIND,
                source,
            })?;
        let mut state = BucketState::from_info(info, 0);

        if desired.expiration_days > 0 {
            let applied = LifecycleBridge::new(client)
                .set_policy_by_name(state.path_name(), desired.expiration_days)
                .await;
            if let Err(source) = applied {
                warn!(
                    "Bucket {} was created but its expiration policy could not be applied",
                    state.id
                );
                return Err(ReconcileError::PartialCreate {
                    state: Box::new(state),
                    source,
                });
            }
            state.expiration_days = desired.expiration_days;
        }

        Ok(state)
    }

    async fn read(
        &self,
        client: &GarageClient,
        id: &String,
    ) -> Result<Option<BucketState>, ReconcileError> {
        let Some(info) = Self::fetch(client, id).await? else {
            return Ok(None);
        };
        let mut state = BucketState::from_info(info, 0);

        match LifecycleBridge::new(client)
            .get_policy_by_name(state.path_name())
            .await
        {
            Ok(days) => {
                debug!("Read bucket {} (expiration: {} days)", state.id, days);
                state.expiration_days = days;
                Ok(Some(state))
            }
            Err(source) => {
                warn!(
                    "Bucket {} exists but its expiration policy could not be read",
                    state.id
                );
                Err(ReconcileError::PartialRead {
                    state: Box::new(state),
                    source,
                })
            }
        }
    }

    async fn update(
        &self,
        client: &GarageClient,
        id: &String,
        desired: &BucketSpec,
    ) -> Result<Option<BucketState>, ReconcileError> {
        desired
            .validate()
            .map_err(|source| ReconcileError::InvalidConfig {
                kind: Self::KIND,
                source,
            })?;

        let Some(info) = Self::fetch(client, id).await? else {
            return Ok(None);
        };
        let mut state = BucketState::from_info(info, 0);

        if desired.global_alias != state.global_alias {
            warn!(
                "Bucket {} alias is {:?}, desired {:?}; aliases cannot be changed after creation, ignoring",
                id, state.global_alias, desired.global_alias
            );
        }

        let bridge = LifecycleBridge::new(client);
        // None when the stored policy cannot be read; set and clear both replace it
        let current = match bridge.get_policy_by_name(state.path_name()).await {
            Ok(days) => Some(days),
            Err(e) => {
                warn!("Bucket {} policy unreadable, overwriting: {}", id, e);
                None
            }
        };

        match (desired.expiration_days, current) {
            (want, Some(have)) if want == have => {
                debug!("Bucket {} expiration already {} days", id, have);
                state.expiration_days = have;
            }
            (0, _) => {
                bridge
                    .clear_policy_by_name(state.path_name())
                    .await
                    .map_err(|source| Self::lifecycle_error(&state, source))?;
                state.expiration_days = 0;
            }
            (want, _) => {
                bridge
                    .set_policy_by_name(state.path_name(), want)
                    .await
                    .map_err(|source| Self::lifecycle_error(&state, source))?;
                info!("Bucket {} expiration set to {} days", id, want);
                state.expiration_days = want;
            }
        }

        Ok(Some(state))
    }

    async fn delete(&self, _client: &GarageClient, id: &String) -> Result<(), ReconcileError> {
        warn!(
            "Bucket {} is no longer managed; the admin API cannot delete it here, so it persists in Garage",
            id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(aliases: &[&str]) -> BucketInfo {
        BucketInfo {
            id: "b1".to_string(),
            global_aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
            bytes: 10,
            objects: 2,
        }
    }

    #[test]
    fn test_state_from_info() {
        let state = BucketState::from_info(info(&["logs", "archive"]), 7);
        assert_eq!(state.global_alias.as_deref(), Some("logs"));
        assert_eq!(state.global_aliases.len(), 2);
        assert_eq!(state.path_name(), "logs");
        assert_eq!(state.expiration_days, 7);
    }

    #[test]
    fn test_path_name_falls_back_to_id() {
        let state = BucketState::from_info(info(&[]), 0);
        assert_eq!(state.global_alias, None);
        assert_eq!(state.path_name(), "b1");
    }

    #[test]
    fn test_spec_validation() {
        assert!(BucketSpec::default().validate().is_ok());
        let bad = BucketSpec {
            global_alias: Some("Not_Valid".to_string()),
            expiration_days: 0,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_recover_identity_only_for_partial_create() {
        let error = ReconcileError::NotTracked {
            kind: ResourceKind::Bucket,
        };
        assert_eq!(BucketReconciler::recover_identity(&error), None);
    }
}
