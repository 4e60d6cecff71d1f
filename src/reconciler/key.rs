//! Access key reconciler
//!
//! Garage can neither rename nor delete an access key through the admin API
//! this crate uses. A rename is a local delete followed by a fresh create (new
//! identity, new secret) and a delete only stops tracking the key.

use super::{Reconcile, ResourceKind};
use crate::client::{GarageClient, KeyInfo, SecretAccessKey};
use crate::error::ReconcileError;
use crate::validation::{validate_key_name, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Desired access key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub name: String,
}

impl KeySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_key_name(&self.name)
    }
}

/// Observed access key
///
/// `secret_access_key` is only set on the state returned by a create.
#[derive(Debug, Clone, Serialize)]
pub struct KeyState {
    pub access_key_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<SecretAccessKey>,
}

impl KeyState {
    fn created(info: KeyInfo) -> Self {
        Self {
            access_key_id: info.access_key_id,
            name: info.name,
            secret_access_key: info.secret_access_key,
        }
    }

    /// The secret is dropped even if the server sent one
    fn observed(info: KeyInfo) -> Self {
        Self {
            access_key_id: info.access_key_id,
            name: info.name,
            secret_access_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyReconciler;

#[async_trait]
impl Reconcile for KeyReconciler {
    type Desired = KeySpec;
    type Id = String;
    type Observed = KeyState;

    const KIND: ResourceKind = ResourceKind::Key;

    fn identity(observed: &KeyState) -> String {
        observed.access_key_id.clone()
    }

    async fn create(
        &self,
        client: &GarageClient,
        desired: &KeySpec,
    ) -> Result<KeyState, ReconcileError> {
        desired
            .validate()
            .map_err(|source| ReconcileError::InvalidConfig {
                kind: Self::KIND,
                source,
            })?;

        let info = client
            .create_key(&desired.name)
            .await
            .map_err(|source| ReconcileError::RemoteCreate {
                kind: Self::KIND,
                source,
            })?;

        if info.secret_access_key.is_none() {
            warn!(
                "CreateKey returned no secret for {}; it cannot be retrieved later",
                info.access_key_id
            );
        }
        Ok(KeyState::created(info))
    }

    async fn read(
        &self,
        client: &GarageClient,
        id: &String,
    ) -> Result<Option<KeyState>, ReconcileError> {
        match client.get_key(id).await {
            Ok(info) => {
                debug!("Read access key {} ({})", info.access_key_id, info.name);
                Ok(Some(KeyState::observed(info)))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(source) => Err(ReconcileError::RemoteRead {
                kind: Self::KIND,
                id: id.clone(),
                source,
            }),
        }
    }

    async fn update(
        &self,
        client: &GarageClient,
        id: &String,
        desired: &KeySpec,
    ) -> Result<Option<KeyState>, ReconcileError> {
        desired
            .validate()
            .map_err(|source| ReconcileError::InvalidConfig {
                kind: Self::KIND,
                source,
            })?;

        let Some(current) = self.read(client, id).await? else {
            return Ok(None);
        };

        if current.name == desired.name {
            debug!("Access key {} already named {}", id, desired.name);
            return Ok(Some(current));
        }

        warn!(
            "Access key {} cannot be renamed from {} to {}; recreating it with a new identity and secret",
            id, current.name, desired.name
        );
        self.delete(client, id).await?;
        self.create(client, desired).await.map(Some)
    }

    async fn delete(&self, _client: &GarageClient, id: &String) -> Result<(), ReconcileError> {
        warn!(
            "Access key {} is no longer managed; the admin API cannot delete it, so it persists in Garage",
            id
        );
        Ok(())
    }
}
