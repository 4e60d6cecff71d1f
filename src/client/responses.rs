//! Admin API response bodies
//!
//! Field names follow the Garage admin API v2 JSON schema (camelCase). Fields
//! this crate does not use are ignored on deserialization.

use crate::permissions::Permissions;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// Secret half of an access key
///
/// Only ever present in the response to `CreateKey`. The buffer is wiped on
/// drop and `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretAccessKey(Zeroizing<String>);

impl SecretAccessKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// The secret value
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for SecretAccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretAccessKey(***)")
    }
}

impl<'de> Deserialize<'de> for SecretAccessKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl Serialize for SecretAccessKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.expose())
    }
}

/// `CreateKey` / `GetKeyInfo` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub access_key_id: String,
    #[serde(default)]
    pub name: String,
    /// `null` or absent except right after creation
    #[serde(default)]
    pub secret_access_key: Option<SecretAccessKey>,
    #[serde(default)]
    pub buckets: Vec<KeyBucket>,
}

/// One entry of a key's bucket-association list
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBucket {
    pub id: String,
    #[serde(default)]
    pub global_aliases: Vec<String>,
    /// Missing capabilities read as `false`
    #[serde(default)]
    pub permissions: Permissions,
}

/// `CreateBucket` / `GetBucketInfo` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub id: String,
    #[serde(default)]
    pub global_aliases: Vec<String>,
    #[serde(default)]
    pub bytes: i64,
    #[serde(default)]
    pub objects: i64,
}

/// Error body returned with non-success statuses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
