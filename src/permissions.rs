//! # Permission Diff Engine
//!
//! Turns a desired `(read, write, owner)` triple and the grant currently
//! recorded on the key into the allow/deny calls that converge them.
//!
//! The admin API is idempotent per field: `AllowBucketKey` sets the fields
//! passed as `true`, `DenyBucketKey` clears the fields passed as `true`, and
//! both leave `false` fields alone. Allowing the desired triple is therefore
//! enough to add capabilities; capabilities that must go away need an explicit
//! deny.

use crate::client::{GarageClient, KeyBucket};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Capability triple a key holds on a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub owner: bool,
}

impl Permissions {
    pub const fn new(read: bool, write: bool, owner: bool) -> Self {
        Self { read, write, owner }
    }

    /// All three capabilities
    pub const fn all() -> Self {
        Self::new(true, true, true)
    }

    /// No capability at all, equivalent to no grant
    pub fn is_empty(&self) -> bool {
        !(self.read || self.write || self.owner)
    }

    /// Capabilities held in `current` that `self` does not want
    pub fn revoked_from(&self, current: &Self) -> Self {
        Self {
            read: current.read && !self.read,
            write: current.write && !self.write,
            owner: current.owner && !self.owner,
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = [
            (self.read, "read"),
            (self.write, "write"),
            (self.owner, "owner"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        f.write_str(&names.join(","))
    }
}

/// Grant recorded for `bucket_id` in a key's bucket-association list
///
/// An entry with every capability `false` is no grant, same as a missing entry.
pub fn find_grant(buckets: &[KeyBucket], bucket_id: &str) -> Option<Permissions> {
    buckets
        .iter()
        .find(|bucket| bucket.id == bucket_id)
        .map(|bucket| bucket.permissions)
        .filter(|permissions| !permissions.is_empty())
}

/// Calls needed to move a grant from its recorded state to the desired one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionPlan {
    /// Issued first; always the full desired triple
    pub allow: Option<Permissions>,
    /// Capabilities to revoke
    pub deny: Option<Permissions>,
}

impl PermissionPlan {
    pub fn is_noop(&self) -> bool {
        self.allow.is_none() && self.deny.is_none()
    }
}

/// Plan the calls converging `current` to `desired`
///
/// The allow call is planned whenever `desired` grants anything, even if it
/// already matches `current`.
pub fn plan(current: Option<Permissions>, desired: Permissions) -> PermissionPlan {
    let current = current.unwrap_or_default();
    let revoked = desired.revoked_from(&current);

    PermissionPlan {
        allow: (!desired.is_empty()).then_some(desired),
        deny: (!revoked.is_empty()).then_some(revoked),
    }
}

/// Issue the calls of `plan` for the `(bucket_id, access_key_id)` pair
pub async fn apply(
    client: &GarageClient,
    bucket_id: &str,
    access_key_id: &str,
    plan: PermissionPlan,
) -> Result<(), ApiError> {
    if plan.is_noop() {
        debug!(
            "Grant bucket={} key={} needs no calls",
            bucket_id, access_key_id
        );
        return Ok(());
    }

    if let Some(allow) = plan.allow {
        client.allow_bucket_key(bucket_id, access_key_id, allow).await?;
    }
    if let Some(deny) = plan.deny {
        client.deny_bucket_key(bucket_id, access_key_id, deny).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: Permissions = Permissions::new(true, false, false);
    const RW: Permissions = Permissions::new(true, true, false);
    const NONE: Permissions = Permissions::new(false, false, false);

    fn entry(id: &str, permissions: Permissions) -> KeyBucket {
        KeyBucket {
            id: id.to_string(),
            global_aliases: Vec::new(),
            permissions,
        }
    }

    mod find_grant_tests {
        use super::*;

        #[test]
        fn test_missing_entry_is_absent() {
            let buckets = vec![entry("other", RW)];
            assert_eq!(find_grant(&buckets, "b1"), None);
        }

        #[test]
        fn test_all_false_entry_is_absent() {
            let buckets = vec![entry("b1", NONE)];
            assert_eq!(find_grant(&buckets, "b1"), None);
        }

        #[test]
        fn test_matching_entry() {
            let buckets = vec![entry("b0", Permissions::all()), entry("b1", R)];
            assert_eq!(find_grant(&buckets, "b1"), Some(R));
        }
    }

    mod plan_tests {
        use super::*;

        #[test]
        fn test_new_grant_allows_desired() {
            let plan = plan(None, R);
            assert_eq!(plan.allow, Some(R));
            assert_eq!(plan.deny, None);
        }

        #[test]
        fn test_unchanged_grant_still_allows() {
            let plan = plan(Some(RW), RW);
            assert_eq!(plan.allow, Some(RW));
            assert_eq!(plan.deny, None);
        }

        #[test]
        fn test_narrowing_denies_dropped_fields() {
            let plan = plan(Some(Permissions::all()), R);
            assert_eq!(plan.allow, Some(R));
            assert_eq!(plan.deny, Some(Permissions::new(false, true, true)));
        }

        #[test]
        fn test_all_false_revokes_everything_held() {
            let plan = plan(Some(RW), NONE);
            assert_eq!(plan.allow, None);
            assert_eq!(plan.deny, Some(RW));
        }

        #[test]
        fn test_nothing_held_nothing_wanted() {
            assert!(plan(None, NONE).is_noop());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(RW.to_string(), "read,write");
        assert_eq!(Permissions::all().to_string(), "read,write,owner");
        assert_eq!(NONE.to_string(), "none");
    }

    #[test]
    fn test_deserialize_missing_fields_as_false() {
        let permissions: Permissions = serde_json::from_str(r#"{"owner": true}"#).unwrap();
        assert_eq!(permissions, Permissions::new(false, false, true));
    }
}
