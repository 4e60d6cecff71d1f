//! Admin API request bodies

use crate::permissions::Permissions;
use serde::Serialize;

/// `POST /v2/CreateKey`
#[derive(Debug, Serialize)]
pub(crate) struct CreateKeyRequest<'a> {
    pub name: &'a str,
}

/// `POST /v2/CreateBucket`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateBucketRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_alias: Option<&'a str>,
}

/// `POST /v2/AllowBucketKey` and `POST /v2/DenyBucketKey`
///
/// For allow, `true` fields are granted; for deny, `true` fields are revoked.
/// `false` fields are left untouched by both.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BucketKeyPermissionRequest<'a> {
    pub bucket_id: &'a str,
    pub access_key_id: &'a str,
    pub permissions: Permissions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_bucket_omits_missing_alias() {
        let body = serde_json::to_value(CreateBucketRequest { global_alias: None }).unwrap();
        assert_eq!(body, json!({}));

        let body = serde_json::to_value(CreateBucketRequest {
            global_alias: Some("logs"),
        })
        .unwrap();
        assert_eq!(body, json!({"globalAlias": "logs"}));
    }

    #[test]
    fn test_permission_request_shape() {
        let body = serde_json::to_value(BucketKeyPermissionRequest {
            bucket_id: "b1",
            access_key_id: "GK1",
            permissions: Permissions::new(true, false, false),
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "bucketId": "b1",
                "accessKeyId": "GK1",
                "permissions": {"read": true, "write": false, "owner": false}
            })
        );
    }
}
