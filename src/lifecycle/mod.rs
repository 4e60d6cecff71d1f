//! # Lifecycle Policy Bridge
//!
//! Garage's admin API cannot configure object expiration, but its
//! S3-compatible endpoint accepts lifecycle configuration documents. The
//! bridge manages a single expiration rule per bucket through that endpoint:
//!
//! - `PUT /<bucket>?lifecycle` replaces the whole document
//! - `GET /<bucket>?lifecycle` reads it back (404 means no policy)
//! - `DELETE /<bucket>?lifecycle` removes it (404 is fine)
//!
//! Buckets are addressed by their first global alias, or by id when they have
//! none. The data-plane address is derived from the admin endpoint.

pub mod xml;

use crate::client::{BucketInfo, GarageClient};
use crate::error::{LifecycleError, LifecycleOperation};
use crate::observability::metrics;
use crate::transport::{TransportRequest, TransportResponse};
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Method, StatusCode};
use tracing::{debug, info, info_span, Instrument};
use xml::LifecycleConfiguration;

/// Name a bucket is addressed by on the data plane
pub fn bucket_path_name(bucket: &BucketInfo) -> &str {
    bucket
        .global_aliases
        .first()
        .map_or(bucket.id.as_str(), String::as_str)
}

/// Expiration policy manager for buckets of one Garage cluster
#[derive(Debug, Clone, Copy)]
pub struct LifecycleBridge<'a> {
    client: &'a GarageClient,
}

impl<'a> LifecycleBridge<'a> {
    pub fn new(client: &'a GarageClient) -> Self {
        Self { client }
    }

    /// Expire objects of the bucket `days` days after creation
    ///
    /// # Errors
    /// `InvalidDays` for 0 (clear the policy instead), or any failure
    /// resolving the bucket or storing the document
    pub async fn set_policy(&self, bucket_id: &str, days: u32) -> Result<(), LifecycleError> {
        if days == 0 {
            return Err(LifecycleError::InvalidDays {
                bucket: bucket_id.to_string(),
            });
        }
        let name = self.resolve(LifecycleOperation::Set, bucket_id).await?;
        self.set_policy_by_name(&name, days).await
    }

    /// Expiration in days of the bucket's policy, 0 when it has none
    pub async fn get_policy(&self, bucket_id: &str) -> Result<u32, LifecycleError> {
        let name = self.resolve(LifecycleOperation::Get, bucket_id).await?;
        self.get_policy_by_name(&name).await
    }

    /// Remove the bucket's policy; succeeds when there is none
    pub async fn clear_policy(&self, bucket_id: &str) -> Result<(), LifecycleError> {
        let name = self.resolve(LifecycleOperation::Clear, bucket_id).await?;
        self.clear_policy_by_name(&name).await
    }

    /// [`set_policy`](Self::set_policy) for a bucket already resolved to its path name
    pub async fn set_policy_by_name(&self, bucket: &str, days: u32) -> Result<(), LifecycleError> {
        if days == 0 {
            return Err(LifecycleError::InvalidDays {
                bucket: bucket.to_string(),
            });
        }

        let body = LifecycleConfiguration::expire_after_days(days)
            .to_xml()
            .map_err(|source| LifecycleError::Serialize {
                bucket: bucket.to_string(),
                source,
            })?;

        let response = self
            .send(LifecycleOperation::Set, bucket, Method::PUT, Some(body))
            .await?;
        match response.status {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                info!("Set expiration of bucket {} to {} days", bucket, days);
                Ok(())
            }
            status => Err(unexpected(LifecycleOperation::Set, bucket, status, &response)),
        }
    }

    /// [`get_policy`](Self::get_policy) for a bucket already resolved to its path name
    pub async fn get_policy_by_name(&self, bucket: &str) -> Result<u32, LifecycleError> {
        let response = self
            .send(LifecycleOperation::Get, bucket, Method::GET, None)
            .await?;
        match response.status {
            StatusCode::NOT_FOUND => {
                debug!("Bucket {} has no lifecycle configuration", bucket);
                Ok(0)
            }
            StatusCode::OK => {
                let document = LifecycleConfiguration::from_xml(&response.body).map_err(|source| {
                    metrics::increment_lifecycle_errors(LifecycleOperation::Get.as_str());
                    LifecycleError::Parse {
                        bucket: bucket.to_string(),
                        source,
                    }
                })?;
                let days = document.expiration_days();
                debug!("Bucket {} expires objects after {} days", bucket, days);
                Ok(days)
            }
            status => Err(unexpected(LifecycleOperation::Get, bucket, status, &response)),
        }
    }

    /// [`clear_policy`](Self::clear_policy) for a bucket already resolved to its path name
    pub async fn clear_policy_by_name(&self, bucket: &str) -> Result<(), LifecycleError> {
        let response = self
            .send(LifecycleOperation::Clear, bucket, Method::DELETE, None)
            .await?;
        match response.status {
            StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => {
                info!("Cleared expiration of bucket {}", bucket);
                Ok(())
            }
            status => Err(unexpected(LifecycleOperation::Clear, bucket, status, &response)),
        }
    }

    async fn resolve(
        &self,
        operation: LifecycleOperation,
        bucket_id: &str,
    ) -> Result<String, LifecycleError> {
        let info = self
            .client
            .get_bucket(bucket_id)
            .await
            .map_err(|source| LifecycleError::ResolveBucket {
                operation,
                bucket: bucket_id.to_string(),
                source,
            })?;
        Ok(bucket_path_name(&info).to_string())
    }

    async fn send(
        &self,
        operation: LifecycleOperation,
        bucket: &str,
        method: Method,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse, LifecycleError> {
        let span = info_span!(
            "garage.lifecycle",
            bucket = bucket,
            operation = operation.as_str()
        );

        async move {
            metrics::record_lifecycle_operation(operation.as_str());

            let url = self.client.lifecycle_url(bucket).map_err(|source| {
                metrics::increment_lifecycle_errors(operation.as_str());
                LifecycleError::Endpoint {
                    operation,
                    bucket: bucket.to_string(),
                    source,
                }
            })?;

            let mut request = TransportRequest::new(method, url);
            if let Some(body) = body {
                let digest = md5::compute(&body);
                request = request
                    .header("Content-Type", "application/xml")
                    .header("Content-MD5", general_purpose::STANDARD.encode(digest.0))
                    .body(body);
            }

            self.client.send_data_plane(request).await.map_err(|source| {
                metrics::increment_lifecycle_errors(operation.as_str());
                LifecycleError::Transport {
                    operation,
                    bucket: bucket.to_string(),
                    source,
                }
            })
        }
        .instrument(span)
        .await
    }
}

fn unexpected(
    operation: LifecycleOperation,
    bucket: &str,
    status: StatusCode,
    response: &TransportResponse,
) -> LifecycleError {
    metrics::increment_lifecycle_errors(operation.as_str());
    LifecycleError::UnexpectedStatus {
        operation,
        bucket: bucket.to_string(),
        status,
        body: crate::client::truncate_body(&response.body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_path_name_prefers_first_alias() {
        let mut info = BucketInfo {
            id: "b1".to_string(),
            global_aliases: vec!["logs".to_string(), "old-logs".to_string()],
            bytes: 0,
            objects: 0,
        };
        assert_eq!(bucket_path_name(&info), "logs");

        info.global_aliases.clear();
        assert_eq!(bucket_path_name(&info), "b1");
    }

    #[test]
    fn test_content_md5_of_document() {
        let body = LifecycleConfiguration::expire_after_days(30).to_xml().unwrap();
        let encoded = general_purpose::STANDARD.encode(md5::compute(&body).0);
        // 16-byte digest -> 24 base64 characters with padding
        assert_eq!(encoded.len(), 24);
        assert!(encoded.ends_with("=="));
    }
}
