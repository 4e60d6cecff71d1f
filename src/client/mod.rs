//! # Garage Client
//!
//! Thin gateway over the Garage admin API v2 and the bucket-scoped requests the
//! lifecycle bridge sends to the S3-compatible endpoint.
//!
//! The client holds no state beyond its configuration. Every call builds a
//! complete request, hands it to the injected [`HttpTransport`], and maps the
//! outcome to a typed result or an [`ApiError`] naming the operation.
//!
//! References:
//! - [Garage admin API v2](https://garagehq.deuxfleurs.fr/api/garage-admin-v2.html)

mod requests;
mod responses;

pub use responses::{BucketInfo, KeyBucket, KeyInfo, SecretAccessKey};

use crate::config::{BearerToken, ConfigError, GarageConfig};
use crate::constants::{ADMIN_API_PREFIX, LIFECYCLE_QUERY, MAX_ERROR_BODY_BYTES};
use crate::endpoint::{Endpoint, EndpointError};
use crate::error::ApiError;
use crate::observability::metrics;
use crate::permissions::Permissions;
use crate::transport::{
    HttpTransport, ReqwestTransport, TransportError, TransportRequest, TransportResponse,
};
use requests::{BucketKeyPermissionRequest, CreateBucketRequest, CreateKeyRequest};
use reqwest::{Method, StatusCode, Url};
use responses::ErrorBody;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, info, Instrument};

/// Admin API operations consumed by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminOperation {
    CreateKey,
    GetKeyInfo,
    CreateBucket,
    GetBucketInfo,
    AllowBucketKey,
    DenyBucketKey,
}

impl AdminOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateKey => "CreateKey",
            Self::GetKeyInfo => "GetKeyInfo",
            Self::CreateBucket => "CreateBucket",
            Self::GetBucketInfo => "GetBucketInfo",
            Self::AllowBucketKey => "AllowBucketKey",
            Self::DenyBucketKey => "DenyBucketKey",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Self::GetKeyInfo | Self::GetBucketInfo => Method::GET,
            Self::CreateKey | Self::CreateBucket | Self::AllowBucketKey | Self::DenyBucketKey => {
                Method::POST
            }
        }
    }

    /// e.g. `/v2/GetKeyInfo`
    pub fn path(self) -> String {
        format!("{ADMIN_API_PREFIX}/{}", self.as_str())
    }
}

impl fmt::Display for AdminOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Garage admin API client
#[derive(Clone)]
pub struct GarageClient {
    transport: Arc<dyn HttpTransport>,
    admin: Endpoint,
    token: BearerToken,
    data_plane_port: u16,
}

impl fmt::Debug for GarageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarageClient")
            .field("admin", &self.admin)
            .field("data_plane_port", &self.data_plane_port)
            .finish_non_exhaustive()
    }
}

impl GarageClient {
    pub fn new(transport: Arc<dyn HttpTransport>, admin: Endpoint, token: BearerToken) -> Self {
        Self {
            transport,
            admin,
            token,
            data_plane_port: crate::constants::DEFAULT_DATA_PLANE_PORT,
        }
    }

    #[must_use]
    pub fn with_data_plane_port(mut self, port: u16) -> Self {
        self.data_plane_port = port;
        self
    }

    /// Build a reqwest-backed client from loaded configuration
    ///
    /// # Errors
    /// Returns an error if the token is missing, the endpoint does not parse,
    /// or the HTTP client cannot be initialized
    pub fn from_config(config: &GarageConfig) -> Result<Self, ConfigError> {
        let token = config.token.clone().ok_or(ConfigError::MissingToken)?;
        let admin = Endpoint::parse(&config.scheme, &config.host)?;
        let transport = ReqwestTransport::new(config.request_timeout())
            .map_err(ConfigError::HttpClient)?;

        info!(
            "Garage admin endpoint {}, data-plane port {}",
            admin, config.data_plane_port
        );

        Ok(Self::new(Arc::new(transport), admin, token).with_data_plane_port(config.data_plane_port))
    }

    pub fn admin_endpoint(&self) -> &Endpoint {
        &self.admin
    }

    pub fn data_plane_port(&self) -> u16 {
        self.data_plane_port
    }

    /// S3-compatible endpoint on the admin host
    pub fn data_plane_endpoint(&self) -> Endpoint {
        self.admin.data_plane(self.data_plane_port)
    }

    // ------------------------------------------------------------------
    // Access keys
    // ------------------------------------------------------------------

    pub async fn create_key(&self, name: &str) -> Result<KeyInfo, ApiError> {
        let operation = AdminOperation::CreateKey;
        let body = encode(operation, &CreateKeyRequest { name })?;
        let response = self.call(operation, &[], Some(body)).await?;
        let key: KeyInfo = decode(operation, &response)?;
        info!("Created access key {} ({})", key.access_key_id, key.name);
        Ok(key)
    }

    pub async fn get_key(&self, access_key_id: &str) -> Result<KeyInfo, ApiError> {
        let operation = AdminOperation::GetKeyInfo;
        let response = self.call(operation, &[("id", access_key_id)], None).await?;
        decode(operation, &response)
    }

    // ------------------------------------------------------------------
    // Buckets
    // ------------------------------------------------------------------

    pub async fn create_bucket(&self, global_alias: Option<&str>) -> Result<BucketInfo, ApiError> {
        let operation = AdminOperation::CreateBucket;
        let body = encode(operation, &CreateBucketRequest { global_alias })?;
        let response = self.call(operation, &[], Some(body)).await?;
        let bucket: BucketInfo = decode(operation, &response)?;
        info!(
            "Created bucket {} (aliases: {:?})",
            bucket.id, bucket.global_aliases
        );
        Ok(bucket)
    }

    pub async fn get_bucket(&self, bucket_id: &str) -> Result<BucketInfo, ApiError> {
        let operation = AdminOperation::GetBucketInfo;
        let response = self.call(operation, &[("id", bucket_id)], None).await?;
        decode(operation, &response)
    }

    // ------------------------------------------------------------------
    // Bucket / key permissions
    // ------------------------------------------------------------------

    /// Grant the `true` capabilities of `permissions`
    pub async fn allow_bucket_key(
        &self,
        bucket_id: &str,
        access_key_id: &str,
        permissions: Permissions,
    ) -> Result<(), ApiError> {
        self.bucket_key_permission(
            AdminOperation::AllowBucketKey,
            bucket_id,
            access_key_id,
            permissions,
        )
        .await
    }

    /// Revoke the `true` capabilities of `permissions`
    pub async fn deny_bucket_key(
        &self,
        bucket_id: &str,
        access_key_id: &str,
        permissions: Permissions,
    ) -> Result<(), ApiError> {
        self.bucket_key_permission(
            AdminOperation::DenyBucketKey,
            bucket_id,
            access_key_id,
            permissions,
        )
        .await
    }

    async fn bucket_key_permission(
        &self,
        operation: AdminOperation,
        bucket_id: &str,
        access_key_id: &str,
        permissions: Permissions,
    ) -> Result<(), ApiError> {
        let body = encode(
            operation,
            &BucketKeyPermissionRequest {
                bucket_id,
                access_key_id,
                permissions,
            },
        )?;
        // Ack body is not used
        self.call(operation, &[], Some(body)).await?;
        info!(
            "{} bucket={} key={} {}",
            operation, bucket_id, access_key_id, permissions
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data plane
    // ------------------------------------------------------------------

    /// `<data-plane>/<bucket>?lifecycle`
    pub fn lifecycle_url(&self, bucket: &str) -> Result<Url, EndpointError> {
        self.data_plane_endpoint()
            .bucket_subresource_url(bucket, LIFECYCLE_QUERY)
    }

    /// Send a raw request to the data-plane endpoint with the admin credential attached
    ///
    /// Non-success statuses are returned as-is; the caller interprets them.
    pub async fn send_data_plane(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let request = request.header("Authorization", self.token.authorization_header());
        self.transport.execute(request).await
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn call(
        &self,
        operation: AdminOperation,
        query: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse, ApiError> {
        let span = debug_span!("garage.admin", operation = operation.as_str());

        async move {
            let url = self
                .admin
                .url(&operation.path(), query)
                .map_err(|source| ApiError::Endpoint { operation, source })?;

            let mut request = TransportRequest::new(operation.method(), url)
                .header("Authorization", self.token.authorization_header());
            if let Some(body) = body {
                request = request
                    .header("Content-Type", "application/json")
                    .body(body);
            }

            let start = Instant::now();
            let result = self.transport.execute(request).await;
            metrics::record_admin_operation(operation.as_str(), start.elapsed().as_secs_f64());

            let response = result.map_err(|source| {
                metrics::increment_admin_operation_errors(operation.as_str());
                ApiError::Transport { operation, source }
            })?;

            if !response.status.is_success() {
                // Not-found drives absence detection and is not counted as a failure
                if response.status != StatusCode::NOT_FOUND {
                    metrics::increment_admin_operation_errors(operation.as_str());
                }
                let message = error_message(&response.body);
                debug!("{} returned {}: {}", operation, response.status, message);
                return Err(ApiError::Status {
                    operation,
                    status: response.status,
                    message,
                });
            }

            debug!("{} succeeded", operation);
            Ok(response)
        }
        .instrument(span)
        .await
    }
}

fn encode<T: Serialize>(operation: AdminOperation, payload: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(payload).map_err(|source| ApiError::Encode { operation, source })
}

fn decode<T: DeserializeOwned>(
    operation: AdminOperation,
    response: &TransportResponse,
) -> Result<T, ApiError> {
    serde_json::from_slice(&response.body).map_err(|source| ApiError::Decode { operation, source })
}

/// `code: message` from a Garage error body, or the raw body truncated
fn error_message(body: &[u8]) -> String {
    if let Ok(ErrorBody { code, message }) = serde_json::from_slice::<ErrorBody>(body) {
        match (code, message) {
            (Some(code), Some(message)) => return format!("{code}: {message}"),
            (None, Some(message)) => return message,
            (Some(code), None) => return code,
            (None, None) => {}
        }
    }
    truncate_body(body)
}

/// Body as text, cut at [`MAX_ERROR_BODY_BYTES`] on a character boundary
pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.len() <= MAX_ERROR_BODY_BYTES {
        return text.to_string();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
