//! Common test utilities
//!
//! Provides rustls initialization for the Pact tests and [`FakeGarage`], an
//! in-memory Garage that answers the admin API on port 3903 and the
//! lifecycle sub-resource on port 3900.

#![allow(dead_code)]

use async_trait::async_trait;
use garage_reconciler::prelude::*;
use garage_reconciler::transport::{TransportError, TransportRequest, TransportResponse};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, Once};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const ADMIN_HOST: &str = "127.0.0.1:3903";

/// Label of a lifecycle request in failure injection and request counts
pub fn lifecycle_label(method: &Method) -> String {
    format!("lifecycle:{method}")
}

#[derive(Debug, Clone)]
struct FakeKey {
    name: String,
}

#[derive(Debug, Clone)]
struct FakeBucket {
    aliases: Vec<String>,
    bytes: i64,
    objects: i64,
}

enum Injected {
    Status(StatusCode, String),
    Transport,
}

#[derive(Default)]
struct State {
    keys: BTreeMap<String, FakeKey>,
    buckets: BTreeMap<String, FakeBucket>,
    grants: BTreeMap<(String, String), Permissions>,
    lifecycle: BTreeMap<String, Vec<u8>>,
    failures: BTreeMap<String, VecDeque<Injected>>,
    requests: Vec<(String, TransportRequest)>,
    next_id: u32,
}

/// In-memory Garage cluster
#[derive(Default)]
pub struct FakeGarage {
    state: Mutex<State>,
}

impl FakeGarage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Client talking to this fake with the right token
    pub fn client(self: &Arc<Self>) -> GarageClient {
        self.client_with_token(ADMIN_TOKEN)
    }

    pub fn client_with_token(self: &Arc<Self>, token: &str) -> GarageClient {
        let transport: Arc<dyn HttpTransport> = self.clone();
        GarageClient::new(
            transport,
            Endpoint::parse("http", ADMIN_HOST).unwrap(),
            BearerToken::new(token),
        )
    }

    // ------------------------------------------------------------------
    // Test controls
    // ------------------------------------------------------------------

    /// Next request with `label` answers `status` with a Garage error body
    pub fn fail_next(&self, label: &str, status: StatusCode) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(label.to_string())
            .or_default()
            .push_back(Injected::Status(status, "InjectedFailure".to_string()));
    }

    /// Next request with `label` never reaches the server
    pub fn drop_next(&self, label: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(label.to_string())
            .or_default()
            .push_back(Injected::Transport);
    }

    /// Key disappears out-of-band, taking its grants with it
    pub fn remove_key(&self, access_key_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.keys.remove(access_key_id);
        state.grants.retain(|(_, key), _| key != access_key_id);
    }

    /// Bucket disappears out-of-band
    pub fn remove_bucket(&self, bucket_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(bucket) = state.buckets.remove(bucket_id) {
            for alias in &bucket.aliases {
                state.lifecycle.remove(alias);
            }
        }
        state.lifecycle.remove(bucket_id);
        state.grants.retain(|(bucket, _), _| bucket != bucket_id);
    }

    /// Store a lifecycle document as-is, bypassing validation
    pub fn put_raw_lifecycle(&self, bucket_name: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .lifecycle
            .insert(bucket_name.to_string(), body.as_bytes().to_vec());
    }

    /// Record a grant out-of-band
    pub fn set_grant(&self, bucket_id: &str, access_key_id: &str, permissions: Permissions) {
        let mut state = self.state.lock().unwrap();
        let key = (bucket_id.to_string(), access_key_id.to_string());
        if permissions.is_empty() {
            state.grants.remove(&key);
        } else {
            state.grants.insert(key, permissions);
        }
    }

    pub fn grant(&self, bucket_id: &str, access_key_id: &str) -> Option<Permissions> {
        self.state
            .lock()
            .unwrap()
            .grants
            .get(&(bucket_id.to_string(), access_key_id.to_string()))
            .copied()
    }

    pub fn lifecycle_document(&self, bucket_name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .lifecycle
            .get(bucket_name)
            .map(|body| String::from_utf8_lossy(body).into_owned())
    }

    pub fn key_count(&self) -> usize {
        self.state.lock().unwrap().keys.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.state.lock().unwrap().buckets.len()
    }

    /// Number of requests seen with `label` (admin operation name or [`lifecycle_label`])
    pub fn request_count(&self, label: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(seen, _)| seen == label)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Last request seen with `label`
    pub fn last_request(&self, label: &str) -> Option<TransportRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .rev()
            .find(|(seen, _)| seen == label)
            .map(|(_, request)| request.clone())
    }

    // ------------------------------------------------------------------
    // Request handling
    // ------------------------------------------------------------------

    fn label(request: &TransportRequest) -> String {
        match request.url.port() {
            Some(3900) => lifecycle_label(&request.method),
            _ => request
                .url
                .path()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn handle(&self, label: &str, request: &TransportRequest) -> TransportResponse {
        let expected = format!("Bearer {ADMIN_TOKEN}");
        if request.header_value("Authorization") != Some(expected.as_str()) {
            return error(StatusCode::FORBIDDEN, "AccessDenied", "bad admin token");
        }

        let mut state = self.state.lock().unwrap();
        match request.url.port() {
            Some(3903) => state.admin(label, request),
            Some(3900) => state.data_plane(request),
            _ => error(StatusCode::BAD_GATEWAY, "UnknownPort", "nothing listens here"),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeGarage {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let label = Self::label(&request);
        let injected = {
            let mut state = self.state.lock().unwrap();
            state.requests.push((label.clone(), request.clone()));
            state
                .failures
                .get_mut(&label)
                .and_then(VecDeque::pop_front)
        };

        match injected {
            Some(Injected::Transport) => Err(TransportError::Connection {
                method: request.method.clone(),
                url: request.url.to_string(),
                message: "connection refused".to_string(),
            }),
            Some(Injected::Status(status, code)) => {
                Ok(error(status, &code, "injected by test"))
            }
            None => Ok(self.handle(&label, &request)),
        }
    }
}

fn error(status: StatusCode, code: &str, message: &str) -> TransportResponse {
    TransportResponse::new(
        status,
        json!({"code": code, "message": message, "region": "garage", "path": ""}).to_string(),
    )
}

fn ok(body: &Value) -> TransportResponse {
    TransportResponse::new(StatusCode::OK, body.to_string())
}

fn body_json(request: &TransportRequest) -> Value {
    request
        .body
        .as_deref()
        .and_then(|body| serde_json::from_slice(body).ok())
        .unwrap_or(Value::Null)
}

fn query_id(request: &TransportRequest) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
}

fn permissions_of(value: &Value) -> Permissions {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

impl State {
    fn admin(&mut self, operation: &str, request: &TransportRequest) -> TransportResponse {
        match (request.method.as_str(), operation) {
            ("POST", "CreateKey") => {
                self.next_id += 1;
                let id = format!("GK{:024x}", self.next_id);
                let name = body_json(request)["name"].as_str().unwrap_or_default().to_string();
                let secret = format!("secret-{:056x}", self.next_id);
                self.keys.insert(id.clone(), FakeKey { name: name.clone() });
                ok(&json!({
                    "accessKeyId": id,
                    "name": name,
                    "secretAccessKey": secret,
                    "buckets": [],
                }))
            }
            ("GET", "GetKeyInfo") => {
                let id = query_id(request).unwrap_or_default();
                match self.keys.get(&id) {
                    Some(key) => ok(&self.key_json(&id, key)),
                    None => not_found_key(&id),
                }
            }
            ("POST", "CreateBucket") => {
                let alias = body_json(request)["globalAlias"]
                    .as_str()
                    .map(str::to_string);
                if let Some(alias) = &alias {
                    if self.bucket_by_name(alias).is_some() {
                        return error(
                            StatusCode::CONFLICT,
                            "BucketAlreadyExists",
                            &format!("Bucket {alias} already exists"),
                        );
                    }
                }
                self.next_id += 1;
                let id = format!("{:064x}", self.next_id);
                let bucket = FakeBucket {
                    aliases: alias.into_iter().collect(),
                    bytes: 0,
                    objects: 0,
                };
                let body = bucket_json(&id, &bucket);
                self.buckets.insert(id, bucket);
                ok(&body)
            }
            ("GET", "GetBucketInfo") => {
                let id = query_id(request).unwrap_or_default();
                match self.buckets.get(&id) {
                    Some(bucket) => ok(&bucket_json(&id, bucket)),
                    None => not_found_bucket(&id),
                }
            }
            ("POST", "AllowBucketKey" | "DenyBucketKey") => {
                let body = body_json(request);
                let bucket_id = body["bucketId"].as_str().unwrap_or_default().to_string();
                let key_id = body["accessKeyId"].as_str().unwrap_or_default().to_string();
                let requested = permissions_of(&body["permissions"]);

                let Some(bucket) = self.buckets.get(&bucket_id).cloned() else {
                    return not_found_bucket(&bucket_id);
                };
                if !self.keys.contains_key(&key_id) {
                    return not_found_key(&key_id);
                }

                let entry = (bucket_id.clone(), key_id);
                let current = self.grants.get(&entry).copied().unwrap_or_default();
                let next = if operation == "AllowBucketKey" {
                    Permissions::new(
                        current.read || requested.read,
                        current.write || requested.write,
                        current.owner || requested.owner,
                    )
                } else {
                    Permissions::new(
                        current.read && !requested.read,
                        current.write && !requested.write,
                        current.owner && !requested.owner,
                    )
                };
                if next.is_empty() {
                    self.grants.remove(&entry);
                } else {
                    self.grants.insert(entry, next);
                }
                ok(&bucket_json(&bucket_id, &bucket))
            }
            _ => error(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                &format!("unknown endpoint {operation}"),
            ),
        }
    }

    fn data_plane(&mut self, request: &TransportRequest) -> TransportResponse {
        if request.url.query() != Some("lifecycle") {
            return error(StatusCode::BAD_REQUEST, "InvalidRequest", "expected ?lifecycle");
        }
        let name = request.url.path().trim_start_matches('/').to_string();
        if self.bucket_by_name(&name).is_none() {
            return error(StatusCode::NOT_FOUND, "NoSuchBucket", &name);
        }

        match request.method.as_str() {
            "PUT" => {
                let body = request.body.clone().unwrap_or_default();
                if request.header_value("Content-MD5").is_none() {
                    return error(StatusCode::BAD_REQUEST, "MissingContentMD5", &name);
                }
                self.lifecycle.insert(name, body);
                TransportResponse::new(StatusCode::OK, Vec::new())
            }
            "GET" => match self.lifecycle.get(&name) {
                Some(body) => TransportResponse::new(StatusCode::OK, body.clone()),
                None => error(
                    StatusCode::NOT_FOUND,
                    "NoSuchLifecycleConfiguration",
                    "The lifecycle configuration does not exist",
                ),
            },
            "DELETE" => {
                self.lifecycle.remove(&name);
                TransportResponse::new(StatusCode::NO_CONTENT, Vec::new())
            }
            _ => error(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed", &name),
        }
    }

    fn bucket_by_name(&self, name: &str) -> Option<&String> {
        self.buckets
            .iter()
            .find(|(id, bucket)| *id == name || bucket.aliases.iter().any(|a| a == name))
            .map(|(id, _)| id)
    }

    fn key_json(&self, id: &str, key: &FakeKey) -> Value {
        let buckets: Vec<Value> = self
            .grants
            .iter()
            .filter(|((_, key_id), _)| key_id == id)
            .map(|((bucket_id, _), permissions)| {
                let aliases = self
                    .buckets
                    .get(bucket_id)
                    .map(|b| b.aliases.clone())
                    .unwrap_or_default();
                json!({
                    "id": bucket_id,
                    "globalAliases": aliases,
                    "localAliases": [],
                    "permissions": permissions,
                })
            })
            .collect();
        // GetKeyInfo only reveals the secret with showSecretKey, which the client never sets
        json!({
            "accessKeyId": id,
            "name": key.name,
            "secretAccessKey": null,
            "expired": false,
            "permissions": {"createBucket": false},
            "buckets": buckets,
        })
    }
}

fn bucket_json(id: &str, bucket: &FakeBucket) -> Value {
    json!({
        "id": id,
        "globalAliases": bucket.aliases,
        "websiteAccess": false,
        "keys": [],
        "objects": bucket.objects,
        "bytes": bucket.bytes,
    })
}

fn not_found_key(id: &str) -> TransportResponse {
    error(
        StatusCode::NOT_FOUND,
        "NoSuchAccessKey",
        &format!("Access key not found: {id}"),
    )
}

fn not_found_bucket(id: &str) -> TransportResponse {
    error(
        StatusCode::NOT_FOUND,
        "NoSuchBucket",
        &format!("Bucket not found: {id}"),
    )
}
