//! # HTTP Transport
//!
//! The single capability through which both the admin API gateway and the
//! lifecycle bridge reach the network.
//!
//! The gateway builds fully-formed requests (URL, headers, body) and hands them
//! to an [`HttpTransport`]. Production code uses [`ReqwestTransport`]; tests
//! substitute an in-memory implementation.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A request ready to be sent
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl TransportRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The request never produced a status line
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{method} {url} failed: {source}")]
    Http {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} timed out")]
    Timeout { method: Method, url: String },

    /// No connection could be established
    #[error("{method} {url} failed: {message}")]
    Connection {
        method: Method,
        url: String,
        message: String,
    },
}

/// Issues raw HTTP requests and returns status + body
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request and wait for the full response
    ///
    /// Non-success statuses are *not* errors at this layer; callers decide
    /// what a 404 or a 409 means for them.
    async fn execute(&self, request: TransportRequest)
        -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport shared by every call of a client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: Client,
}

impl ReqwestTransport {
    /// Build a transport whose every request is bounded by `timeout`
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be initialized
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        // rustls is selected in Cargo.toml
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let TransportRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let url_text = url.to_string();

        let mut builder = self.http_client.request(method.clone(), url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|source| {
            if source.is_timeout() {
                TransportError::Timeout {
                    method: method.clone(),
                    url: url_text.clone(),
                }
            } else if source.is_connect() {
                TransportError::Connection {
                    method: method.clone(),
                    url: url_text.clone(),
                    message: source.to_string(),
                }
            } else {
                TransportError::Http {
                    method: method.clone(),
                    url: url_text.clone(),
                    source,
                }
            }
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| TransportError::Http {
                method: method.clone(),
                url: url_text.clone(),
                source,
            })?;

        debug!("{} {} -> {}", method, url_text, status);
        Ok(TransportResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let url = Url::parse("http://127.0.0.1:3903/v2/GetKeyInfo?id=GK1").unwrap();
        let request = TransportRequest::new(Method::GET, url)
            .header("Authorization", "Bearer token")
            .header("Content-Type", "application/json");

        assert_eq!(request.header_value("authorization"), Some("Bearer token"));
        assert_eq!(
            request.header_value("CONTENT-TYPE"),
            Some("application/json")
        );
        assert_eq!(request.header_value("content-md5"), None);
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_connection_error() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse("http://127.0.0.1:1/v2/GetKeyInfo?id=GK1").unwrap();

        let err = transport
            .execute(TransportRequest::new(Method::GET, url))
            .await
            .unwrap_err();
        assert!(
            matches!(err, TransportError::Connection { .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_response_text_is_lossy() {
        let response = TransportResponse::new(StatusCode::OK, vec![b'o', b'k', 0xff]);
        assert!(response.text().starts_with("ok"));
    }
}
