//! # Endpoints
//!
//! Structured admin and data-plane addresses.
//!
//! Garage serves its admin API and its S3-compatible API from the same host on
//! different ports. This module is the only place that relies on that
//! relationship: the data-plane endpoint is the admin endpoint with its port
//! replaced.

use reqwest::Url;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("unsupported scheme '{0}' (expected 'http' or 'https')")]
    UnsupportedScheme(String),

    #[error("host cannot be empty")]
    EmptyHost,

    #[error("invalid port '{port}' in host '{host}'")]
    InvalidPort { host: String, port: String },

    #[error("cannot build URL from '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn parse(scheme: &str) -> Result<Self, EndpointError> {
        match scheme.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(EndpointError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host string split into its host part and its trailing port segment
///
/// Bracketed IPv6 literals keep their brackets. A bare IPv6 literal (more than
/// one colon, no brackets) has no port segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HostPort<'a> {
    host: &'a str,
    port: Option<&'a str>,
}

impl<'a> HostPort<'a> {
    fn split(input: &'a str) -> Self {
        if input.starts_with('[') {
            if let Some(end) = input.find(']') {
                let (host, rest) = input.split_at(end + 1);
                return Self {
                    host,
                    port: rest.strip_prefix(':'),
                };
            }
        }

        match input.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => Self {
                host,
                port: Some(port),
            },
            _ => Self {
                host: input,
                port: None,
            },
        }
    }

    /// Host part in the form usable in an authority (IPv6 bracketed)
    fn authority_host(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.to_string()
        }
    }
}

/// Replace the trailing port segment of `host` with `port`, or append it
///
/// ```
/// use garage_reconciler::endpoint::derive_data_plane_host;
///
/// assert_eq!(derive_data_plane_host("127.0.0.1:3903", 3900), "127.0.0.1:3900");
/// assert_eq!(derive_data_plane_host("garage.local", 3900), "garage.local:3900");
/// ```
pub fn derive_data_plane_host(host: &str, port: u16) -> String {
    let parts = HostPort::split(host.trim());
    format!("{}:{}", parts.authority_host(), port)
}

/// Scheme, host and optional port of a Garage service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
}

impl Endpoint {
    /// Parse an endpoint from a scheme and a `host[:port]` string
    pub fn parse(scheme: &str, host: &str) -> Result<Self, EndpointError> {
        let scheme = Scheme::parse(scheme)?;
        let trimmed = host.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(EndpointError::EmptyHost);
        }

        let parts = HostPort::split(trimmed);
        if parts.host.is_empty() || parts.host == "[]" {
            return Err(EndpointError::EmptyHost);
        }
        let port = match parts.port {
            Some(port) => Some(port.parse::<u16>().map_err(|_| EndpointError::InvalidPort {
                host: trimmed.to_string(),
                port: port.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            scheme,
            host: parts.authority_host(),
            port,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `host[:port]`
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Same scheme and host, different port
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            scheme: self.scheme,
            host: self.host.clone(),
            port: Some(port),
        }
    }

    /// The S3-compatible endpoint that sits next to this admin endpoint
    #[must_use]
    pub fn data_plane(&self, port: u16) -> Self {
        self.with_port(port)
    }

    /// Root URL of the endpoint
    pub fn base_url(&self) -> Result<Url, EndpointError> {
        let raw = format!("{}://{}/", self.scheme, self.authority());
        Url::parse(&raw).map_err(|e| EndpointError::InvalidUrl {
            url: raw.clone(),
            message: e.to_string(),
        })
    }

    /// URL of `path` with the given query pairs, values percent-encoded
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, EndpointError> {
        let mut url = self.base_url()?;
        url.set_path(path);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        Ok(url)
    }

    /// URL of a bucket sub-resource selected by a bare query flag, e.g. `/<bucket>?lifecycle`
    pub fn bucket_subresource_url(&self, bucket: &str, subresource: &str) -> Result<Url, EndpointError> {
        let mut url = self.base_url()?;
        url.set_path(&format!("/{bucket}"));
        url.set_query(Some(subresource));
        Ok(url)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod derive_tests {
        use super::*;

        #[test]
        fn test_replaces_trailing_port() {
            assert_eq!(derive_data_plane_host("127.0.0.1:3903", 3900), "127.0.0.1:3900");
            assert_eq!(
                derive_data_plane_host("garage.internal:13903", 3900),
                "garage.internal:3900"
            );
        }

        #[test]
        fn test_appends_port_when_missing() {
            assert_eq!(derive_data_plane_host("garage.local", 3900), "garage.local:3900");
        }

        #[test]
        fn test_replaces_only_the_last_segment() {
            // Anything after the last colon is the port segment, whatever it holds
            assert_eq!(derive_data_plane_host("garage.local:admin", 3900), "garage.local:3900");
            assert_eq!(derive_data_plane_host("garage.local:", 3900), "garage.local:3900");
        }

        #[test]
        fn test_bracketed_ipv6() {
            assert_eq!(derive_data_plane_host("[::1]:3903", 3900), "[::1]:3900");
            assert_eq!(derive_data_plane_host("[fd00::2]", 3900), "[fd00::2]:3900");
        }

        #[test]
        fn test_bare_ipv6_is_bracketed() {
            assert_eq!(derive_data_plane_host("::1", 3900), "[::1]:3900");
        }

        #[test]
        fn test_custom_port() {
            assert_eq!(derive_data_plane_host("10.0.0.5:3903", 9000), "10.0.0.5:9000");
        }
    }

    mod endpoint_tests {
        use super::*;

        #[test]
        fn test_parse_host_and_port() {
            let endpoint = Endpoint::parse("http", "127.0.0.1:3903").unwrap();
            assert_eq!(endpoint.scheme(), Scheme::Http);
            assert_eq!(endpoint.host(), "127.0.0.1");
            assert_eq!(endpoint.port(), Some(3903));
            assert_eq!(endpoint.to_string(), "http://127.0.0.1:3903");
        }

        #[test]
        fn test_parse_without_port() {
            let endpoint = Endpoint::parse("HTTPS", "garage.example.com").unwrap();
            assert_eq!(endpoint.scheme(), Scheme::Https);
            assert_eq!(endpoint.port(), None);
            assert_eq!(endpoint.authority(), "garage.example.com");
        }

        #[test]
        fn test_parse_rejects_bad_input() {
            assert_eq!(
                Endpoint::parse("ftp", "garage.local"),
                Err(EndpointError::UnsupportedScheme("ftp".to_string()))
            );
            assert_eq!(Endpoint::parse("http", "  "), Err(EndpointError::EmptyHost));
            assert!(matches!(
                Endpoint::parse("http", "garage.local:admin"),
                Err(EndpointError::InvalidPort { .. })
            ));
        }

        #[test]
        fn test_data_plane_matches_derived_host() {
            for host in ["127.0.0.1:3903", "garage.local", "[::1]:3903"] {
                let endpoint = Endpoint::parse("http", host).unwrap();
                assert_eq!(
                    endpoint.data_plane(3900).authority(),
                    derive_data_plane_host(host, 3900),
                    "structured and string derivation disagree for {host}"
                );
            }
        }

        #[test]
        fn test_data_plane_keeps_scheme() {
            let endpoint = Endpoint::parse("https", "garage.local:3903").unwrap();
            assert_eq!(endpoint.data_plane(3900).to_string(), "https://garage.local:3900");
        }

        #[test]
        fn test_url_encodes_query_values() {
            let endpoint = Endpoint::parse("http", "127.0.0.1:3903").unwrap();
            let url = endpoint
                .url("/v2/GetBucketInfo", &[("id", "a b&c")])
                .unwrap();
            assert_eq!(
                url.as_str(),
                "http://127.0.0.1:3903/v2/GetBucketInfo?id=a+b%26c"
            );
        }

        #[test]
        fn test_bucket_subresource_url() {
            let endpoint = Endpoint::parse("http", "127.0.0.1:3903")
                .unwrap()
                .data_plane(3900);
            let url = endpoint.bucket_subresource_url("logs", "lifecycle").unwrap();
            assert_eq!(url.as_str(), "http://127.0.0.1:3900/logs?lifecycle");
        }
    }
}
