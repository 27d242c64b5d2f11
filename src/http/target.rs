//! Upstream origin and per-request target resolution.
//!
//! The upstream is one fixed origin (scheme + authority), parsed once at
//! startup. Each inbound path-and-query is appended to it as-is: no prefix
//! stripping, no decoding, no re-encoding.

use std::fmt;

use axum::http::uri::{Authority, Parts, PathAndQuery, Scheme};
use axum::http::Uri;
use thiserror::Error;
use url::Url;

use crate::error::ProxyError;

/// Rejected upstream origin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid upstream origin {input:?}: {reason}")]
pub struct InvalidOrigin {
    pub input: String,
    pub reason: String,
}

impl InvalidOrigin {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// The single backend origin every request is replayed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamOrigin {
    scheme: Scheme,
    authority: Authority,
    origin: String,
}

impl UpstreamOrigin {
    /// Parse `scheme://host[:port]`. A trailing `/` is tolerated; any other
    /// path, query, fragment or userinfo is rejected.
    pub fn parse(input: &str) -> Result<Self, InvalidOrigin> {
        let url = Url::parse(input).map_err(|e| InvalidOrigin::new(input, e.to_string()))?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => {
                return Err(InvalidOrigin::new(input, format!("unsupported scheme {other:?}")))
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| InvalidOrigin::new(input, "missing host"))?;
        if !url.username().is_empty() || url.password().is_some() {
            return Err(InvalidOrigin::new(input, "userinfo is not allowed"));
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(InvalidOrigin::new(input, "origin must not carry a path, query or fragment"));
        }

        // `Url::port` already drops the scheme's default port.
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority: Authority = authority
            .parse()
            .map_err(|e| InvalidOrigin::new(input, format!("invalid authority: {e}")))?;
        let origin = format!("{scheme}://{authority}");

        Ok(Self {
            scheme,
            authority,
            origin,
        })
    }

    pub fn scheme(&self) -> &str {
        self.scheme.as_str()
    }

    /// `host[:port]`, as sent in the `host` header.
    pub fn authority(&self) -> &str {
        self.authority.as_str()
    }

    /// `scheme://host[:port]`, as sent in the `origin` header.
    pub fn as_origin_str(&self) -> &str {
        &self.origin
    }
}

impl fmt::Display for UpstreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin)
    }
}

/// Fully-qualified upstream URI for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    uri: Uri,
    host: String,
    origin: String,
}

impl TargetDescriptor {
    /// Resolve the inbound path-and-query against `origin`.
    ///
    /// Only scheme and authority are replaced; the inbound `PathAndQuery`
    /// is reused as parsed off the wire, so dot segments, percent escapes
    /// and reserved characters reach the upstream untouched.
    pub fn resolve(origin: &UpstreamOrigin, inbound: &Uri) -> Result<Self, ProxyError> {
        let path_and_query = inbound
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        if !path_and_query.as_str().starts_with('/') {
            return Err(ProxyError::MalformedTarget(format!(
                "request target {:?} is not origin-form",
                path_and_query.as_str()
            )));
        }

        let mut parts = Parts::default();
        parts.scheme = Some(origin.scheme.clone());
        parts.authority = Some(origin.authority.clone());
        parts.path_and_query = Some(path_and_query);
        let uri = Uri::from_parts(parts).map_err(|e| ProxyError::MalformedTarget(e.to_string()))?;

        Ok(Self {
            uri,
            host: origin.authority().to_string(),
            origin: origin.as_origin_str().to_string(),
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Value forced into the outbound `host` header.
    pub fn host_header(&self) -> &str {
        &self.host
    }

    /// Value forced into the outbound `origin` header.
    pub fn origin_header(&self) -> &str {
        &self.origin
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.uri, f)
    }
}
