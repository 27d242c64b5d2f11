//! Outbound request assembly and dispatch.
//!
//! # Responsibilities
//! - Capture the inbound body (never for GET/HEAD, never an empty one)
//! - Resolve the target URL and filter request headers
//! - Force `host` and `origin` to match the upstream
//! - Issue the call with redirects and caching disabled
//!
//! # Design Decisions
//! - One pooled hyper-util client per process, built at startup
//! - The client takes the target `Uri` as-is, so the upstream request line
//!   carries the inbound path and query byte for byte
//! - The client never follows redirects and keeps no cache: 3xx responses
//!   are relayed and every request reaches the upstream
//! - Transport decompression happens in a tower-http layer around the
//!   client; the response stage therefore strips `content-encoding`
//! - The optional request deadline covers the whole exchange, head and body
//! - No retries

use std::future::Future;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Method, Request, Response, Uri},
};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::{Decompression, DecompressionBody, DecompressionLayer};

use crate::config::UpstreamConfig;
use crate::error::ProxyError;
use crate::http::connector::UpstreamConnector;
use crate::http::headers::{filter_headers, HeaderCollection};
use crate::http::target::{TargetDescriptor, UpstreamOrigin};

type UpstreamClient = Decompression<Client<UpstreamConnector, Full<Bytes>>>;

/// Body of an upstream response, already transport-decoded.
pub type UpstreamBody = DecompressionBody<Incoming>;

/// Whether the forwarding layer reads a body at all for `method`.
pub fn request_body_allowed(method: &Method) -> bool {
    *method != Method::GET && *method != Method::HEAD
}

/// Read the inbound body fully into memory.
///
/// Returns `None` for GET/HEAD without touching the stream, and for any
/// body that turns out to be zero bytes long.
pub async fn read_request_body(
    method: &Method,
    body: Body,
    limit: Option<usize>,
) -> Result<Option<Bytes>, ProxyError> {
    if !request_body_allowed(method) {
        return Ok(None);
    }

    let bytes = match limit {
        Some(limit) => Limited::new(body, limit)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    ProxyError::BodyTooLarge { limit }
                } else {
                    ProxyError::InboundBodyReadFailure(e)
                }
            })?
            .to_bytes(),
        None => body
            .collect()
            .await
            .map_err(|e| ProxyError::InboundBodyReadFailure(e.into()))?
            .to_bytes(),
    };

    Ok((!bytes.is_empty()).then_some(bytes))
}

/// Request envelope ready to be sent upstream.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub target: TargetDescriptor,
    pub headers: HeaderCollection,
    pub body: Option<Bytes>,
}

/// Replays inbound requests against the configured upstream origin.
#[derive(Clone)]
pub struct Forwarder {
    client: UpstreamClient,
    origin: UpstreamOrigin,
    request_timeout: Option<Duration>,
}

impl Forwarder {
    /// Build the upstream client.
    pub fn new(origin: UpstreamOrigin, config: &UpstreamConfig) -> Result<Self, rustls::Error> {
        let connector =
            UpstreamConnector::new(config.connect_timeout_secs.map(Duration::from_secs))?;
        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(connector);

        Ok(Self {
            client: ServiceBuilder::new()
                .layer(DecompressionLayer::new())
                .service(client),
            origin,
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn origin(&self) -> &UpstreamOrigin {
        &self.origin
    }

    /// Assemble the outbound envelope without touching the network.
    pub fn prepare(
        &self,
        method: Method,
        headers: &HeaderMap,
        uri: &Uri,
        body: Option<Bytes>,
    ) -> Result<OutboundRequest, ProxyError> {
        let target = TargetDescriptor::resolve(&self.origin, uri)?;

        let mut outbound = filter_headers(headers);
        // The client frames the body it actually sends.
        outbound.remove(header::CONTENT_LENGTH);
        outbound.set(header::HOST, header_value(target.host_header())?);
        outbound.set(header::ORIGIN, header_value(target.origin_header())?);

        let body = if request_body_allowed(&method) {
            body.filter(|b| !b.is_empty())
        } else {
            None
        };

        Ok(OutboundRequest {
            method,
            target,
            headers: outbound,
            body,
        })
    }

    /// Issue the outbound call and wait for the upstream's response head.
    pub async fn send(
        &self,
        request: OutboundRequest,
    ) -> Result<Response<UpstreamBody>, ProxyError> {
        let OutboundRequest {
            method,
            target,
            headers,
            body,
        } = request;

        let mut upstream = Request::new(Full::new(body.unwrap_or_default()));
        *upstream.method_mut() = method;
        *upstream.uri_mut() = target.uri().clone();
        *upstream.headers_mut() = headers.into_inner();

        self.client
            .clone()
            .oneshot(upstream)
            .await
            .map_err(ProxyError::from_upstream)
    }

    /// Run one upstream exchange under `upstream.request_timeout_secs`, if set.
    pub async fn within_deadline<T, F>(&self, exchange: F) -> Result<T, ProxyError>
    where
        F: Future<Output = Result<T, ProxyError>>,
    {
        match self.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, exchange)
                .await
                .map_err(ProxyError::from_upstream)?,
            None => exchange.await,
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value)
        .map_err(|_| ProxyError::MalformedTarget(format!("{value:?} is not a valid header value")))
}
