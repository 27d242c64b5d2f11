//! Response reconstruction for the original caller.
//!
//! # Responsibilities
//! - Filter upstream headers, drop `content-encoding`
//! - Decide whether a body exists (HEAD, 204, 304 carry none)
//! - Materialize the body and rewrite `content-length` to its exact size
//!
//! # Design Decisions
//! - The decompression layer already decoded the transfer, so an upstream
//!   `content-encoding` would mislabel the bytes we relay
//! - `content-length` is never trusted from upstream when a body is sent
//! - Status codes pass through unchanged, including 3xx

use axum::{
    body::{Body, Bytes, HttpBody},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    BoxError,
};
use http_body_util::BodyExt;

use crate::error::ProxyError;
use crate::http::headers::{filter_headers, HeaderCollection};

/// Body presence law for the relayed response.
pub fn body_allowed(method: &Method, status: StatusCode) -> bool {
    *method != Method::HEAD
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
}

/// Status, headers and optional body to emit to the caller.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub headers: HeaderCollection,
    pub body: Option<Bytes>,
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let body = self.body.map(Body::from).unwrap_or_else(Body::empty);
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.into_inner();
        response
    }
}

/// Apply the response header rules to already-materialized parts.
///
/// `body` is ignored when [`body_allowed`] says no body may be sent.
pub fn reconstruct_parts(
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
    body: Option<Bytes>,
) -> ResponseEnvelope {
    let mut headers = filter_headers(headers);
    headers.remove(header::CONTENT_ENCODING);

    if !body_allowed(method, status) {
        return ResponseEnvelope {
            status,
            headers,
            body: None,
        };
    }

    let body = body.unwrap_or_default();
    headers.set(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    ResponseEnvelope {
        status,
        headers,
        body: Some(body),
    }
}

/// Turn the upstream response into the caller's response, reading the
/// body to completion only when one is allowed.
pub async fn reconstruct<B>(
    method: &Method,
    upstream: axum::http::Response<B>,
) -> Result<ResponseEnvelope, ProxyError>
where
    B: HttpBody<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let (parts, body) = upstream.into_parts();

    if !body_allowed(method, parts.status) {
        return Ok(reconstruct_parts(method, parts.status, &parts.headers, None));
    }

    let body = body
        .collect()
        .await
        .map_err(ProxyError::from_upstream)?
        .to_bytes();

    Ok(reconstruct_parts(method, parts.status, &parts.headers, Some(body)))
}
