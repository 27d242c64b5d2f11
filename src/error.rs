//! Proxy failure taxonomy.
//!
//! # Design Decisions
//! - Nothing here is recovered locally: no retry, no fallback
//! - Upstream failures map to a generic 5xx: 502 unreachable, 504 timed out
//! - Failures caused by the caller's own request deviate from the blanket
//!   5xx rule and return 4xx, so the caller is not told the upstream broke:
//!   a body that cannot be read (400), a body over `limits.max_body_bytes`
//!   (413), a request target that is not origin-form (400)
//! - Response bodies are short plain text, never upstream-derived

use std::error::Error as StdError;
use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError,
};
use thiserror::Error;

/// A failure of a single proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// DNS, connect, TLS or mid-body transport failure talking to the upstream.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] BoxError),

    /// The connect timeout or the configured request deadline elapsed.
    #[error("upstream timed out: {0}")]
    UpstreamTimeout(#[source] BoxError),

    /// The inbound body could not be read to completion.
    #[error("failed to read inbound request body: {0}")]
    InboundBodyReadFailure(#[source] BoxError),

    /// The inbound body exceeded `limits.max_body_bytes`.
    #[error("inbound request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Path and query could not be resolved against the upstream origin.
    #[error("malformed target: {0}")]
    MalformedTarget(String),
}

impl ProxyError {
    /// Classify a client error from the upstream call.
    pub fn from_upstream(err: impl Into<BoxError>) -> Self {
        let err = err.into();
        if is_timeout(err.as_ref()) {
            ProxyError::UpstreamTimeout(err)
        } else {
            ProxyError::UpstreamUnreachable(err)
        }
    }

    /// Status code returned to the original caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InboundBodyReadFailure(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::MalformedTarget(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::UpstreamUnreachable(_) => "upstream_unreachable",
            ProxyError::UpstreamTimeout(_) => "upstream_timeout",
            ProxyError::InboundBodyReadFailure(_) => "inbound_body_read_failure",
            ProxyError::BodyTooLarge { .. } => "body_too_large",
            ProxyError::MalformedTarget(_) => "malformed_target",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            ProxyError::UpstreamUnreachable(_) => "Upstream request failed",
            ProxyError::UpstreamTimeout(_) => "Upstream request timed out",
            ProxyError::InboundBodyReadFailure(_) => "Failed to read request body",
            ProxyError::BodyTooLarge { .. } => "Request body too large",
            ProxyError::MalformedTarget(_) => "Malformed request target",
        }
    }
}

/// Whether `err` or anything in its source chain is a timeout.
fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<tokio::time::error::Elapsed>() {
            return true;
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }
        current = err.source();
    }
    false
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ProxyError::MalformedTarget("*".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "malformed_target");

        let err = ProxyError::BodyTooLarge { limit: 10 };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.to_string(), "inbound request body exceeds 10 bytes");

        let err = ProxyError::InboundBodyReadFailure("connection reset".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_errors_are_5xx_and_caller_errors_4xx() {
        let err = ProxyError::from_upstream(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(matches!(err, ProxyError::UpstreamUnreachable(_)));
        assert!(err.status().is_server_error());

        let err = ProxyError::InboundBodyReadFailure("client went away".into());
        assert!(err.status().is_client_error());
        assert!(ProxyError::BodyTooLarge { limit: 1 }.status().is_client_error());
        assert!(ProxyError::MalformedTarget("*".into()).status().is_client_error());
    }

    #[test]
    fn test_timeout_found_in_source_chain() {
        #[derive(Debug, Error)]
        #[error("client error")]
        struct Wrapper(#[source] io::Error);

        let err = ProxyError::from_upstream(Wrapper(io::Error::new(
            io::ErrorKind::TimedOut,
            "connect timeout",
        )));
        assert!(matches!(err, ProxyError::UpstreamTimeout(_)));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.kind(), "upstream_timeout");
    }

    #[tokio::test]
    async fn test_elapsed_deadline_is_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        let err = ProxyError::from_upstream(elapsed);
        assert!(matches!(err, ProxyError::UpstreamTimeout(_)));
    }

    #[test]
    fn test_error_response_is_generic() {
        let response = ProxyError::MalformedTarget("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
