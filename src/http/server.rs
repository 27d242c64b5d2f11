//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Accept every method on every path
//! - Run the pipeline: inbound body -> forwarder -> upstream -> reconstruction
//! - Turn pipeline failures into generic error statuses
//! - Serve until the shutdown signal fires
//!
//! # Design Decisions
//! - State is one shared `Forwarder`; requests never share mutable data
//! - A caller disconnect drops the handler future, which drops the in-flight
//!   upstream call with it
//! - No server-side request timeout unless `upstream.request_timeout_secs` is set

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::{ConfigError, ProxyConfig};
use crate::error::ProxyError;
use crate::http::forwarder::{read_request_body, Forwarder};
use crate::http::request::RequestId;
use crate::http::response::{reconstruct, ResponseEnvelope};
use crate::http::target::UpstreamOrigin;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
    pub max_body_bytes: Option<usize>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Build the forwarder and router. Fails if the upstream origin is
    /// invalid or the HTTP client cannot be constructed.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let origin = UpstreamOrigin::parse(&config.upstream.origin)?;
        let forwarder = Forwarder::new(origin, &config.upstream)?;

        tracing::info!(
            upstream = %forwarder.origin(),
            connect_timeout_secs = ?config.upstream.connect_timeout_secs,
            request_timeout_secs = ?config.upstream.request_timeout_secs,
            max_body_bytes = ?config.limits.max_body_bytes,
            "Upstream configured"
        );

        let state = AppState {
            forwarder: Arc::new(forwarder),
            max_body_bytes: config.limits.max_body_bytes,
        };

        Ok(Self {
            router: Self::build_router(state),
            config,
        })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Router with all layers applied, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.origin,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Relay one request to the upstream and back.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = RequestId::from_headers(request.headers());
    let method = request.method().clone();

    let span = tracing::info_span!(
        "proxy",
        request_id = %request_id,
        method = %method,
        path = %request.uri().path()
    );

    async move {
        match relay(&state, request).await {
            Ok(envelope) => {
                tracing::debug!(
                    status = %envelope.status,
                    body_bytes = envelope.body.as_ref().map(|b| b.len()),
                    "Relayed upstream response"
                );
                metrics::record_request(method.as_str(), envelope.status.as_u16(), start_time);
                envelope.into_response()
            }
            Err(err) => {
                match &err {
                    ProxyError::UpstreamUnreachable(_) | ProxyError::UpstreamTimeout(_) => {
                        tracing::error!(error = %err, kind = err.kind(), "Upstream request failed");
                        metrics::record_upstream_error(err.kind());
                    }
                    _ => {
                        tracing::warn!(error = %err, kind = err.kind(), "Rejected request");
                    }
                }
                metrics::record_request(method.as_str(), err.status().as_u16(), start_time);
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn relay(state: &AppState, request: Request<Body>) -> Result<ResponseEnvelope, ProxyError> {
    let (parts, body) = request.into_parts();

    let body = read_request_body(&parts.method, body, state.max_body_bytes).await?;
    let outbound = state
        .forwarder
        .prepare(parts.method.clone(), &parts.headers, &parts.uri, body)?;

    tracing::debug!(
        target_url = %outbound.target,
        body_bytes = outbound.body.as_ref().map(|b| b.len()),
        "Forwarding request"
    );

    state
        .forwarder
        .within_deadline(async {
            let upstream = state.forwarder.send(outbound).await?;
            tracing::debug!(status = %upstream.status(), "Upstream responded");
            reconstruct(&parts.method, upstream).await
        })
        .await
}
