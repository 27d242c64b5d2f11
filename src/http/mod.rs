//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → server.rs (any method, any path)
//!     → forwarder.rs (body capture, target.rs resolution, headers.rs filter,
//!                     host/origin override, upstream call)
//!     → connector.rs (TCP, or rustls for https)
//!     → upstream
//!     → response.rs (headers.rs filter, content-encoding strip,
//!                    body decision, content-length rewrite)
//!     → caller
//! ```

pub mod connector;
pub mod forwarder;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod target;

pub use connector::UpstreamConnector;
pub use forwarder::{Forwarder, OutboundRequest, UpstreamBody};
pub use headers::{filter_headers, HeaderCollection, HOP_BY_HOP_HEADERS};
pub use request::{RequestId, X_REQUEST_ID};
pub use response::ResponseEnvelope;
pub use server::HttpServer;
pub use target::{TargetDescriptor, UpstreamOrigin};
