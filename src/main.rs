//! Transparent HTTP reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────┐
//!                   │                  PASSTHROUGH PROXY                   │
//!   Client Request  │  ┌──────────┐   ┌───────────┐   ┌─────────────────┐  │
//!  ─────────────────┼─▶│  server  │──▶│  headers  │──▶│    forwarder    │──┼──▶ Upstream
//!                   │  │ any path │   │  filter   │   │ host/origin,body│  │    origin
//!                   │  └──────────┘   └───────────┘   └─────────────────┘  │
//!   Client Response │  ┌──────────┐   ┌───────────┐                        │
//!  ◀────────────────┼──│ response │◀──│  headers  │◀───────────────────────┼─── Upstream
//!                   │  │ rebuild  │   │  filter   │                        │
//!                   │  └──────────┘   └───────────┘                        │
//!                   └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use passthrough_proxy::config::{load_config, ConfigError, ConfigOverrides, ProxyConfig};
use passthrough_proxy::lifecycle::Shutdown;
use passthrough_proxy::observability::{logging, metrics};
use passthrough_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "passthrough-proxy", version)]
#[command(about = "Transparent HTTP reverse proxy for a single upstream origin", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Listener address, overrides `listener.bind_address`.
    #[arg(short, long, env = "PROXY_BIND_ADDRESS")]
    bind: Option<String>,

    /// Upstream origin, overrides `upstream.origin`.
    #[arg(short, long, env = "PROXY_UPSTREAM_ORIGIN")]
    upstream: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let overrides = ConfigOverrides {
            bind_address: self.bind,
            upstream_origin: self.upstream,
        };
        load_config(self.config.as_deref(), overrides)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.origin,
        "passthrough-proxy starting"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        shutdown.trigger_on_signal().await;
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
