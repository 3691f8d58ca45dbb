//! lb-proxy: round-robin HTTP reverse-proxy load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │                   lb-proxy                   │
//!   Client ───────▶│ http/server ──▶ load_balancer ──▶ forward ───┼──▶ Backend A
//!          ◀───────┼─────────────────── streamed response ◀──────┼─── Backend B
//!                  │                       ▲                      │
//!                  │                       │ alive flags          │
//!                  │               health/active (prober) ────────┼──▶ GET /user/list
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! Configuration comes from an optional TOML file, `LB_*` environment
//! variables and command-line flags, in increasing precedence.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use lb_proxy::config::{self, ConfigError, ProxyConfig};
use lb_proxy::lifecycle::{signals, Shutdown};
use lb_proxy::observability::logging;
use lb_proxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "lb-proxy", version)]
#[command(about = "Round-robin HTTP reverse-proxy load balancer", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8080.
    #[arg(short, long)]
    listen: Option<String>,

    /// Backend base URL; repeat for each backend. Replaces configured backends.
    #[arg(short, long = "backend")]
    backends: Vec<String>,
}

impl Cli {
    /// Layer defaults, file, environment and flags, then validate.
    fn resolve(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => ProxyConfig::default(),
        };
        config::apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if !self.backends.is_empty() {
            config.backends = self.backends;
        }

        config::validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Cli::parse().resolve() {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from this config, so report directly.
            eprintln!("lb-proxy: {e}");
            std::process::exit(1);
        }
    };
    let _log_guard = logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lb-proxy starting");

    let server = HttpServer::new(config.clone())?;
    for (url, alive) in server.pool().snapshot() {
        tracing::info!(backend = %url, alive, "Backend registered");
    }

    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %config.listener.bind_address, error = %e, "Failed to bind");
            return Err(e.into());
        }
    };
    tracing::info!(address = %listener.local_addr()?, "Load balancer is running");

    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        _ = signals::wait_for_signal() => shutdown.trigger(),
    }

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
