//! httpd: serve an echo handler on the configured listeners.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────────┐
//!                       │                    httpd                       │
//!                       │                                                │
//!   unix / http / https │  ┌─────────┐   ┌──────────┐   ┌─────────────┐ │
//!   ────────────────────┼─▶│   net   │──▶│   http   │──▶│   handler   │ │
//!                       │  │provider │   │  server  │   │  (primary)  │ │
//!                       │  └─────────┘   └──────────┘   └─────────────┘ │
//!   admin listeners     │  ┌─────────┐   ┌──────────┐   ┌─────────────┐ │
//!   ────────────────────┼─▶│   net   │──▶│   http   │──▶│    admin    │ │
//!                       │  └─────────┘   └──────────┘   └─────────────┘ │
//!                       │                                                │
//!                       │  ┌──────────────────────────────────────────┐ │
//!                       │  │ lifecycle: signals → shutdown fan-out    │ │
//!                       │  │ config · observability                   │ │
//!                       │  └──────────────────────────────────────────┘ │
//!                       └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use axum::extract::Request;
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;

use httpd::config::loader::apply_env_overrides;
use httpd::config::validation::validate_config;
use httpd::config::{load_config, ByteSize, ConfigError, HttpdConfig};
use httpd::observability::logging;
use httpd::{Scheme, Server};

#[derive(Parser)]
#[command(name = "httpd")]
#[command(about = "Multi-listener HTTP server with coordinated graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener scheme to enable (repeatable)
    #[arg(long = "scheme")]
    schemes: Vec<Scheme>,

    /// Grace period for active connections to drain, in seconds
    #[arg(long)]
    cleanup_timeout: Option<u64>,

    /// Maximum request header size, e.g. 1MB
    #[arg(long)]
    max_header_size: Option<ByteSize>,
}

impl Cli {
    fn load(&self) -> Result<HttpdConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => {
                let mut config = HttpdConfig::default();
                apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
                config
            }
        };

        if !self.schemes.is_empty() {
            config.schemes = self.schemes.clone();
        }
        if let Some(secs) = self.cleanup_timeout {
            config.cleanup_timeout_secs = secs;
        }
        if let Some(size) = self.max_header_size {
            config.max_header_size = size;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

async fn echo(request: Request) -> String {
    format!("{} {}\n", request.method(), request.uri())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "httpd starting");
    tracing::info!(
        schemes = ?config.enabled_schemes(),
        cleanup_timeout_secs = config.cleanup_timeout_secs,
        max_header_size = %config.max_header_size,
        admin_listeners = config.admin.len(),
        "Configuration loaded"
    );

    let handler = Router::new()
        .fallback(echo)
        .layer(TraceLayer::new_for_http());

    let server = Server::builder(config)
        .handler(handler)
        .on_shutdown(|| tracing::info!("All listeners stopped"))
        .build();

    server.serve().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
