//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once per process
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - A second `init` is a no-op, so tests and embedders can call it freely

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the fmt subscriber with `level` as the default filter.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("httpd={level},tower_http={level}").into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
