//! Multi-listener HTTP server library.
//!
//! Serves one handler on any mix of Unix socket, HTTP and HTTPS listeners,
//! plus a separate admin handler on its own listeners, and shuts all of them
//! down together.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::HttpdConfig;
pub use error::Error;
pub use http::{Hook, Hooks};
pub use lifecycle::{LifecycleState, Server, Shutdown};
pub use net::Scheme;
