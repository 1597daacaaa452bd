//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection (net::listener)
//!     → server.rs (TLS handshake, hyper HTTP/1 + HTTP/2, graceful drain)
//!     → handler (axum Router supplied by the embedder)
//! ```
//!
//! Hooks (hooks.rs) see each [`HttpServer`] before it starts serving.

pub mod hooks;
pub mod server;

pub use hooks::{Hook, Hooks};
pub use server::{HttpServer, RunningServer, ServerConfig};
