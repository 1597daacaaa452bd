//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Serve (server.rs):
//!     Bind enabled listeners → Start primary, then admin servers → Block
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown (first signal only)
//!
//! Shutdown (shutdown.rs):
//!     Signal closed → Stop all servers against one deadline
//!         → All clean? Run completion callbacks
//! ```
//!
//! # Design Decisions
//! - Startup is all-or-nothing: a failed listener stops the ones already started
//! - Shutdown has one deadline (`cleanup_timeout`) shared by every server
//! - A timed-out drain is logged, not forced; callbacks are skipped

pub mod server;
pub mod shutdown;
pub mod signals;

pub use server::{LifecycleState, Server, ServerBuilder};
pub use shutdown::Shutdown;
pub use signals::SignalBridge;
