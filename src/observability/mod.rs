//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events and spans ("listener" span per running server)
//!
//! Consumers:
//!     → logging.rs (fmt subscriber on stdout, filtered by RUST_LOG or config)
//! ```

pub mod logging;
