//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → HttpdConfig (validated, immutable)
//!     → handed by value to the lifecycle coordinator
//! ```
//!
//! # Design Decisions
//! - Config is an explicit value built once at startup; there is no global state
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod bytesize;
pub mod loader;
pub mod schema;
pub mod validation;

pub use bytesize::ByteSize;
pub use loader::{load_config, ConfigError};
pub use schema::{
    HttpListenerConfig, HttpdConfig, ListenerConfig, ObservabilityConfig, TlsListenerConfig,
    UnixListenerConfig,
};
