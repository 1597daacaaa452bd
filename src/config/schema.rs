//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::bytesize::ByteSize;
use crate::net::Scheme;

/// Grace period used when none is configured.
pub const DEFAULT_CLEANUP_TIMEOUT_SECS: u64 = 15;

/// Default limit on request header bytes.
pub const DEFAULT_MAX_HEADER_SIZE: ByteSize = ByteSize(1_000_000);

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpdConfig {
    /// Enabled listener schemes. Empty means the default set (`http`).
    pub schemes: Vec<Scheme>,

    /// Grace period for in-flight connections during shutdown, in seconds.
    pub cleanup_timeout_secs: u64,

    /// Maximum bytes read while parsing request headers.
    pub max_header_size: ByteSize,

    /// Unix domain socket listener.
    pub unix: UnixListenerConfig,

    /// Plaintext HTTP listener.
    pub http: HttpListenerConfig,

    /// TLS listener.
    pub tls: TlsListenerConfig,

    /// Admin listeners (health, status). Served regardless of `schemes`.
    pub admin: Vec<ListenerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for HttpdConfig {
    fn default() -> Self {
        Self {
            schemes: Vec::new(),
            cleanup_timeout_secs: DEFAULT_CLEANUP_TIMEOUT_SECS,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            unix: UnixListenerConfig::default(),
            http: HttpListenerConfig::default(),
            tls: TlsListenerConfig::default(),
            admin: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl HttpdConfig {
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    /// The schemes actually enabled, falling back to the default set.
    pub fn enabled_schemes(&self) -> Vec<Scheme> {
        if self.schemes.is_empty() {
            Scheme::DEFAULTS.to_vec()
        } else {
            self.schemes.clone()
        }
    }
}

/// A single listener of any scheme, tagged by `scheme`.
///
/// ```toml
/// [[admin]]
/// scheme = "http"
/// host = "127.0.0.1"
/// port = 9090
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum ListenerConfig {
    Unix(UnixListenerConfig),
    Http(HttpListenerConfig),
    Https(TlsListenerConfig),
}

impl ListenerConfig {
    pub fn scheme(&self) -> Scheme {
        match self {
            ListenerConfig::Unix(_) => Scheme::Unix,
            ListenerConfig::Http(_) => Scheme::Http,
            ListenerConfig::Https(_) => Scheme::Https,
        }
    }
}

/// Unix domain socket listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UnixListenerConfig {
    /// Filesystem path of the socket.
    pub socket_path: PathBuf,

    /// File mode applied to the socket after bind.
    pub mode: u32,
}

impl Default for UnixListenerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/httpd.sock"),
            mode: 0o600,
        }
    }
}

/// Plaintext HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpListenerConfig {
    /// Host to bind. Empty binds every interface.
    pub host: String,

    /// Port to bind. Zero picks an ephemeral port.
    pub port: u16,

    /// Maximum concurrent connections; zero means unlimited.
    pub listen_limit: usize,

    /// Keep-alive period in seconds; zero disables HTTP keep-alive.
    pub keep_alive_secs: u64,

    /// Time allowed to read request headers, in seconds; zero disables.
    pub read_timeout_secs: u64,

    /// Time allowed to produce a response, in seconds; zero disables.
    pub write_timeout_secs: u64,
}

impl Default for HttpListenerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            listen_limit: 0,
            keep_alive_secs: 180,
            read_timeout_secs: 30,
            write_timeout_secs: 60,
        }
    }
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsListenerConfig {
    /// Host to bind. Empty binds every interface.
    pub host: String,

    /// Port to bind. Zero picks an ephemeral port.
    pub port: u16,

    /// Maximum concurrent connections; zero means unlimited.
    pub listen_limit: usize,

    /// Keep-alive period in seconds; zero disables HTTP keep-alive.
    pub keep_alive_secs: u64,

    /// Time allowed to read request headers, in seconds; zero disables.
    pub read_timeout_secs: u64,

    /// Time allowed to produce a response, in seconds; zero disables.
    pub write_timeout_secs: u64,

    /// Path to the certificate chain (PEM).
    pub certificate: PathBuf,

    /// Path to the private key (PEM).
    pub certificate_key: PathBuf,

    /// Optional CA bundle (PEM). When set, client certificates are required.
    pub ca_certificate: Option<PathBuf>,
}

impl Default for TlsListenerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8443,
            listen_limit: 0,
            keep_alive_secs: 180,
            read_timeout_secs: 30,
            write_timeout_secs: 60,
            certificate: PathBuf::new(),
            certificate_key: PathBuf::new(),
            ca_certificate: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
