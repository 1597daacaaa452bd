//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Provider (provider.rs, one per configured listener)
//!     → listener.rs (bind once, memoize, connection limits)
//!     → tls.rs (certificate material and cipher policy, https only)
//!     → http::server (accept loop, hand off to hyper)
//! ```
//!
//! # Design Decisions
//! - Sockets are bound with std and converted into tokio listeners at serve time
//! - A bound socket is never rebound; serving takes it over and closes it on stop
//! - Listener kinds are a closed set selected by configuration

pub mod listener;
pub mod provider;
pub mod tls;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use listener::{BoundListener, ListenerAddr};
pub use provider::{HttpProvider, Provider, TlsProvider, UnixProvider};

/// Transport tag distinguishing listener kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Unix,
    Http,
    Https,
}

impl Scheme {
    /// Schemes enabled when none are configured.
    pub const DEFAULTS: &'static [Scheme] = &[Scheme::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Unix => "unix",
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown scheme name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scheme {0:?}, expected one of unix, http, https")]
pub struct UnknownScheme(pub String);

impl FromStr for Scheme {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unix" => Ok(Scheme::Unix),
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(UnknownScheme(s.to_string())),
        }
    }
}

/// Error type for listener setup.
///
/// Clone so a memoized failure can be handed back on every call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListenerError {
    /// Address in use, permission denied or an unresolvable address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A file left at the socket path could not be cleared.
    #[error("cannot remove stale socket {}: {source}", path.display())]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Certificate, key or CA material is unusable.
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(String),
}

impl ListenerError {
    pub(crate) fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        ListenerError::Bind {
            addr: addr.into(),
            source: Arc::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_round_trips_through_strings() {
        for scheme in [Scheme::Unix, Scheme::Http, Scheme::Https] {
            assert_eq!(scheme.to_string().parse::<Scheme>().unwrap(), scheme);
        }
        assert_eq!(" HTTPS ".parse::<Scheme>().unwrap(), Scheme::Https);
        assert!("ftp".parse::<Scheme>().is_err());
    }

    #[test]
    fn bind_error_mentions_address() {
        let err = ListenerError::bind(
            "127.0.0.1:80",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:80"));
    }
}
