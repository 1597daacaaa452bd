//! Crate-level error types.

use crate::net::{ListenerError, Scheme};

/// Errors returned by [`Server::listen`](crate::Server::listen) and
/// [`Server::serve`](crate::Server::serve).
///
/// Every variant aborts startup; there is no partially started state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server is already serving or has stopped")]
    AlreadyServing,

    #[error("shutdown task failed: {0}")]
    ShutdownTask(#[from] tokio::task::JoinError),
}

/// Why a running server did not stop cleanly.
///
/// Logged and counted as a failed stop; never fatal to the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ShutdownError {
    #[error("{scheme} listener on {addr} did not drain before the shutdown deadline")]
    Timeout { scheme: Scheme, addr: String },

    #[error("{scheme} listener on {addr} failed: {reason}")]
    Task {
        scheme: Scheme,
        addr: String,
        reason: String,
    },
}
