//! OS signal handling.
//!
//! # Responsibilities
//! - Subscribe to SIGINT and SIGTERM
//! - Request shutdown on the first one
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Later signals are ignored; there is no forced-exit escalation
//! - Other signals keep their default disposition

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::lifecycle::shutdown::Shutdown;

/// Turns interrupt and terminate signals into one shutdown request.
#[derive(Debug, Clone)]
pub struct SignalBridge {
    shutdown: Shutdown,
    interrupted: Arc<AtomicBool>,
}

impl SignalBridge {
    pub fn new(shutdown: Shutdown, interrupted: Arc<AtomicBool>) -> Self {
        Self {
            shutdown,
            interrupted,
        }
    }

    /// Register SIGTERM and SIGINT interest now, and return the loop that
    /// handles them.
    ///
    /// Signals delivered after this returns are not lost, even before the
    /// returned future is first polled. Spawn it as an async task.
    pub fn install(self) -> io::Result<impl Future<Output = ()> + Send + 'static> {
        let sigterm = signal(SignalKind::terminate())?;
        let sigint = signal(SignalKind::interrupt())?;
        tracing::debug!("Signal handlers installed (SIGTERM, SIGINT)");
        Ok(self.run(sigterm, sigint))
    }

    async fn run(self, mut sigterm: Signal, mut sigint: Signal) {
        loop {
            let name = tokio::select! {
                received = sigterm.recv() => received.map(|_| "SIGTERM"),
                received = sigint.recv() => received.map(|_| "SIGINT"),
            };
            match name {
                Some(name) => self.on_signal(name),
                None => break,
            }
        }
    }

    /// Handle one delivered signal.
    pub fn on_signal(&self, name: &str) {
        if self.interrupted.swap(true, Ordering::AcqRel) {
            tracing::debug!(signal = name, "Already shutting down, signal ignored");
            return;
        }
        tracing::info!(signal = name, "Shutting down...");
        self.shutdown.trigger();
    }
}
