//! Shutdown coordination.
//!
//! [`Shutdown`] is the one-shot stop signal; [`stop_all`] is the fan-out that
//! stops every running server against one shared deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::http::server::RunningServer;

/// Completion callback run after every server stopped cleanly.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot shutdown signal.
///
/// Flips from open to closed exactly once, no matter how many callers race
/// on [`trigger`](Self::trigger). Clones share the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    triggered: AtomicBool,
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new, open shutdown signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                triggered: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Close the signal. Returns `true` only for the call that closed it.
    pub fn trigger(&self) -> bool {
        let first = self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.tx.send_replace(true);
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Wait until the signal is closed. Returns at once if it already is.
    pub async fn wait(&self) {
        let mut rx = self.inner.tx.subscribe();
        // the sender lives in `inner`, so this cannot observe a closed channel
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Stop every server concurrently, all bound to one deadline `grace` from now.
///
/// Waits for exactly one report per server and returns `true` only if every
/// server drained before the deadline.
pub async fn stop_all(servers: Vec<RunningServer>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    let count = servers.len();
    let (tx, mut rx) = mpsc::channel(count.max(1));

    for server in servers {
        let tx = tx.clone();
        tokio::spawn(async move {
            let scheme = server.scheme();
            let addr = server.local_addr().to_string();
            let stopped = match server.shutdown(deadline).await {
                Ok(()) => {
                    tracing::debug!(%scheme, address = %addr, "Server stopped gracefully");
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "Server shutdown failed");
                    false
                }
            };
            let _ = tx.send(stopped).await;
        });
    }
    drop(tx);

    let mut success = true;
    for _ in 0..count {
        // a panicked stop task never reports; count it as a failure
        success &= rx.recv().await.unwrap_or(false);
    }
    success
}

/// Wait for `shutdown`, stop every server, then run `callbacks` in order.
///
/// Callbacks are skipped unless every server drained before the deadline.
/// Returns whether the shutdown was clean.
pub async fn handle_shutdown(
    shutdown: Shutdown,
    servers: Vec<RunningServer>,
    grace: Duration,
    callbacks: Vec<Callback>,
) -> bool {
    shutdown.wait().await;
    tracing::info!(servers = servers.len(), grace = ?grace, "Stopping servers");

    if !stop_all(servers, grace).await {
        tracing::warn!("Not every server stopped cleanly, skipping shutdown callbacks");
        return false;
    }

    for callback in callbacks {
        callback();
    }
    tracing::info!("Shutdown complete");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn trigger_closes_exactly_once() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn concurrent_triggers_have_one_winner() {
        let shutdown = Shutdown::new();
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let shutdown = shutdown.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if shutdown.trigger() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_returns_after_trigger_even_when_late() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        tokio::task::yield_now().await;
        shutdown.trigger();
        waiter.await.unwrap();

        // a waiter arriving after the trigger does not block
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stop_all_with_no_servers_succeeds() {
        assert!(stop_all(Vec::new(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn callbacks_wait_for_the_signal_and_run_in_order() {
        let shutdown = Shutdown::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let callbacks: Vec<Callback> = (0..3)
            .map(|i| {
                let order = order.clone();
                Box::new(move || order.lock().unwrap().push(i)) as Callback
            })
            .collect();

        let task = tokio::spawn(handle_shutdown(
            shutdown.clone(),
            Vec::new(),
            Duration::from_secs(1),
            callbacks,
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert!(order.lock().unwrap().is_empty());

        shutdown.trigger();
        assert!(task.await.unwrap());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
