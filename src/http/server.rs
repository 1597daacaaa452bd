//! HTTP server setup and the per-listener accept loop.
//!
//! # Responsibilities
//! - Hold the settings of one server before it starts ([`HttpServer`])
//! - Configure hyper's HTTP/1 and HTTP/2 connection builder from them
//! - Accept connections, finish TLS handshakes, dispatch to the handler
//! - Stop accepting and drain in-flight connections on request ([`RunningServer`])

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::{GracefulShutdown, Watcher};
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;
use tower_http::timeout::TimeoutLayer;
use tracing::Instrument;

use crate::error::ShutdownError;
use crate::http::hooks::Hook;
use crate::net::listener::{is_connection_error, Accepted, Acceptor, Connection};
use crate::net::{ListenerAddr, Scheme};

/// Smallest read buffer hyper accepts for HTTP/1.
const MIN_HEADER_BUFFER: usize = 8192;

/// First and largest pause after an accept error that is not per-connection.
const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Read-only snapshot handed to every provider at serve time.
#[derive(Clone)]
pub struct ServerConfig {
    /// Handler every accepted request is dispatched to.
    pub handler: Router,

    /// Hooks invoked while the listener is constructed.
    pub hooks: Option<Arc<dyn Hook>>,

    /// Maximum bytes read while parsing request headers.
    pub max_header_size: usize,

}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("hooks", &self.hooks.is_some())
            .field("max_header_size", &self.max_header_size)
            .finish_non_exhaustive()
    }
}

/// A server that has not started yet.
///
/// Providers build one per listener and pass it to
/// [`Hook::configure_listener`] before it starts serving.
#[derive(Clone)]
pub struct HttpServer {
    /// Request handler.
    pub handler: Router,

    /// HTTP keep-alive. `None` closes connections after each response;
    /// otherwise also the HTTP/2 ping interval.
    pub keep_alive: Option<Duration>,

    /// Time allowed to receive request headers.
    pub read_timeout: Option<Duration>,

    /// Time allowed to produce a response; the client gets `408` after it.
    pub write_timeout: Option<Duration>,

    /// Maximum bytes read while parsing request headers.
    pub max_header_size: usize,

    /// Maximum concurrent connections; zero means unlimited.
    pub listen_limit: usize,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("keep_alive", &self.keep_alive)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("max_header_size", &self.max_header_size)
            .field("listen_limit", &self.listen_limit)
            .finish_non_exhaustive()
    }
}

impl HttpServer {
    /// Create a server with keep-alive on and no timeouts or limits.
    pub fn new(handler: Router, max_header_size: usize) -> Self {
        Self {
            handler,
            keep_alive: Some(Duration::from_secs(180)),
            read_timeout: None,
            write_timeout: None,
            max_header_size,
            listen_limit: 0,
        }
    }

    /// Build the hyper connection builder for these settings.
    fn connection_builder(&self) -> Builder<TokioExecutor> {
        let mut builder = Builder::new(TokioExecutor::new());

        builder
            .http1()
            .timer(TokioTimer::new())
            .keep_alive(self.keep_alive.is_some())
            .max_buf_size(self.max_header_size.max(MIN_HEADER_BUFFER));
        if let Some(timeout) = self.read_timeout {
            builder.http1().header_read_timeout(timeout);
        }

        builder
            .http2()
            .timer(TokioTimer::new())
            .max_header_list_size(u32::try_from(self.max_header_size).unwrap_or(u32::MAX));
        if let Some(interval) = self.keep_alive {
            builder.http2().keep_alive_interval(interval);
        }

        builder
    }

    #[allow(deprecated)]
    fn service(&self) -> Router {
        match self.write_timeout {
            Some(timeout) => self.handler.clone().layer(TimeoutLayer::new(timeout)),
            None => self.handler.clone(),
        }
    }

    /// Start serving on a spawned task and return its handle.
    ///
    /// `unlink` is removed once the server has drained (Unix sockets).
    pub(crate) fn start(
        self,
        acceptor: Acceptor,
        tls: Option<TlsAcceptor>,
        scheme: Scheme,
        addr: ListenerAddr,
        unlink: Option<PathBuf>,
    ) -> RunningServer {
        let (stop_tx, stop_rx) = watch::channel(false);
        let span = tracing::info_span!("listener", %scheme, addr = %addr);

        let task = tokio::spawn(
            async move {
                self.run(acceptor, tls, stop_rx).await;
                if let Some(path) = unlink {
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::debug!(error = %e, "Could not remove socket file");
                    }
                }
                tracing::info!("Server stopped");
            }
            .instrument(span),
        );

        RunningServer {
            scheme,
            addr,
            stop: stop_tx,
            task,
        }
    }

    async fn run(
        self,
        acceptor: Acceptor,
        tls: Option<TlsAcceptor>,
        mut stop: watch::Receiver<bool>,
    ) {
        let builder = self.connection_builder();
        let handler = self.service();
        let graceful = GracefulShutdown::new();

        tracing::info!(
            keep_alive = ?self.keep_alive,
            read_timeout = ?self.read_timeout,
            write_timeout = ?self.write_timeout,
            listen_limit = self.listen_limit,
            "Serving"
        );

        let mut backoff = ACCEPT_BACKOFF_START;
        loop {
            let failed = tokio::select! {
                accepted = acceptor.accept() => match accepted {
                    Ok(accepted) => {
                        tracing::trace!(
                            peer = %accepted.peer,
                            available_permits = ?acceptor.available_permits(),
                            "Connection accepted"
                        );
                        spawn_connection(accepted, &builder, &handler, tls.clone(), graceful.watcher());
                        backoff = ACCEPT_BACKOFF_START;
                        false
                    }
                    Err(e) if is_connection_error(&e) => {
                        tracing::debug!(error = %e, "Accept failed for one connection");
                        false
                    }
                    Err(e) => {
                        // e.g. EMFILE or ENOBUFS: pause, then keep accepting
                        tracing::error!(error = %e, retry_in = ?backoff, "Accept failed");
                        true
                    }
                },
                _ = stop.wait_for(|stopping| *stopping) => break,
            };

            if failed {
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = stop.wait_for(|stopping| *stopping) => break,
                }
                backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
            }
        }
        tracing::debug!("Stop requested, no longer accepting connections");

        drop(acceptor);
        tracing::debug!(connections = graceful.count(), "Draining connections");
        graceful.shutdown().await;
    }
}

fn spawn_connection(
    accepted: Accepted,
    builder: &Builder<TokioExecutor>,
    handler: &Router,
    tls: Option<TlsAcceptor>,
    watcher: Watcher,
) {
    let Accepted { conn, peer, permit } = accepted;
    let builder = builder.clone();
    let service = TowerToHyperService::new(handler.clone());

    tokio::spawn(
        async move {
            // held until the connection closes
            let _permit = permit;

            let result = match (conn, tls) {
                (Connection::Tcp(stream), Some(tls)) => match tls.accept(stream).await {
                    Ok(stream) => serve_io(&builder, stream, service, watcher).await,
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "TLS handshake failed");
                        return;
                    }
                },
                (Connection::Tcp(stream), None) => serve_io(&builder, stream, service, watcher).await,
                (Connection::Unix(stream), _) => serve_io(&builder, stream, service, watcher).await,
            };

            if let Err(e) = result {
                tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        }
        .in_current_span(),
    );
}

async fn serve_io<I>(
    builder: &Builder<TokioExecutor>,
    io: I,
    service: TowerToHyperService<Router>,
    watcher: Watcher,
) -> Result<(), BoxError>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    watcher.watch(conn).await
}

/// A live server bound to one listener.
///
/// Dropping the handle also stops the server, without waiting for it.
pub struct RunningServer {
    scheme: Scheme,
    addr: ListenerAddr,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("scheme", &self.scheme)
            .field("addr", &self.addr)
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl RunningServer {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn local_addr(&self) -> &ListenerAddr {
        &self.addr
    }

    /// Stop accepting and wait for in-flight connections until `deadline`.
    ///
    /// Connections still open at the deadline are not killed; the call
    /// returns [`ShutdownError::Timeout`] and they keep draining.
    pub async fn shutdown(mut self, deadline: Instant) -> Result<(), ShutdownError> {
        self.stop.send_replace(true);

        match tokio::time::timeout_at(deadline, &mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ShutdownError::Task {
                scheme: self.scheme,
                addr: self.addr.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ShutdownError::Timeout {
                scheme: self.scheme,
                addr: self.addr.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::BoundListener;
    use axum::routing::get;

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn start_local(router: Router) -> RunningServer {
        let bound = BoundListener::bind_tcp("127.0.0.1", 0).unwrap();
        let acceptor = bound.acceptor(0).unwrap();
        HttpServer::new(router, 1_000_000).start(
            acceptor,
            None,
            Scheme::Http,
            bound.local_addr().clone(),
            None,
        )
    }

    #[tokio::test]
    async fn serves_and_stops_cleanly() {
        let server = start_local(Router::new().route("/", get(|| async { "hello" })));
        let addr = server.local_addr().tcp().unwrap();

        let body = reqwest::get(format!("http://{addr}/"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "hello");

        server.shutdown(soon()).await.unwrap();
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn in_flight_request_past_deadline_times_out() {
        let server = start_local(Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "done"
            }),
        ));
        let addr = server.local_addr().tcp().unwrap();

        let request = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = server
            .shutdown(Instant::now() + Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ShutdownError::Timeout { scheme: Scheme::Http, .. }));
        request.abort();
    }

    #[tokio::test]
    async fn write_timeout_answers_request_timeout() {
        let mut server = HttpServer::new(
            Router::new().route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            ),
            1_000_000,
        );
        server.write_timeout = Some(Duration::from_millis(100));

        let bound = BoundListener::bind_tcp("127.0.0.1", 0).unwrap();
        let addr = bound.local_addr().tcp().unwrap();
        let running = server.start(
            bound.acceptor(0).unwrap(),
            None,
            Scheme::Http,
            bound.local_addr().clone(),
            None,
        );

        let res = reqwest::get(format!("http://{addr}/slow")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::REQUEST_TIMEOUT);

        running.shutdown(soon()).await.unwrap();
    }

    #[tokio::test]
    async fn plaintext_serves_http2_with_prior_knowledge() {
        let server = start_local(Router::new().route("/", get(|| async { "h2" })));
        let addr = server.local_addr().tcp().unwrap();

        let client = reqwest::Client::builder()
            .http2_prior_knowledge()
            .build()
            .unwrap();
        let res = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(res.version(), reqwest::Version::HTTP_2);
        assert_eq!(res.text().await.unwrap(), "h2");
        drop(client);

        server.shutdown(soon()).await.unwrap();
    }
}
