//! Listener providers: one per configured listener.
//!
//! # Responsibilities
//! - Bind the native listener on first use and memoize it (or the error)
//! - Build an [`HttpServer`] from the listener's own settings, run hooks on it
//! - Start it and hand the [`RunningServer`] back to the coordinator
//!
//! # Design Decisions
//! - A closed set of variants behind [`Provider`], chosen by configuration
//! - `listener()` is idempotent: the same `Arc` or a clone of the same error

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_rustls::TlsAcceptor;

use crate::config::{HttpListenerConfig, ListenerConfig, TlsListenerConfig, UnixListenerConfig};
use crate::http::server::{HttpServer, RunningServer, ServerConfig};
use crate::net::listener::BoundListener;
use crate::net::tls::TlsMaterial;
use crate::net::{ListenerError, Scheme};

type Memo<T> = OnceLock<Result<T, ListenerError>>;

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

/// Unix domain socket listener.
#[derive(Debug)]
pub struct UnixProvider {
    config: UnixListenerConfig,
    bound: Memo<Arc<BoundListener>>,
}

impl UnixProvider {
    pub fn new(config: UnixListenerConfig) -> Self {
        Self {
            config,
            bound: OnceLock::new(),
        }
    }

    pub fn listener(&self) -> Result<Arc<BoundListener>, ListenerError> {
        self.bound
            .get_or_init(|| {
                BoundListener::bind_unix(&self.config.socket_path, self.config.mode).map(Arc::new)
            })
            .clone()
    }

    pub fn serve(&self, config: &ServerConfig) -> Result<RunningServer, ListenerError> {
        let listener = self.listener()?;
        let server = HttpServer::new(config.handler.clone(), config.max_header_size);
        start(
            server,
            &listener,
            None,
            Scheme::Unix,
            config,
            Some(self.config.socket_path.clone()),
        )
    }
}

/// Plaintext HTTP listener.
#[derive(Debug)]
pub struct HttpProvider {
    config: HttpListenerConfig,
    bound: Memo<Arc<BoundListener>>,
}

impl HttpProvider {
    pub fn new(config: HttpListenerConfig) -> Self {
        Self {
            config,
            bound: OnceLock::new(),
        }
    }

    pub fn listener(&self) -> Result<Arc<BoundListener>, ListenerError> {
        self.bound
            .get_or_init(|| BoundListener::bind_tcp(&self.config.host, self.config.port).map(Arc::new))
            .clone()
    }

    pub fn serve(&self, config: &ServerConfig) -> Result<RunningServer, ListenerError> {
        let listener = self.listener()?;
        let c = &self.config;

        let mut server = HttpServer::new(config.handler.clone(), config.max_header_size);
        server.keep_alive = secs(c.keep_alive_secs);
        server.read_timeout = secs(c.read_timeout_secs);
        server.write_timeout = secs(c.write_timeout_secs);
        server.listen_limit = c.listen_limit;

        start(server, &listener, None, Scheme::Http, config, None)
    }
}

/// TLS-terminating HTTPS listener.
#[derive(Debug)]
pub struct TlsProvider {
    config: TlsListenerConfig,
    bound: Memo<(Arc<BoundListener>, Arc<TlsMaterial>)>,
}

impl TlsProvider {
    pub fn new(config: TlsListenerConfig) -> Self {
        Self {
            config,
            bound: OnceLock::new(),
        }
    }

    fn bound(&self) -> Result<(Arc<BoundListener>, Arc<TlsMaterial>), ListenerError> {
        self.bound
            .get_or_init(|| {
                let c = &self.config;
                let material =
                    TlsMaterial::load(&c.certificate, &c.certificate_key, c.ca_certificate.as_deref())?;
                // fail here, not at serve time, on a cert/key mismatch
                material.server_config()?;

                let listener = BoundListener::bind_tcp(&c.host, c.port)?;
                Ok((Arc::new(listener), Arc::new(material)))
            })
            .clone()
    }

    pub fn listener(&self) -> Result<Arc<BoundListener>, ListenerError> {
        self.bound().map(|(listener, _)| listener)
    }

    pub fn serve(&self, config: &ServerConfig) -> Result<RunningServer, ListenerError> {
        let (listener, material) = self.bound()?;
        let c = &self.config;

        let mut tls = material.server_config()?;
        if let Some(hooks) = &config.hooks {
            hooks.configure_tls(&mut tls);
        }
        let acceptor = TlsAcceptor::from(Arc::new(tls));
        tracing::debug!(client_auth = material.requires_client_auth(), "TLS policy ready");

        let mut server = HttpServer::new(config.handler.clone(), config.max_header_size);
        server.keep_alive = secs(c.keep_alive_secs);
        server.read_timeout = secs(c.read_timeout_secs);
        server.write_timeout = secs(c.write_timeout_secs);
        server.listen_limit = c.listen_limit;

        start(server, &listener, Some(acceptor), Scheme::Https, config, None)
    }
}

fn start(
    mut server: HttpServer,
    listener: &BoundListener,
    tls: Option<TlsAcceptor>,
    scheme: Scheme,
    config: &ServerConfig,
    unlink: Option<std::path::PathBuf>,
) -> Result<RunningServer, ListenerError> {
    let addr = listener.local_addr().clone();
    if let Some(hooks) = &config.hooks {
        hooks.configure_listener(&mut server, scheme, &addr.to_string());
    }

    let acceptor = listener
        .acceptor(server.listen_limit)
        .map_err(|e| ListenerError::bind(addr.to_string(), e))?;

    tracing::info!(%scheme, address = %addr, "Starting server");
    Ok(server.start(acceptor, tls, scheme, addr, unlink))
}

/// One listener of any scheme.
#[derive(Debug)]
pub enum Provider {
    Unix(UnixProvider),
    Http(HttpProvider),
    Tls(TlsProvider),
}

impl Provider {
    pub fn from_config(config: ListenerConfig) -> Self {
        match config {
            ListenerConfig::Unix(c) => Provider::Unix(UnixProvider::new(c)),
            ListenerConfig::Http(c) => Provider::Http(HttpProvider::new(c)),
            ListenerConfig::Https(c) => Provider::Tls(TlsProvider::new(c)),
        }
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Provider::Unix(_) => Scheme::Unix,
            Provider::Http(_) => Scheme::Http,
            Provider::Tls(_) => Scheme::Https,
        }
    }

    /// Bind the native listener if not yet bound, and return it.
    pub fn listener(&self) -> Result<Arc<BoundListener>, ListenerError> {
        match self {
            Provider::Unix(p) => p.listener(),
            Provider::Http(p) => p.listener(),
            Provider::Tls(p) => p.listener(),
        }
    }

    /// Start serving `config.handler` on this listener.
    ///
    /// Returns as soon as the serve task is spawned. Must be called from
    /// within a tokio runtime.
    pub fn serve(&self, config: &ServerConfig) -> Result<RunningServer, ListenerError> {
        match self {
            Provider::Unix(p) => p.serve(config),
            Provider::Http(p) => p.serve(config),
            Provider::Tls(p) => p.serve(config),
        }
    }
}

impl From<UnixProvider> for Provider {
    fn from(p: UnixProvider) -> Self {
        Provider::Unix(p)
    }
}

impl From<HttpProvider> for Provider {
    fn from(p: HttpProvider) -> Self {
        Provider::Http(p)
    }
}

impl From<TlsProvider> for Provider {
    fn from(p: TlsProvider) -> Self {
        Provider::Tls(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_http() -> HttpListenerConfig {
        HttpListenerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    #[test]
    fn listener_is_memoized() {
        let provider = HttpProvider::new(local_http());
        let first = provider.listener().unwrap();
        let second = provider.listener().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn bind_error_is_memoized() {
        let taken = BoundListener::bind_tcp("127.0.0.1", 0).unwrap();
        let port = taken.local_addr().tcp().unwrap().port();

        let provider = HttpProvider::new(HttpListenerConfig {
            port,
            ..local_http()
        });
        let first = provider.listener().unwrap_err();
        drop(taken);
        // the port is free now, but the first outcome sticks
        let second = provider.listener().unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn unix_rebind_clears_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let config = UnixListenerConfig {
            socket_path: dir.path().join("app.sock"),
            mode: 0o600,
        };

        let first = UnixProvider::new(config.clone());
        first.listener().unwrap();
        let second = UnixProvider::new(config);
        assert!(second.listener().is_ok());
    }

    #[test]
    fn tls_material_is_checked_before_binding() {
        let provider = TlsProvider::new(TlsListenerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            certificate: "/nonexistent/cert.pem".into(),
            certificate_key: "/nonexistent/key.pem".into(),
            ..Default::default()
        });
        assert!(matches!(provider.listener(), Err(ListenerError::TlsConfig(_))));
    }

    #[test]
    fn scheme_follows_variant() {
        let providers = [
            Provider::from_config(ListenerConfig::Unix(UnixListenerConfig::default())),
            Provider::from_config(ListenerConfig::Http(HttpListenerConfig::default())),
            Provider::from_config(ListenerConfig::Https(TlsListenerConfig::default())),
        ];
        let schemes: Vec<_> = providers.iter().map(Provider::scheme).collect();
        assert_eq!(schemes, vec![Scheme::Unix, Scheme::Http, Scheme::Https]);
    }
}
