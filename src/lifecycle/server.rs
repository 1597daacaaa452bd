//! The lifecycle coordinator.
//!
//! [`Server`] owns the primary and admin listeners, brings them up as one
//! unit and tears them down as one unit. Build it with [`Server::builder`].

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::http::{header, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::admin;
use crate::config::{HttpdConfig, ListenerConfig};
use crate::error::Error;
use crate::http::hooks::Hook;
use crate::http::server::{RunningServer, ServerConfig};
use crate::lifecycle::shutdown::{handle_shutdown, stop_all, Callback, Shutdown};
use crate::lifecycle::signals::SignalBridge;
use crate::net::{BoundListener, ListenerError, Provider, Scheme};

/// HSTS max age used when the configured one is zero: 126 days.
const DEFAULT_HSTS_MAX_AGE: Duration = Duration::from_secs(126 * 24 * 60 * 60);

/// Where a [`Server`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Created = 0,
    Listening = 1,
    Serving = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Created,
            1 => LifecycleState::Listening,
            2 => LifecycleState::Serving,
            3 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Multi-listener server.
///
/// `serve` runs at most once. Shutdown comes from [`Server::shutdown`], a
/// [`Shutdown`] handle, or SIGINT/SIGTERM while serving.
pub struct Server {
    schemes: Vec<Scheme>,
    cleanup_timeout: Duration,
    max_header_size: usize,
    handler: Router,
    admin_handler: Router,
    hooks: Option<Arc<dyn Hook>>,
    listeners: Vec<Provider>,
    admin_listeners: Vec<Provider>,
    shutdown: Shutdown,
    interrupted: Arc<AtomicBool>,
    on_shutdown: Mutex<Vec<Callback>>,
    state: AtomicU8,
    served: AtomicBool,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("schemes", &self.schemes)
            .field("cleanup_timeout", &self.cleanup_timeout)
            .field("max_header_size", &self.max_header_size)
            .field("listeners", &self.listeners)
            .field("admin_listeners", &self.admin_listeners)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn builder(config: HttpdConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Bind every enabled listener, primary and admin, without serving.
    ///
    /// Stops at the first failure. Calling it again reuses what is bound.
    pub fn listen(&self) -> Result<(), ListenerError> {
        for provider in self.listeners.iter().chain(&self.admin_listeners) {
            if !self.has_scheme(provider.scheme()) {
                continue;
            }
            provider.listener()?;
        }

        let _ = self.state.compare_exchange(
            LifecycleState::Created as u8,
            LifecycleState::Listening as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        Ok(())
    }

    /// Bind, serve on every listener, and block until all have stopped.
    ///
    /// Primary listeners serve only when their scheme is enabled; admin
    /// listeners always serve. If one fails to start, those already started
    /// are stopped, shutdown callbacks are skipped, and the error returned.
    pub async fn serve(&self) -> Result<(), Error> {
        if self.served.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyServing);
        }
        self.listen()?;

        // registered before any server starts, so no signal can slip past
        let bridge = SignalBridge::new(self.shutdown.clone(), self.interrupted.clone());
        let signals = match bridge.install() {
            Ok(handling) => Some(tokio::spawn(handling)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register signal handlers");
                None
            }
        };

        let servers = match self.start_all() {
            Ok(servers) => servers,
            Err((started, e)) => {
                if let Some(signals) = &signals {
                    signals.abort();
                }
                tracing::error!(error = %e, started = started.len(), "Startup failed, stopping started servers");
                if !stop_all(started, self.cleanup_timeout).await {
                    tracing::warn!("Not every started server stopped cleanly");
                }
                self.set_state(LifecycleState::Stopped);
                return Err(e.into());
            }
        };

        self.set_state(LifecycleState::Serving);
        tracing::info!(servers = servers.len(), "Server ready");

        let callbacks = std::mem::take(
            &mut *self
                .on_shutdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let fan_out = tokio::spawn(handle_shutdown(
            self.shutdown.clone(),
            servers,
            self.cleanup_timeout,
            callbacks,
        ));

        let result = fan_out.await;
        if let Some(signals) = &signals {
            signals.abort();
        }
        self.set_state(LifecycleState::Stopped);
        result?;
        Ok(())
    }

    fn start_all(&self) -> Result<Vec<RunningServer>, (Vec<RunningServer>, ListenerError)> {
        let mut servers = Vec::new();

        let primary = ServerConfig {
            handler: self.handler.clone(),
            hooks: self.hooks.clone(),
            max_header_size: self.max_header_size,
        };
        for provider in &self.listeners {
            if !self.has_scheme(provider.scheme()) {
                continue;
            }
            match provider.serve(&primary) {
                Ok(server) => servers.push(server),
                Err(e) => return Err((servers, e)),
            }
        }

        let admin = ServerConfig {
            handler: self.admin_handler.clone(),
            ..primary
        };
        for provider in &self.admin_listeners {
            match provider.serve(&admin) {
                Ok(server) => servers.push(server),
                Err(e) => return Err((servers, e)),
            }
        }

        Ok(servers)
    }

    /// Request shutdown. Only the first call has any effect.
    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::debug!("Shutdown requested");
        }
    }

    /// A handle that can trigger or await shutdown from elsewhere.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> LifecycleState {
        let state = LifecycleState::from_u8(self.state.load(Ordering::Acquire));
        if state == LifecycleState::Serving && self.shutdown.is_triggered() {
            LifecycleState::ShuttingDown
        } else {
            state
        }
    }

    /// Whether a signal, rather than an explicit call, started the shutdown.
    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// The primary handler, as served (HSTS included when enabled).
    pub fn handler(&self) -> &Router {
        &self.handler
    }

    pub fn has_scheme(&self, scheme: Scheme) -> bool {
        self.schemes.contains(&scheme)
    }

    pub fn unix_listener(&self) -> Result<Option<Arc<BoundListener>>, ListenerError> {
        self.listener_for(Scheme::Unix)
    }

    pub fn http_listener(&self) -> Result<Option<Arc<BoundListener>>, ListenerError> {
        self.listener_for(Scheme::Http)
    }

    pub fn tls_listener(&self) -> Result<Option<Arc<BoundListener>>, ListenerError> {
        self.listener_for(Scheme::Https)
    }

    /// The primary listener for `scheme`, bound on demand.
    fn listener_for(&self, scheme: Scheme) -> Result<Option<Arc<BoundListener>>, ListenerError> {
        if !self.has_scheme(scheme) {
            return Ok(None);
        }
        self.listeners
            .iter()
            .find(|p| p.scheme() == scheme)
            .map(Provider::listener)
            .transpose()
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Builder for [`Server`].
///
/// Defaults come from [`HttpdConfig`]: one primary listener per scheme
/// section, the `admin` entries as admin listeners, an empty primary router,
/// and [`admin::default_router`] for admin listeners.
pub struct ServerBuilder {
    config: HttpdConfig,
    handler: Router,
    admin_handler: Router,
    hooks: Option<Arc<dyn Hook>>,
    listeners: Option<Vec<Provider>>,
    extra_listeners: Vec<Provider>,
    admin_listeners: Option<Vec<Provider>>,
    on_shutdown: Vec<Callback>,
    hsts: Option<(Duration, bool)>,
}

impl ServerBuilder {
    fn new(config: HttpdConfig) -> Self {
        Self {
            config,
            handler: Router::new(),
            admin_handler: admin::default_router(),
            hooks: None,
            listeners: None,
            extra_listeners: Vec::new(),
            admin_listeners: None,
            on_shutdown: Vec::new(),
            hsts: None,
        }
    }

    pub fn handler(mut self, handler: Router) -> Self {
        self.handler = handler;
        self
    }

    pub fn admin_handler(mut self, handler: Router) -> Self {
        self.admin_handler = handler;
        self
    }

    /// Hooks run for every listener, primary and admin. Use [`Hooks`] to
    /// register several.
    ///
    /// [`Hooks`]: crate::http::hooks::Hooks
    pub fn hooks(mut self, hooks: impl Hook + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Run `callback` once every server has stopped cleanly. Callbacks run
    /// in registration order.
    pub fn on_shutdown(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_shutdown.push(Box::new(callback));
        self
    }

    /// Replace the primary listeners derived from the configuration.
    pub fn listeners(mut self, listeners: impl IntoIterator<Item = Provider>) -> Self {
        self.listeners = Some(listeners.into_iter().collect());
        self
    }

    /// Add primary listeners after the configured (or replaced) ones.
    pub fn extra_listeners(mut self, listeners: impl IntoIterator<Item = Provider>) -> Self {
        self.extra_listeners.extend(listeners);
        self
    }

    /// Replace the admin listeners from the configuration.
    pub fn admin_listeners(mut self, listeners: impl IntoIterator<Item = Provider>) -> Self {
        self.admin_listeners = Some(listeners.into_iter().collect());
        self
    }

    /// Set the admin handler and listeners together.
    pub fn admin(self, handler: Router, listeners: impl IntoIterator<Item = Provider>) -> Self {
        self.admin_handler(handler).admin_listeners(listeners)
    }

    /// Add `Strict-Transport-Security` to primary responses that lack it.
    /// A zero `max_age` means 126 days.
    pub fn enable_hsts(mut self, max_age: Duration, preload: bool) -> Self {
        self.hsts = Some((max_age, preload));
        self
    }

    /// Override the enabled schemes. Empty means the default set.
    pub fn schemes(mut self, schemes: impl IntoIterator<Item = Scheme>) -> Self {
        self.config.schemes = schemes.into_iter().collect();
        self
    }

    pub fn build(self) -> Server {
        let config = self.config;

        let mut listeners = self.listeners.unwrap_or_else(|| {
            vec![
                Provider::from_config(ListenerConfig::Unix(config.unix.clone())),
                Provider::from_config(ListenerConfig::Http(config.http.clone())),
                Provider::from_config(ListenerConfig::Https(config.tls.clone())),
            ]
        });
        listeners.extend(self.extra_listeners);

        let admin_listeners = self.admin_listeners.unwrap_or_else(|| {
            config
                .admin
                .iter()
                .cloned()
                .map(Provider::from_config)
                .collect()
        });

        let handler = match self.hsts {
            Some((max_age, preload)) => with_hsts(self.handler, max_age, preload),
            None => self.handler,
        };

        Server {
            schemes: config.enabled_schemes(),
            cleanup_timeout: config.cleanup_timeout(),
            max_header_size: config.max_header_size.as_usize(),
            handler,
            admin_handler: self.admin_handler,
            hooks: self.hooks,
            listeners,
            admin_listeners,
            shutdown: Shutdown::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
            on_shutdown: Mutex::new(self.on_shutdown),
            state: AtomicU8::new(LifecycleState::Created as u8),
            served: AtomicBool::new(false),
        }
    }
}

fn hsts_value(max_age: Duration, preload: bool) -> HeaderValue {
    let max_age = if max_age.is_zero() {
        DEFAULT_HSTS_MAX_AGE
    } else {
        max_age
    };

    let mut value = format!("max-age={}; includeSubDomains", max_age.as_secs());
    if preload {
        value.push_str("; preload");
    }
    // digits and ASCII literals only
    HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static("max-age=10886400"))
}

fn with_hsts(handler: Router, max_age: Duration, preload: bool) -> Router {
    handler.layer(SetResponseHeaderLayer::if_not_present(
        header::STRICT_TRANSPORT_SECURITY,
        hsts_value(max_age, preload),
    ))
}
