//! Lifecycle hooks invoked while listeners are constructed.
//!
//! Hooks are configuration steps, not gatekeepers: they cannot fail or veto
//! a listener. Several hooks compose into one [`Hooks`] value that calls each
//! in registration order, so later hooks observe earlier mutations.

use std::fmt;
use std::sync::Arc;

use crate::http::server::HttpServer;
use crate::net::Scheme;

/// Callbacks into listener construction.
///
/// Both methods default to doing nothing.
pub trait Hook: Send + Sync {
    /// Mutate the TLS policy of an https listener before it is finalized.
    fn configure_tls(&self, _config: &mut rustls::ServerConfig) {}

    /// Observe or adjust a server before it begins serving on `addr`.
    fn configure_listener(&self, _server: &mut HttpServer, _scheme: Scheme, _addr: &str) {}
}

/// An ordered fan-out over several hooks.
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: Vec<Arc<dyn Hook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; it runs after every hook already registered.
    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").field("len", &self.hooks.len()).finish()
    }
}

impl FromIterator<Arc<dyn Hook>> for Hooks {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Hook>>>(iter: I) -> Self {
        Self {
            hooks: iter.into_iter().collect(),
        }
    }
}

impl Hook for Hooks {
    fn configure_tls(&self, config: &mut rustls::ServerConfig) {
        for hook in &self.hooks {
            hook.configure_tls(config);
        }
    }

    fn configure_listener(&self, server: &mut HttpServer, scheme: Scheme, addr: &str) {
        for hook in &self.hooks {
            hook.configure_listener(server, scheme, addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Hook for Recorder {
        fn configure_listener(&self, server: &mut HttpServer, scheme: Scheme, addr: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{scheme}:{addr}:{:?}", self.name, server.read_timeout));
            server.read_timeout = Some(Duration::from_secs(1));
        }
    }

    #[test]
    fn composite_runs_hooks_in_order_and_shares_mutations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks: Hooks = ["first", "second"]
            .into_iter()
            .map(|name| {
                Arc::new(Recorder {
                    name,
                    log: log.clone(),
                }) as Arc<dyn Hook>
            })
            .collect();
        assert_eq!(hooks.len(), 2);

        let mut server = HttpServer::new(axum::Router::new(), 8192);
        hooks.configure_listener(&mut server, Scheme::Http, "127.0.0.1:80");

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:http:127.0.0.1:80:None".to_string(),
                "second:http:127.0.0.1:80:Some(1s)".to_string(),
            ]
        );
    }

    #[test]
    fn empty_composite_is_a_no_op() {
        let hooks = Hooks::new();
        assert!(hooks.is_empty());

        let mut server = HttpServer::new(axum::Router::new(), 8192);
        hooks.configure_listener(&mut server, Scheme::Unix, "/tmp/x.sock");
        assert!(server.read_timeout.is_none());
    }
}
