//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpd::config::{HttpListenerConfig, TlsListenerConfig};
use httpd::http::HttpServer;
use httpd::{Hook, HttpdConfig, LifecycleState, Scheme, Server};
use tokio::task::JoinHandle;

/// HTTP listener on an ephemeral loopback port.
pub fn local_http() -> HttpListenerConfig {
    HttpListenerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

/// TLS listener on an ephemeral loopback port, using the fixture certificate.
pub fn local_tls() -> TlsListenerConfig {
    TlsListenerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        certificate: fixture("cert.pem"),
        certificate_key: fixture("key.pem"),
        ..Default::default()
    }
}

/// Config with only loopback HTTP enabled.
pub fn local_config() -> HttpdConfig {
    HttpdConfig {
        http: local_http(),
        tls: local_tls(),
        ..Default::default()
    }
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Run `serve` on a background task.
pub fn spawn_serve(server: &Arc<Server>) -> JoinHandle<Result<(), httpd::Error>> {
    let server = server.clone();
    tokio::spawn(async move { server.serve().await })
}

/// Poll until the server reaches `state`.
pub async fn wait_for_state(server: &Server, state: LifecycleState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("server never reached {state:?}, stuck at {:?}", server.state()));
}

/// Hook that records every listener it sees, in order.
#[derive(Default, Clone)]
pub struct ListenerRecorder {
    pub seen: Arc<Mutex<Vec<(Scheme, String)>>>,
}

impl ListenerRecorder {
    pub fn addresses(&self) -> Vec<(Scheme, String)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Hook for ListenerRecorder {
    fn configure_listener(&self, _server: &mut HttpServer, scheme: Scheme, addr: &str) {
        self.seen.lock().unwrap().push((scheme, addr.to_string()));
    }
}
