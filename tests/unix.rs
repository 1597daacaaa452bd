//! Unix domain socket listener.

use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use httpd::config::UnixListenerConfig;
use httpd::net::ListenerError;
use httpd::{Error, HttpdConfig, LifecycleState, Scheme, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

mod common;

use common::{local_config, spawn_serve, wait_for_state};

fn unix_config(socket_path: std::path::PathBuf, mode: u32) -> HttpdConfig {
    HttpdConfig {
        schemes: vec![Scheme::Unix],
        unix: UnixListenerConfig { socket_path, mode },
        ..local_config()
    }
}

#[tokio::test]
async fn serves_over_socket_and_removes_it_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("httpd.sock");

    let server = Arc::new(
        Server::builder(unix_config(path.clone(), 0o660))
            .handler(Router::new().route("/", get(|| async { "over unix" })))
            .build(),
    );
    let serving = spawn_serve(&server);
    wait_for_state(&server, LifecycleState::Serving).await;

    let meta = std::fs::metadata(&path).unwrap();
    assert!(meta.file_type().is_socket());
    assert_eq!(meta.permissions().mode() & 0o777, 0o660);
    assert!(server.http_listener().unwrap().is_none());

    let mut stream = UnixStream::connect(&path).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with("over unix"), "{response}");

    server.shutdown();
    serving.await.unwrap().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn stale_socket_from_previous_run_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("httpd.sock");
    // leave a dead socket behind
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let server = Arc::new(Server::builder(unix_config(path.clone(), 0o600)).build());
    let serving = spawn_serve(&server);
    wait_for_state(&server, LifecycleState::Serving).await;

    assert!(UnixStream::connect(&path).await.is_ok());

    server.shutdown();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn regular_file_at_socket_path_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("httpd.sock");
    std::fs::write(&path, "keep me").unwrap();

    let server = Server::builder(unix_config(path.clone(), 0o600)).build();
    let err = server.serve().await.unwrap_err();

    assert!(matches!(err, Error::Listener(ListenerError::StaleSocket { .. })));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
}
