//! Accept errors that are not tied to one connection.
//!
//! Lowers the process file descriptor limit, so this binary holds one test.

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use httpd::{LifecycleState, Server};
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

mod common;

use common::{local_config, spawn_serve, wait_for_state};

const EMFILE: i32 = 24;

/// Open `/dev/null` until the descriptor table is full.
fn exhaust_descriptors() -> Vec<File> {
    let mut held = Vec::new();
    for _ in 0..100_000 {
        match File::open("/dev/null") {
            Ok(file) => held.push(file),
            Err(e) if e.raw_os_error() == Some(EMFILE) => return held,
            Err(e) => panic!("unexpected open error: {e}"),
        }
    }
    panic!("descriptor limit never reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listener_survives_running_out_of_descriptors() {
    let server = Arc::new(
        Server::builder(local_config())
            .handler(Router::new().route("/", get(|| async { "still here" })))
            .build(),
    );
    let serving = spawn_serve(&server);
    wait_for_state(&server, LifecycleState::Serving).await;
    let addr = server.http_listener().unwrap().unwrap().local_addr().tcp().unwrap();

    let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE).unwrap();
    setrlimit(Resource::RLIMIT_NOFILE, 256.min(soft), hard).unwrap();
    let mut held = exhaust_descriptors();

    // free exactly one slot for the client; the server's accept gets EMFILE
    held.pop();
    let client = std::net::TcpStream::connect(addr).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.state(), LifecycleState::Serving);

    drop(held);
    setrlimit(Resource::RLIMIT_NOFILE, soft, hard).unwrap();

    client.set_nonblocking(true).unwrap();
    let mut client = tokio::net::TcpStream::from_std(client).unwrap();
    client
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with("still here"), "{response}");

    // a fresh connection is accepted too
    let body = reqwest::get(format!("http://{addr}/")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "still here");

    server.shutdown();
    serving.await.unwrap().unwrap();
}
