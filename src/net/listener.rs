//! Socket binding and accept with backpressure.
//!
//! # Responsibilities
//! - Bind TCP host:port and Unix socket paths
//! - Clear stale socket files and restrict socket permissions
//! - Accept incoming connections, enforcing `listen_limit` via semaphore
//!
//! # Design Decisions
//! - Binding uses std sockets so a provider can bind before a runtime exists
//! - The accept side takes the socket over; the port closes when it is dropped
//! - The address outlives the socket, so accessors keep working after shutdown

use std::fmt;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::net::ListenerError;

/// Address a listener is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl ListenerAddr {
    /// The socket address, for TCP listeners.
    pub fn tcp(&self) -> Option<SocketAddr> {
        match self {
            ListenerAddr::Tcp(addr) => Some(*addr),
            ListenerAddr::Unix(_) => None,
        }
    }
}

impl fmt::Display for ListenerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerAddr::Tcp(addr) => write!(f, "{addr}"),
            ListenerAddr::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug)]
enum Socket {
    Tcp(std::net::TcpListener),
    Unix(std::os::unix::net::UnixListener),
}

/// A native listener, bound once.
///
/// The socket is handed to the first [`acceptor`](Self::acceptor); the
/// address stays available for the life of the value.
#[derive(Debug)]
pub struct BoundListener {
    socket: Mutex<Option<Socket>>,
    addr: ListenerAddr,
}

impl BoundListener {
    /// Bind a TCP listener. An empty host binds every interface.
    pub fn bind_tcp(host: &str, port: u16) -> Result<Self, ListenerError> {
        let host = if host.is_empty() { "0.0.0.0" } else { host };
        let shown = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };

        let listener = std::net::TcpListener::bind((host, port))
            .map_err(|e| ListenerError::bind(&shown, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ListenerError::bind(&shown, e))?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self {
            socket: Mutex::new(Some(Socket::Tcp(listener))),
            addr: ListenerAddr::Tcp(local_addr),
        })
    }

    /// Bind a Unix domain socket, replacing a stale socket file at `path`.
    pub fn bind_unix(path: &Path, mode: u32) -> Result<Self, ListenerError> {
        remove_stale_socket(path)?;

        let shown = path.display().to_string();
        let listener = std::os::unix::net::UnixListener::bind(path)
            .map_err(|e| ListenerError::bind(&shown, e))?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| ListenerError::bind(&shown, e))?;

        tracing::info!(path = %path.display(), mode = %format!("{mode:o}"), "Listener bound");

        Ok(Self {
            socket: Mutex::new(Some(Socket::Unix(listener))),
            addr: ListenerAddr::Unix(path.to_path_buf()),
        })
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> &ListenerAddr {
        &self.addr
    }

    /// Whether the socket has been handed to an acceptor.
    pub fn is_taken(&self) -> bool {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Move the socket into a tokio acceptor. Works once.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn acceptor(&self, listen_limit: usize) -> io::Result<Acceptor> {
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| io::Error::other("listener is already serving"))?;

        let inner = match socket {
            Socket::Tcp(listener) => {
                listener.set_nonblocking(true)?;
                Incoming::Tcp(tokio::net::TcpListener::from_std(listener)?)
            }
            Socket::Unix(listener) => {
                listener.set_nonblocking(true)?;
                Incoming::Unix(tokio::net::UnixListener::from_std(listener)?)
            }
        };

        Ok(Acceptor {
            inner,
            limit: (listen_limit > 0).then(|| Arc::new(Semaphore::new(listen_limit))),
        })
    }
}

fn remove_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let stale = |source: io::Error| ListenerError::StaleSocket {
        path: path.to_path_buf(),
        source: Arc::new(source),
    };

    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            fs::remove_file(path).map_err(stale)?;
            tracing::debug!(path = %path.display(), "Removed stale socket");
            Ok(())
        }
        Ok(_) => Err(stale(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(stale(e)),
    }
}

enum Incoming {
    Tcp(tokio::net::TcpListener),
    Unix(tokio::net::UnixListener),
}

/// An accepted connection, before any TLS handshake.
pub(crate) enum Connection {
    Tcp(TcpStream),
    Unix(UnixStream),
}

/// A connection together with its slot in the connection limit.
///
/// The permit, if any, must be held for the connection's lifetime.
pub(crate) struct Accepted {
    pub conn: Connection,
    pub peer: String,
    pub permit: Option<OwnedSemaphorePermit>,
}

/// Accept side of a bound listener.
///
/// When `listen_limit` is set, accepting blocks once the limit is reached
/// until a connection closes; new connections are never rejected.
pub(crate) struct Acceptor {
    inner: Incoming,
    limit: Option<Arc<Semaphore>>,
}

impl Acceptor {
    pub async fn accept(&self) -> io::Result<Accepted> {
        // Acquire permit first (backpressure)
        let permit = match &self.limit {
            Some(limit) => Some(
                limit
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| io::Error::other("connection limiter closed"))?,
            ),
            None => None,
        };

        let (conn, peer) = match &self.inner {
            Incoming::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                (Connection::Tcp(stream), addr.to_string())
            }
            Incoming::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                (Connection::Unix(stream), "unix".to_string())
            }
        };

        Ok(Accepted { conn, peer, permit })
    }

    /// Free connection slots, if a limit is configured.
    pub fn available_permits(&self) -> Option<usize> {
        self.limit.as_ref().map(|l| l.available_permits())
    }
}

/// Whether an accept error only affects the one connection.
pub(crate) fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
