//! Backend connections over TCP or a Unix domain socket.
//!
//! # Responsibilities
//! - Resolve a logical `localhost:port` to a Unix socket when the route has one
//! - Enforce the connect timeout
//! - Plug into the hyper client, the WebSocket client and the readiness probe
//!
//! # Design Decisions
//! - One connector type for every backend connection, so the three users
//!   cannot disagree about where a route lives
//! - Timeouts surface as `io::ErrorKind::TimedOut` and are classified later

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

/// Message carried by connect timeouts.
pub const CONNECT_TIMEOUT_MESSAGE: &str = "Timeout while connecting";

/// Maps a logical backend address to a Unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixSocketResolver {
    socket: PathBuf,
}

impl UnixSocketResolver {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self { socket: socket.into() }
    }

    /// Socket path for `host`. Only `localhost` may live on a Unix socket.
    pub fn resolve(&self, host: &str) -> io::Result<&Path> {
        if host != "localhost" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Unix socket routes must target localhost, got '{}'", host),
            ));
        }
        Ok(&self.socket)
    }
}

/// Connects to backends, optionally through a [`UnixSocketResolver`].
#[derive(Debug, Clone)]
pub struct BackendConnector {
    resolver: Option<Arc<UnixSocketResolver>>,
    connect_timeout: Duration,
}

impl BackendConnector {
    pub fn tcp(connect_timeout: Duration) -> Self {
        Self {
            resolver: None,
            connect_timeout,
        }
    }

    pub fn unix(resolver: UnixSocketResolver, connect_timeout: Duration) -> Self {
        Self {
            resolver: Some(Arc::new(resolver)),
            connect_timeout,
        }
    }

    /// Open a stream to `host:port`, or to the resolved socket.
    pub async fn connect(&self, host: &str, port: u16) -> io::Result<BackendStream> {
        let connect = async {
            match &self.resolver {
                Some(resolver) => {
                    let path = resolver.resolve(host)?;
                    UnixStream::connect(path).await.map(BackendStream::Unix)
                }
                None => {
                    let stream = TcpStream::connect((host, port)).await?;
                    stream.set_nodelay(true)?;
                    Ok(BackendStream::Tcp(stream))
                }
            }
        };

        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, CONNECT_TIMEOUT_MESSAGE)),
        }
    }
}

impl tower::Service<Uri> for BackendConnector {
    type Response = BackendIo;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<BackendIo>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connector = self.clone();
        Box::pin(async move {
            let host = uri
                .host()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "URI has no host"))?;
            let port = uri.port_u16().unwrap_or(80);
            let stream = connector.connect(host, port).await?;
            Ok(BackendIo::new(stream))
        })
    }
}

/// A connected backend stream.
#[derive(Debug)]
pub enum BackendStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncRead for BackendStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BackendStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            BackendStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BackendStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            BackendStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            BackendStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BackendStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            BackendStream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BackendStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            BackendStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Hyper-facing wrapper around a [`BackendStream`].
#[derive(Debug)]
pub struct BackendIo {
    inner: TokioIo<BackendStream>,
}

impl BackendIo {
    pub fn new(stream: BackendStream) -> Self {
        Self {
            inner: TokioIo::new(stream),
        }
    }
}

impl hyper::rt::Read for BackendIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        hyper::rt::Read::poll_read(Pin::new(&mut self.inner), cx, buf)
    }
}

impl hyper::rt::Write for BackendIo {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        hyper::rt::Write::poll_write(Pin::new(&mut self.inner), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_flush(Pin::new(&mut self.inner), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_shutdown(Pin::new(&mut self.inner), cx)
    }
}

impl Connection for BackendIo {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, UnixListener};

    #[test]
    fn test_resolver_requires_localhost() {
        let resolver = UnixSocketResolver::new("/tmp/x.sock");
        assert_eq!(resolver.resolve("localhost").unwrap(), Path::new("/tmp/x.sock"));
        let err = resolver.resolve("127.0.0.1").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_connects_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socket");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"hi").await.unwrap();
        });

        let connector = BackendConnector::unix(UnixSocketResolver::new(&path), Duration::from_secs(1));
        let mut stream = connector.connect("localhost", 0).await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_tcp_connect_refused_is_not_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = BackendConnector::tcp(Duration::from_secs(1));
        let err = connector.connect("127.0.0.1", port).await.unwrap_err();
        assert_ne!(err.kind(), io::ErrorKind::TimedOut);
    }
}
