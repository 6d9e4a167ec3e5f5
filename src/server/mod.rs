//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and feeds each one through a fresh
//! [`RequestParser`] per request. The parser itself has no limits; this
//! module is where the ceilings live:
//!
//! - more than [`ServerConfig::max_request_bytes`] buffered: `413` and close
//! - no complete request within [`ServerConfig::request_timeout_ms`]: `408` and close
//! - malformed request: `400` and close
//!
//! HTTP/1.1 connections are persistent by default. Bytes that arrive after a
//! request ends (pipelining) seed the parser for the next one.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::http::{Request, RequestParser, Response, StatusCode};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Per-connection limits.
///
/// Deserializable so it can sit inside an application's config file; missing
/// fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bytes one request may occupy before it is rejected (8 MiB).
    pub max_request_bytes: usize,
    /// Time allowed for one complete request to arrive.
    pub request_timeout_ms: u64,
    /// Initial read buffer capacity per connection.
    pub initial_buffer_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 8 * 1024 * 1024,
            request_timeout_ms: 30_000,
            initial_buffer_bytes: 4096,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// The wirehttp HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use wirehttp::server::Server;
/// use wirehttp::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req| async {
///         Response::new(StatusCode::Ok).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Binds the server to the given TCP address with default limits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        Self::with_config(addr, ServerConfig::default()).await
    }

    /// Binds the server to the given TCP address with explicit limits.
    pub async fn with_config(addr: impl AsRef<str>, config: ServerConfig) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            config: Arc::new(config),
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// The handler is shared across all spawned Tokio tasks, so it must be
    /// `Send + Sync + 'static`. Runs until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "wirehttp listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, config).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// How reading one request ended.
#[derive(Debug, PartialEq, Eq)]
enum ReadOutcome {
    Ready,
    Malformed,
    TooLarge,
    Closed,
}

/// Handles a single connection over its lifetime, one request per iteration.
async fn handle_connection<S, H, F>(
    mut stream: S,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    config: Arc<ServerConfig>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(config.initial_buffer_bytes);
    let mut leftover = BytesMut::new();

    loop {
        let mut parser = RequestParser::new();
        let mut received = leftover.len();
        if !leftover.is_empty() {
            parser.feed(&leftover);
            leftover.clear();
        }

        let outcome = tokio::time::timeout(
            config.request_timeout(),
            read_request(&mut stream, &mut parser, &mut buf, config.max_request_bytes, &mut received),
        )
        .await;

        let rejection = match outcome {
            Ok(Ok(ReadOutcome::Ready)) => None,
            Ok(Ok(ReadOutcome::Closed)) => {
                debug!(peer = %peer_addr, "connection closed by peer");
                return Ok(());
            }
            Ok(Ok(ReadOutcome::Malformed)) => {
                warn!(peer = %peer_addr, "malformed request, sending 400");
                Some(Response::new(StatusCode::BadRequest).body("Bad Request"))
            }
            Ok(Ok(ReadOutcome::TooLarge)) => {
                warn!(peer = %peer_addr, received, "request too large, sending 413");
                Some(Response::new(StatusCode::PayloadTooLarge).body("Request entity too large"))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) if received == 0 => {
                debug!(peer = %peer_addr, "idle connection timed out");
                return Ok(());
            }
            Err(_) => {
                warn!(peer = %peer_addr, received, "request timed out, sending 408");
                Some(Response::new(StatusCode::RequestTimeout).body("Request timeout"))
            }
        };

        if let Some(response) = rejection {
            stream.write_all(&response.keep_alive(false).into_bytes()).await?;
            stream.flush().await?;
            return Ok(());
        }

        let Some((request, rest)) = parser.into_parts() else {
            return Ok(());
        };
        leftover = rest;

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let client_keep_alive = request.is_keep_alive();
        let mut response = handler(request).await;
        if !client_keep_alive {
            response = response.keep_alive(false);
        }
        let keep_alive = response.is_keep_alive();

        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            return Ok(());
        }
    }
}

/// Reads from `stream` into `parser` until it is ready, malformed, over the
/// size ceiling, or the peer hangs up. The ceiling is checked before feeding
/// so an oversized request never reaches the handler.
async fn read_request<S>(
    stream: &mut S,
    parser: &mut RequestParser,
    buf: &mut BytesMut,
    max_request_bytes: usize,
    received: &mut usize,
) -> io::Result<ReadOutcome>
where
    S: AsyncRead + Unpin,
{
    loop {
        if parser.is_ready() {
            return Ok(ReadOutcome::Ready);
        }
        if parser.is_malformed() {
            return Ok(ReadOutcome::Malformed);
        }

        buf.clear();
        let read = stream.read_buf(buf).await?;
        if read == 0 {
            return Ok(ReadOutcome::Closed);
        }
        *received += read;
        if *received > max_request_bytes {
            return Ok(ReadOutcome::TooLarge);
        }
        parser.feed(&buf[..read]);
    }
}
