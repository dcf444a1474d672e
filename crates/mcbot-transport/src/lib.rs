//! Transport abstraction layer for mcbot.
//!
//! Sessions are clients: they dial out to a game server and then treat the
//! socket as an ordered byte stream. This crate provides:
//!
//! - [`Target`]: a validated `host:port` pair.
//! - [`Connector`]: the trait that turns a target into a byte stream.
//! - [`TcpConnector`]: the production implementation over
//!   `tokio::net::TcpStream`, with a connect timeout.
//!
//! Tests swap in their own connector (an in-memory duplex, or a TCP
//! listener on localhost) without touching the session code.

#![allow(async_fn_in_trait)]

mod error;
mod target;
mod tcp;

pub use error::TransportError;
pub use target::{DEFAULT_PORT, Target};
pub use tcp::TcpConnector;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Any ordered, reliable byte stream a session can run over.
///
/// Blanket-implemented for every type with the right bounds, so
/// `TcpStream` and `tokio::io::DuplexStream` both qualify.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// An established outbound connection.
#[derive(Debug)]
pub struct Connection<S> {
    /// Unique id used in logs.
    pub id: ConnectionId,
    /// The byte stream. The session task takes exclusive ownership.
    pub stream: S,
}

/// Opens outbound connections.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because one connector is shared (behind an
/// `Arc`) by every session task the engine spawns.
pub trait Connector: Send + Sync + 'static {
    /// The stream type produced by this connector.
    type Stream: ByteStream;

    /// Connects to `target`.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectFailed`] or
    /// [`TransportError::ConnectTimeout`].
    fn connect(
        &self,
        target: &Target,
    ) -> impl std::future::Future<Output = Result<Connection<Self::Stream>, TransportError>> + Send;
}
