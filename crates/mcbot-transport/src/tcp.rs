//! TCP connector using `tokio::net::TcpStream`.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::{Connection, ConnectionId, Connector, Target, TransportError};

/// A [`Connector`] that dials plain TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector that gives up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// The configured connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, target: &Target) -> Result<Connection<TcpStream>, TransportError> {
        let addr = (target.host(), target.port());
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::ConnectFailed {
                    target: target.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    target: target.to_string(),
                    secs: self.connect_timeout.as_secs(),
                });
            }
        };

        // Small packets (keep-alives, acks) must not sit in Nagle's buffer.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%target, error = %e, "failed to set TCP_NODELAY");
        }

        let id = ConnectionId::next();
        tracing::debug!(%id, %target, "connected");
        Ok(Connection { id, stream })
    }
}
