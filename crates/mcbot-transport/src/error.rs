/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The target string could not be parsed or failed validation.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Resolving or connecting to the remote server failed.
    #[error("connect to {target} failed: {source}")]
    ConnectFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connect did not complete in time.
    #[error("connect to {target} timed out after {secs}s")]
    ConnectTimeout { target: String, secs: u64 },

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Returns `true` when the failure is caused by the process running out
    /// of sockets or memory rather than by the remote server.
    ///
    /// These are escalated to the host instead of being treated as an
    /// ordinary per-session failure.
    pub fn is_resource_exhaustion(&self) -> bool {
        let io = match self {
            Self::ConnectFailed { source, .. } => source,
            Self::SendFailed(e) | Self::ReceiveFailed(e) => e,
            _ => return false,
        };
        if io.kind() == std::io::ErrorKind::OutOfMemory {
            return true;
        }
        // EMFILE (24) and ENFILE (23) on unix-likes.
        matches!(io.raw_os_error(), Some(23) | Some(24))
    }
}
