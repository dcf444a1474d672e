//! Unified error type for mcbot.

use mcbot_protocol::ProtocolError;
use mcbot_session::{AuthError, Identity, SessionError};
use mcbot_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Hosts that only use the `mcbot` facade deal with this one type. The
/// `#[from]` variants let `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// A transport-level error (bad target, connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, compression, bad packet).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (backpressure, closed session, timeout).
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No session is known for this identity.
    #[error("no session for {0}")]
    UnknownSession(Identity),
}
