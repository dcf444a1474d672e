//! Error types for the session layer.

use mcbot_protocol::ProtocolError;
use mcbot_transport::TransportError;

use crate::{AuthError, Identity};

/// Errors returned by session, registry and status operations.
///
/// Failures *inside* a running session never come back through here: they
/// end that session and surface as a `Disconnected` event with a reason.
/// These variants cover the calls a host makes synchronously.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Malformed or unsupported bytes from the server.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The auth provider refused or failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The network failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session's outbound queue is full.
    #[error("outbound queue for {identity} is full ({capacity} pending)")]
    Backpressure { identity: Identity, capacity: usize },

    /// The session has disconnected (or is disconnecting).
    #[error("session for {0} is closed")]
    SessionClosed(Identity),

    /// Connect + login + configuration did not finish in time.
    #[error("handshake timed out")]
    HandshakeTimeout,
}
