//! Server-list ping: the status query a client makes without logging in.
//!
//! ```text
//! → Intention(next = Status)
//! → StatusRequest            ← StatusResponse(json)
//! → PingRequest(payload)     ← PongResponse(payload)     (latency)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mcbot_protocol::{
    Clientbound, Decoded, NextState, Packet, PacketTable, ProtocolError, ProtocolState,
    ServerStatus, Serverbound, WireCodec,
};
use mcbot_transport::{ByteStream, Connection, Connector, Target, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::SessionError;

/// What a status query found.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: ServerStatus,
    /// Round trip of the ping exchange.
    pub latency: Duration,
}

/// Queries `target`'s status within `timeout`.
///
/// # Errors
/// [`SessionError::HandshakeTimeout`] if the exchange does not finish in
/// time, otherwise transport or protocol errors (including a pong that
/// does not echo the ping).
pub async fn query<C: Connector>(
    connector: &C,
    target: &Target,
    table: Arc<PacketTable>,
    timeout: Duration,
) -> Result<StatusReport, SessionError> {
    tokio::time::timeout(timeout, exchange(connector, target, table))
        .await
        .map_err(|_| SessionError::HandshakeTimeout)?
}

async fn exchange<C: Connector>(
    connector: &C,
    target: &Target,
    table: Arc<PacketTable>,
) -> Result<StatusReport, SessionError> {
    let Connection { id, mut stream } = connector.connect(target).await?;
    let mut codec = WireCodec::new(table);
    tracing::debug!(conn = %id, %target, "status query");

    let intention = Serverbound::Intention {
        protocol_version: codec.table().protocol_version(),
        host: target.host().to_string(),
        port: target.port(),
        next: NextState::Status,
    };
    write(&mut stream, &mut codec, ProtocolState::Handshake, &intention).await?;
    write(&mut stream, &mut codec, ProtocolState::Status, &Serverbound::StatusRequest).await?;

    let status = match read(&mut stream, &mut codec, target).await? {
        Clientbound::StatusResponse { json } => ServerStatus::from_json(&json)?,
        other => return Err(unexpected(&other).into()),
    };

    let payload = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    let sent = Instant::now();
    write(&mut stream, &mut codec, ProtocolState::Status, &Serverbound::PingRequest { payload }).await?;

    match read(&mut stream, &mut codec, target).await? {
        Clientbound::PongResponse { payload: echoed } if echoed == payload => {
            let latency = sent.elapsed();
            tracing::debug!(conn = %id, latency_ms = latency.as_millis() as u64, "status received");
            Ok(StatusReport { status, latency })
        }
        Clientbound::PongResponse { payload: echoed } => Err(ProtocolError::InvalidMessage(format!(
            "pong payload {echoed} does not match ping {payload}"
        ))
        .into()),
        other => Err(unexpected(&other).into()),
    }
}

async fn write<S: ByteStream>(
    stream: &mut S,
    codec: &mut WireCodec,
    state: ProtocolState,
    packet: &Serverbound,
) -> Result<(), SessionError> {
    let bytes = codec.encode(state, packet)?;
    stream
        .write_all(&bytes)
        .await
        .map_err(TransportError::SendFailed)?;
    Ok(())
}

async fn read<S: ByteStream>(
    stream: &mut S,
    codec: &mut WireCodec,
    target: &Target,
) -> Result<Clientbound, SessionError> {
    let mut buf = [0u8; 4096];
    loop {
        if let Decoded::Ready(packet) = codec.decode(ProtocolState::Status)? {
            return Ok(packet);
        }
        let n = stream
            .read(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed(target.to_string()).into());
        }
        codec.feed(&buf[..n]);
    }
}

fn unexpected(packet: &Clientbound) -> ProtocolError {
    ProtocolError::InvalidMessage(format!("unexpected {:?} during status query", packet.kind()))
}
