//! The session task: one per bot, sole owner of its socket and codec.
//!
//! The task runs three phases and ends with exactly one terminal
//! `Disconnected` event, whatever went wrong:
//!
//! ```text
//! credential (auth provider, spawned) → connect (connector) → converse (select loop)
//!      │                                    │                        │
//!      └──────────── handshake deadline ────┴────────────────────────┘ (until Play)
//! ```
//!
//! The conversation loop multiplexes socket reads, queued intents, host
//! disconnect requests, the auth provider's answer to an encryption
//! challenge, and timers. Intents are only taken from the queue while the
//! connection is in Play, which both defers them and keeps the queue's
//! bound meaningful before login finishes.

use std::convert::Infallible;
use std::sync::Arc;

use mcbot_protocol::{
    ClientInformation, Clientbound, Direction, Packet, PacketTable, ProtocolError, ProtocolState,
    Serverbound, WireCodec,
};
use mcbot_transport::{ByteStream, Connection, ConnectionId, Connector, Target};
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::machine::{Action, ConfigurationFlow, MachineSettings, ProtocolMachine, intent_packet};
use crate::session::{Position, SessionEventKind};
use crate::{
    AuthError, AuthProvider, Credential, EncryptionChallenge, EncryptionMaterial, GameEvent,
    Identity, Intent, SessionConfig, SessionEvent, SessionStats,
};

pub(crate) const REASON_AUTH_FAILED: &str = "authentication failed";
pub(crate) const REASON_HANDSHAKE_TIMEOUT: &str = "handshake timeout";
pub(crate) const REASON_TIMED_OUT: &str = "timed out";
pub(crate) const REASON_CONNECTION_RESET: &str = "connection reset";
pub(crate) const REASON_HANDLE_DROPPED: &str = "session handle dropped";

const READ_CHUNK: usize = 8 * 1024;

/// Why a phase ended the session.
type Exit<T> = Result<T, String>;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything the task shares with the engine, plus its outbound channels.
pub(crate) struct SessionContext<A, C> {
    pub identity: Identity,
    pub session_id: u64,
    pub target: Target,
    pub auth: Arc<A>,
    pub connector: Arc<C>,
    pub config: Arc<SessionConfig>,
    pub table: Arc<PacketTable>,
    pub flow: Arc<dyn ConfigurationFlow>,
    pub state_tx: watch::Sender<ProtocolState>,
    pub stats_tx: watch::Sender<SessionStats>,
    pub events: mpsc::UnboundedSender<SessionEvent>,
}

impl<A, C> SessionContext<A, C> {
    fn emit(&self, kind: SessionEventKind) {
        // The host may have stopped listening; the session carries on.
        let _ = self.events.send(SessionEvent {
            identity: self.identity.clone(),
            session_id: self.session_id,
            kind,
        });
    }

    fn enter(&self, state: ProtocolState) {
        self.state_tx.send_replace(state);
        tracing::info!(identity = %self.identity, session = self.session_id, %state, "state changed");
        self.emit(SessionEventKind::StateChanged { state, reason: None });
    }

    fn stats(&self, update: impl FnOnce(&mut SessionStats)) {
        self.stats_tx.send_modify(update);
    }
}

// ---------------------------------------------------------------------------
// SessionTask
// ---------------------------------------------------------------------------

pub(crate) struct SessionTask<A, C> {
    pub ctx: SessionContext<A, C>,
    pub intents: mpsc::Receiver<Intent>,
    pub shutdown: watch::Receiver<Option<String>>,
}

impl<A: AuthProvider, C: Connector> SessionTask<A, C> {
    /// Runs the session to completion.
    pub(crate) async fn run(mut self) {
        tracing::info!(
            identity = %self.ctx.identity,
            session = self.ctx.session_id,
            target = %self.ctx.target,
            "session started"
        );

        let Err(reason) = self.drive().await;

        // Refuse further intents before anyone sees the terminal state.
        self.intents.close();
        self.ctx.stats(|s| s.disconnect_reason = Some(reason.clone()));
        self.ctx.state_tx.send_replace(ProtocolState::Disconnected);
        tracing::info!(
            identity = %self.ctx.identity,
            session = self.ctx.session_id,
            %reason,
            "session ended"
        );
        self.ctx.emit(SessionEventKind::StateChanged {
            state: ProtocolState::Disconnected,
            reason: Some(reason),
        });
    }

    async fn drive(&mut self) -> Exit<Infallible> {
        let deadline = Instant::now() + self.ctx.config.handshake_timeout();
        let credential = self.credential(deadline).await?;
        let connection = self.connect(deadline).await?;
        self.converse(connection, credential, deadline).await
    }

    /// Phase 1: ask the auth provider, off this task.
    async fn credential(&mut self, deadline: Instant) -> Exit<Arc<Credential>> {
        let (tx, rx) = oneshot::channel();
        let auth = Arc::clone(&self.ctx.auth);
        let identity = self.ctx.identity.clone();
        tokio::spawn(async move {
            let _ = tx.send(auth.credential_for(&identity).await);
        });

        tokio::select! {
            result = rx => match result {
                Ok(Ok(credential)) => Ok(credential),
                Ok(Err(e)) => {
                    tracing::warn!(identity = %self.ctx.identity, error = %e, "no credential");
                    Err(REASON_AUTH_FAILED.into())
                }
                Err(_) => Err(REASON_AUTH_FAILED.into()),
            },
            _ = tokio::time::sleep_until(deadline) => Err(REASON_HANDSHAKE_TIMEOUT.into()),
            reason = shutdown_requested(&mut self.shutdown) => Err(reason),
        }
    }

    /// Phase 2: open the byte stream.
    async fn connect(&mut self, deadline: Instant) -> Exit<Connection<C::Stream>> {
        let connect = tokio::time::timeout_at(deadline, self.ctx.connector.connect(&self.ctx.target));
        let result = tokio::select! {
            result = connect => result,
            reason = shutdown_requested(&mut self.shutdown) => return Err(reason),
        };
        match result {
            Ok(Ok(connection)) => {
                tracing::info!(
                    identity = %self.ctx.identity,
                    conn = %connection.id,
                    target = %self.ctx.target,
                    "connected"
                );
                self.ctx.stats(|s| s.connected_at = Some(std::time::Instant::now()));
                Ok(connection)
            }
            Ok(Err(e)) => {
                if e.is_resource_exhaustion() {
                    tracing::warn!(identity = %self.ctx.identity, error = %e, "process is out of resources");
                    self.ctx.emit(SessionEventKind::ProcessWarning {
                        message: e.to_string(),
                    });
                }
                Err(format!("connect failed: {e}"))
            }
            Err(_) => Err(REASON_HANDSHAKE_TIMEOUT.into()),
        }
    }

    /// Phase 3: the protocol conversation.
    async fn converse(
        &mut self,
        connection: Connection<C::Stream>,
        credential: Arc<Credential>,
        handshake_deadline: Instant,
    ) -> Exit<Infallible> {
        let Connection { id, stream } = connection;
        let (mut reader, writer) = tokio::io::split(stream);
        let config = Arc::clone(&self.ctx.config);

        let settings = MachineSettings {
            protocol_version: self.ctx.table.protocol_version(),
            host: self.ctx.target.host().to_string(),
            port: self.ctx.target.port(),
            brand: config.brand.clone(),
            client_information: ClientInformation {
                locale: config.locale.clone(),
                view_distance: config.view_distance,
                ..ClientInformation::default()
            },
            auto_respawn: config.auto_respawn,
        };
        let machine =
            ProtocolMachine::new(settings, credential.profile.clone(), Arc::clone(&self.ctx.flow));
        let mut conv = Conversation {
            ctx: &self.ctx,
            shutdown: &mut self.shutdown,
            conn: id,
            credential,
            codec: WireCodec::new(Arc::clone(&self.ctx.table)).with_max_frame_len(config.max_frame_len),
            machine,
            writer,
            wire_state: ProtocolState::Handshake,
            reached_play: false,
            pending_sign: None,
            last_keep_alive: None,
            watchdog_warned: false,
        };
        let start = conv.machine.start();
        conv.execute(start).await?;

        let mut buf = vec![0u8; READ_CHUNK];
        let mut last_read = Instant::now();
        let period = config.keep_alive_interval();
        let mut watchdog = tokio::time::interval_at(Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let in_play = conv.wire_state == ProtocolState::Play;
            let (deadline, on_deadline) = if conv.reached_play {
                (last_read + config.read_timeout(), REASON_TIMED_OUT)
            } else {
                (handshake_deadline, REASON_HANDSHAKE_TIMEOUT)
            };

            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => return Err(REASON_CONNECTION_RESET.into()),
                    Ok(n) => {
                        last_read = Instant::now();
                        conv.codec.feed(&buf[..n]);
                        conv.process_frames(last_read).await?;
                    }
                    Err(e) => {
                        tracing::debug!(identity = %self.ctx.identity, conn = %id, error = %e, "read failed");
                        return Err(REASON_CONNECTION_RESET.into());
                    }
                },
                intent = self.intents.recv(), if in_play => match intent {
                    Some(intent) => conv.send_intent(intent).await?,
                    None => return Err(REASON_HANDLE_DROPPED.into()),
                },
                material = signed(&mut conv.pending_sign) => match material {
                    Ok(material) => {
                        let actions = conv.machine.encryption_ready(material);
                        conv.execute(actions).await?;
                    }
                    Err(e) => {
                        tracing::warn!(identity = %self.ctx.identity, error = %e, "encryption challenge refused");
                        return Err(REASON_AUTH_FAILED.into());
                    }
                },
                reason = shutdown_requested(conv.shutdown) => return Err(reason),
                _ = tokio::time::sleep_until(deadline) => return Err(on_deadline.into()),
                _ = watchdog.tick(), if in_play => conv.check_keep_alive(period),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Per-connection state of the conversation phase.
///
/// Every await on the socket or the blocking pool also watches `shutdown`,
/// so a host disconnect ends the session even while a write is stuck.
struct Conversation<'a, A, C, S> {
    ctx: &'a SessionContext<A, C>,
    shutdown: &'a mut watch::Receiver<Option<String>>,
    conn: ConnectionId,
    credential: Arc<Credential>,
    codec: WireCodec,
    machine: ProtocolMachine,
    writer: WriteHalf<S>,
    /// The state frames are currently encoded and decoded in. Follows the
    /// machine's state one action at a time.
    wire_state: ProtocolState,
    reached_play: bool,
    pending_sign: Option<oneshot::Receiver<Result<EncryptionMaterial, AuthError>>>,
    last_keep_alive: Option<Instant>,
    watchdog_warned: bool,
}

impl<A: AuthProvider, C, S: ByteStream> Conversation<'_, A, C, S> {
    /// Decodes and handles every complete frame in the buffer.
    async fn process_frames(&mut self, received_at: Instant) -> Exit<()> {
        loop {
            let frame = match self.codec.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => return Err(protocol_error(e)),
            };

            let compression = self.codec.compression();
            let body = if compression.is_some() && frame.len() >= self.ctx.config.offload_threshold {
                let inflate = tokio::task::spawn_blocking(move || WireCodec::unpack(frame, compression));
                tokio::select! {
                    joined = inflate => joined.map_err(|e| format!("decompression task failed: {e}"))?,
                    reason = shutdown_requested(self.shutdown) => return Err(reason),
                }
            } else {
                WireCodec::unpack(frame, compression)
            };
            let body = body.map_err(protocol_error)?;
            self.ctx.stats(|s| s.packets_received += 1);

            match self.codec.decode_body::<Clientbound>(self.wire_state, body) {
                Ok(packet) => self.handle_packet(packet, received_at).await?,
                Err(ProtocolError::UnknownPacketId { state, id }) => {
                    let actions = self.machine.handle_unknown(id);
                    if actions.is_empty() {
                        tracing::debug!(
                            identity = %self.ctx.identity,
                            %state,
                            id = format_args!("0x{id:02X}"),
                            "discarded unknown packet"
                        );
                        self.ctx.stats(|s| s.packets_discarded += 1);
                    }
                    self.execute(actions).await?;
                }
                Err(e) => return Err(protocol_error(e)),
            }
        }
    }

    async fn handle_packet(&mut self, packet: Clientbound, received_at: Instant) -> Exit<()> {
        if self.ctx.config.log_packets {
            tracing::trace!(identity = %self.ctx.identity, state = %self.wire_state, ?packet, "recv");
        } else {
            tracing::debug!(identity = %self.ctx.identity, state = %self.wire_state, kind = ?packet.kind(), "recv");
        }

        let keep_alive = matches!(packet, Clientbound::KeepAlive { .. });
        if keep_alive {
            self.last_keep_alive = Some(received_at);
            self.watchdog_warned = false;
            self.ctx.stats(|s| s.last_keep_alive = Some(std::time::Instant::now()));
        }

        let actions = self.machine.handle(packet);
        self.execute(actions).await?;

        if keep_alive {
            let took = received_at.elapsed();
            if took > self.ctx.config.keep_alive_budget() {
                self.ctx.stats(|s| s.late_keep_alives += 1);
                tracing::warn!(
                    identity = %self.ctx.identity,
                    took_ms = took.as_millis() as u64,
                    "keep-alive answered late, the server may kick this session"
                );
            }
        }
        Ok(())
    }

    /// Carries out the machine's actions, in order.
    async fn execute(&mut self, actions: Vec<Action>) -> Exit<()> {
        for action in actions {
            match action {
                Action::Send(packet) => self.write(&packet).await?,
                Action::Transition(state) => {
                    self.wire_state = state;
                    if state == ProtocolState::Play {
                        self.reached_play = true;
                    }
                    self.ctx.enter(state);
                }
                Action::SetCompression(threshold) => {
                    self.codec.set_compression(threshold);
                    let active = self.codec.compression();
                    tracing::debug!(identity = %self.ctx.identity, threshold, "compression set");
                    self.ctx.stats(|s| s.compression_threshold = active);
                }
                Action::BeginEncryption(challenge) => self.begin_encryption(challenge),
                Action::EnableEncryption(secret) => {
                    self.codec.install_cipher(&secret).map_err(protocol_error)?;
                    tracing::debug!(identity = %self.ctx.identity, conn = %self.conn, "encryption enabled");
                    self.ctx.stats(|s| s.encrypted = true);
                }
                Action::Event(event) => {
                    record(&event, &self.ctx.stats_tx);
                    self.ctx.emit(SessionEventKind::Game(event));
                }
                Action::Disconnect(reason) => return Err(reason),
            }
        }
        Ok(())
    }

    fn begin_encryption(&mut self, challenge: EncryptionChallenge) {
        let (tx, rx) = oneshot::channel();
        let auth = Arc::clone(&self.ctx.auth);
        let credential = Arc::clone(&self.credential);
        tokio::spawn(async move {
            let _ = tx.send(auth.sign_encryption_challenge(&credential, &challenge).await);
        });
        self.pending_sign = Some(rx);
    }

    async fn send_intent(&mut self, intent: Intent) -> Exit<()> {
        let packet = intent_packet(intent);
        let kind = packet.kind();
        if self
            .ctx
            .table
            .id_for(self.wire_state, Direction::Serverbound, kind)
            .is_none()
        {
            tracing::warn!(identity = %self.ctx.identity, ?kind, "dropped intent with no packet id in play");
            return Ok(());
        }
        self.write(&packet).await
    }

    async fn write(&mut self, packet: &Serverbound) -> Exit<()> {
        let bytes = self
            .codec
            .encode(self.wire_state, packet)
            .map_err(protocol_error)?;
        let send = tokio::time::timeout(self.ctx.config.read_timeout(), self.writer.write_all(&bytes));
        let sent = tokio::select! {
            sent = send => sent,
            reason = shutdown_requested(self.shutdown) => return Err(reason),
        };
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(identity = %self.ctx.identity, conn = %self.conn, error = %e, "write failed");
                return Err(REASON_CONNECTION_RESET.into());
            }
            Err(_) => return Err(REASON_TIMED_OUT.into()),
        }
        if self.ctx.config.log_packets {
            tracing::trace!(identity = %self.ctx.identity, state = %self.wire_state, ?packet, "sent");
        }
        self.ctx.stats(|s| s.packets_sent += 1);
        Ok(())
    }

    /// Warns once per gap when keep-alives stop arriving.
    fn check_keep_alive(&mut self, interval: std::time::Duration) {
        let since = self.last_keep_alive.map(|at| at.elapsed());
        let overdue = since.is_none_or(|gap| gap > interval * 2);
        if overdue && !self.watchdog_warned {
            self.watchdog_warned = true;
            tracing::warn!(
                identity = %self.ctx.identity,
                since_ms = since.map(|gap| gap.as_millis() as u64),
                "no keep-alive from the server for over twice the expected interval"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Folds a gameplay event into the published stats.
fn record(event: &GameEvent, stats: &watch::Sender<SessionStats>) {
    match *event {
        GameEvent::Joined { entity_id } => stats.send_modify(|s| s.entity_id = Some(entity_id)),
        GameEvent::Health { health, food, .. } => stats.send_modify(|s| {
            s.health = Some(health);
            s.food = Some(food);
        }),
        GameEvent::Position { x, y, z, yaw, pitch } => stats.send_modify(|s| {
            s.position = Some(Position { x, y, z, yaw, pitch });
        }),
        _ => {}
    }
}

fn protocol_error(e: ProtocolError) -> String {
    format!("protocol error: {e}")
}

/// Resolves with the reason once the host asks the session to stop.
///
/// Checks the current value first, so a request made before the task got
/// here is not missed.
async fn shutdown_requested(shutdown: &mut watch::Receiver<Option<String>>) -> String {
    loop {
        if let Some(reason) = shutdown.borrow_and_update().clone() {
            return reason;
        }
        if shutdown.changed().await.is_err() {
            return REASON_HANDLE_DROPPED.into();
        }
    }
}

/// Resolves with the auth provider's answer, or never if none is pending.
async fn signed(
    pending: &mut Option<oneshot::Receiver<Result<EncryptionMaterial, AuthError>>>,
) -> Result<EncryptionMaterial, AuthError> {
    let Some(rx) = pending else {
        return std::future::pending().await;
    };
    let result = rx
        .await
        .unwrap_or_else(|_| Err(AuthError::Unavailable("auth task ended".into())));
    *pending = None;
    result
}
