//! Starting sessions and talking to them.
//!
//! [`SessionEngine`] holds what every session shares (auth provider,
//! connector, packet table, config) and spawns one task per
//! [`SessionEngine::connect`]. The returned [`SessionHandle`] is the only
//! way to reach that task:
//!
//! ```text
//!  SessionHandle ──intents (bounded mpsc)──→ ┌──────────────┐ ──bytes──→ server
//!       │        ──disconnect (watch)──────→ │ session task │
//!       │        ←─state / stats (watch)──── └──────────────┘ ←─bytes─── server
//!       ▼                                           │
//!  events (unbounded mpsc) ←────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mcbot_protocol::{PacketTable, ProtocolState};
use mcbot_transport::{Connector, TcpConnector, Target};
use tokio::sync::{mpsc, watch};

use crate::driver::{SessionContext, SessionTask};
use crate::machine::{ConfigurationFlow, VanillaConfigurationFlow};
use crate::status::{self, StatusReport};
use crate::{
    AuthProvider, Identity, Intent, SessionConfig, SessionError, SessionEvent, SessionSnapshot,
    SessionStats,
};

/// Counter for session ids. Every connect gets a new one, reconnects
/// included, so events from an old run can be told apart.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle to a running (or finished) session.
///
/// Cheap to clone. When the last clone is dropped the session ends with
/// "session handle dropped".
#[derive(Clone)]
pub struct SessionHandle {
    identity: Identity,
    target: Target,
    session_id: u64,
    intents: mpsc::Sender<Intent>,
    state: watch::Receiver<ProtocolState>,
    stats: watch::Receiver<SessionStats>,
    shutdown: Arc<watch::Sender<Option<String>>>,
    capacity: usize,
}

impl SessionHandle {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// The current protocol state.
    pub fn state(&self) -> ProtocolState {
        *self.state.borrow()
    }

    /// A copy of the current counters.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let stats = self.stats.borrow();
        SessionSnapshot::new(
            self.identity.clone(),
            self.session_id,
            &self.target,
            self.state(),
            &stats,
        )
    }

    /// `true` once the session is Disconnected or asked to disconnect.
    pub fn is_closed(&self) -> bool {
        self.state().is_terminal() || self.shutdown.borrow().is_some()
    }

    /// Queues an intent for the session.
    ///
    /// Never waits: a full queue is reported instead.
    ///
    /// # Errors
    /// - [`SessionError::SessionClosed`] once the session is disconnected
    ///   or disconnecting.
    /// - [`SessionError::Backpressure`] when the queue is full.
    pub fn send(&self, intent: Intent) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed(self.identity.clone()));
        }
        self.intents.try_send(intent).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::Backpressure {
                identity: self.identity.clone(),
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => SessionError::SessionClosed(self.identity.clone()),
        })
    }

    /// Asks the session to disconnect with `reason`.
    ///
    /// Returns immediately and can be called from anywhere, including
    /// non-async code. Only the first reason counts; later calls are
    /// no-ops. Returns `true` if this call made the request.
    pub fn disconnect(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let requested = self.shutdown.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if requested {
            tracing::debug!(identity = %self.identity, session = self.session_id, %reason, "disconnect requested");
        }
        requested
    }

    /// Waits until the state satisfies `pred` and returns it.
    ///
    /// If the session task is gone the last state (Disconnected) is
    /// checked and returned either way.
    pub async fn wait_for_state(&self, mut pred: impl FnMut(ProtocolState) -> bool) -> ProtocolState {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| pred(*s)).await.map(|s| *s);
        reached.unwrap_or_else(|_| *state.borrow())
    }

    /// Waits until the session is Disconnected.
    pub async fn closed(&self) {
        self.wait_for_state(|s| s.is_terminal()).await;
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("identity", &self.identity)
            .field("session_id", &self.session_id)
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

/// Starts sessions.
///
/// Generic over the auth provider and the connector; the connector
/// defaults to plain TCP. Cloning is cheap and clones share everything.
pub struct SessionEngine<A, C = TcpConnector> {
    auth: Arc<A>,
    connector: Arc<C>,
    config: Arc<SessionConfig>,
    table: Arc<PacketTable>,
    flow: Arc<dyn ConfigurationFlow>,
}

impl<A, C> Clone for SessionEngine<A, C> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            table: Arc::clone(&self.table),
            flow: Arc::clone(&self.flow),
        }
    }
}

impl<A: AuthProvider> SessionEngine<A> {
    /// An engine that dials TCP with the config's connect timeout and
    /// speaks protocol 767 (1.21).
    pub fn new(auth: A, config: SessionConfig) -> Self {
        let connector = TcpConnector::new(config.connect_timeout());
        Self {
            auth: Arc::new(auth),
            connector: Arc::new(connector),
            config: Arc::new(config),
            table: Arc::new(PacketTable::v1_21()),
            flow: Arc::new(VanillaConfigurationFlow),
        }
    }
}

impl<A: AuthProvider, C: Connector> SessionEngine<A, C> {
    /// Replaces the connector.
    pub fn with_connector<C2: Connector>(self, connector: C2) -> SessionEngine<A, C2> {
        SessionEngine {
            auth: self.auth,
            connector: Arc::new(connector),
            config: self.config,
            table: self.table,
            flow: self.flow,
        }
    }

    /// Replaces the packet table (another protocol version).
    pub fn with_table(mut self, table: Arc<PacketTable>) -> Self {
        self.table = table;
        self
    }

    /// Replaces how Configuration packets are acknowledged.
    pub fn with_configuration_flow(mut self, flow: impl ConfigurationFlow) -> Self {
        self.flow = Arc::new(flow);
        self
    }

    pub fn auth(&self) -> &Arc<A> {
        &self.auth
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<PacketTable> {
        &self.table
    }

    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// Pings `target` for its server-list status, within the handshake
    /// timeout.
    pub async fn status(&self, target: &Target) -> Result<StatusReport, SessionError> {
        status::query(
            self.connector.as_ref(),
            target,
            Arc::clone(&self.table),
            self.config.handshake_timeout(),
        )
        .await
    }

    /// Starts a session and returns its handle right away, in Handshake.
    ///
    /// Failures (auth, DNS, TCP, protocol) never come back from here: they
    /// end the session and arrive on `events` as a `Disconnected` state
    /// change with a reason.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn connect(
        &self,
        target: Target,
        identity: Identity,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionHandle {
        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let capacity = self.config.outbound_queue.max(1);
        let (intent_tx, intent_rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(ProtocolState::Handshake);
        let (stats_tx, stats_rx) = watch::channel(SessionStats::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(None);

        let task = SessionTask {
            ctx: SessionContext {
                identity: identity.clone(),
                session_id,
                target: target.clone(),
                auth: Arc::clone(&self.auth),
                connector: Arc::clone(&self.connector),
                config: Arc::clone(&self.config),
                table: Arc::clone(&self.table),
                flow: Arc::clone(&self.flow),
                state_tx,
                stats_tx,
                events,
            },
            intents: intent_rx,
            shutdown: shutdown_rx,
        };
        tokio::spawn(task.run());

        SessionHandle {
            identity,
            target,
            session_id,
            intents: intent_tx,
            state: state_rx,
            stats: stats_rx,
            shutdown: Arc::new(shutdown_tx),
            capacity,
        }
    }
}
