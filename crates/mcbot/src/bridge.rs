//! The command/event bridge between a host and the sessions it runs.
//!
//! The host talks to bots in two directions:
//!
//! ```text
//!  host ──HostCommand──→ BotBridge::execute ──→ SessionRegistry
//!   ▲                                                │
//!   └──HostNotification── pump task ←──SessionEvent──┘
//! ```
//!
//! The pump task also supervises reconnects: a session the host started
//! that disconnects without the host asking is restarted after the
//! configured delay, until the attempt limit is hit. Reaching Play resets
//! the count.
//!
//! The `supervised` lock is taken before the registry's and is never held
//! while waiting for an old session to close.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use mcbot_protocol::ProtocolState;
use mcbot_session::{
    AuthProvider, GameEvent, Identity, Intent, SessionEngine, SessionEvent, SessionEventKind,
    SessionRegistry, SessionSnapshot,
};
use mcbot_transport::{Connector, TcpConnector, Target};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};

use crate::{BotConfig, BotError, ReconnectConfig};

/// Disconnect reason for [`HostCommand::StopSession`].
pub const REASON_STOPPED_BY_HOST: &str = "stopped by host";
/// Disconnect reason for [`HostCommand::Reconnect`].
pub const REASON_RECONNECT_REQUESTED: &str = "reconnect requested by host";

// ---------------------------------------------------------------------------
// Commands, replies, notifications
// ---------------------------------------------------------------------------

/// What a host can ask of the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// Start a bot, or return the one already running for `identity`.
    StartSession { identity: Identity, target: Target },
    /// Disconnect a bot and stop supervising it.
    StopSession { identity: Identity },
    ListSessions,
    Status { identity: Identity },
    /// Drop the current connection and start a fresh one right away.
    Reconnect { identity: Identity },
    Send { identity: Identity, intent: Intent },
}

/// The answer to a [`HostCommand`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum HostReply {
    Started { session: SessionSnapshot },
    Stopped { identity: Identity },
    Sessions { sessions: Vec<SessionSnapshot> },
    Status { session: SessionSnapshot },
    Reconnecting { session: SessionSnapshot },
    /// The intent is in the session's queue.
    Queued { identity: Identity },
}

/// Something the host should hear about, already flattened for display or
/// serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostNotification {
    StateChanged {
        identity: Identity,
        session_id: u64,
        state: ProtocolState,
        reason: Option<String>,
    },
    Game {
        identity: Identity,
        session_id: u64,
        event: GameEvent,
    },
    Warning {
        identity: Identity,
        message: String,
    },
    ReconnectScheduled {
        identity: Identity,
        attempt: u32,
        max_attempts: u32,
        delay_secs: u64,
    },
    ReconnectAbandoned {
        identity: Identity,
        attempts: u32,
    },
}

impl From<SessionEvent> for HostNotification {
    fn from(event: SessionEvent) -> Self {
        let SessionEvent {
            identity,
            session_id,
            kind,
        } = event;
        match kind {
            SessionEventKind::StateChanged { state, reason } => Self::StateChanged {
                identity,
                session_id,
                state,
                reason,
            },
            SessionEventKind::Game(event) => Self::Game {
                identity,
                session_id,
                event,
            },
            SessionEventKind::ProcessWarning { message } => Self::Warning { identity, message },
        }
    }
}

// ---------------------------------------------------------------------------
// BotBridge
// ---------------------------------------------------------------------------

/// A bot the host started and the bridge keeps alive.
#[derive(Debug)]
struct Supervised {
    target: Target,
    /// The session currently running; `None` while a reconnect is pending.
    session_id: Option<u64>,
    /// Reconnects since the last time the bot reached Play.
    attempts: u32,
}

struct Shared<A, C> {
    registry: SessionRegistry<A, C>,
    reconnect: ReconnectConfig,
    supervised: Mutex<HashMap<Identity, Supervised>>,
    notifications: mpsc::UnboundedSender<HostNotification>,
}

/// Runs host commands against a session registry.
///
/// Cheap to clone; clones share the registry. Dropping the last clone
/// drops every session handle, which ends the sessions.
pub struct BotBridge<A, C = TcpConnector> {
    shared: Arc<Shared<A, C>>,
}

impl<A, C> Clone for BotBridge<A, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: AuthProvider> BotBridge<A> {
    /// A bridge over plain TCP using `config`.
    ///
    /// Returns the bridge and the channel its notifications arrive on.
    /// Must be called from inside a Tokio runtime.
    pub fn new(auth: A, config: BotConfig) -> (Self, mpsc::UnboundedReceiver<HostNotification>) {
        let engine = SessionEngine::new(auth, config.session);
        Self::with_engine(engine, config.reconnect)
    }
}

impl<A: AuthProvider, C: Connector> BotBridge<A, C> {
    /// A bridge over an existing engine.
    pub fn with_engine(
        engine: SessionEngine<A, C>,
        reconnect: ReconnectConfig,
    ) -> (Self, mpsc::UnboundedReceiver<HostNotification>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            registry: SessionRegistry::new(engine, event_tx),
            reconnect,
            supervised: Mutex::new(HashMap::new()),
            notifications: notify_tx,
        });
        tokio::spawn(pump(Arc::downgrade(&shared), event_rx));
        (Self { shared }, notify_rx)
    }

    pub fn registry(&self) -> &SessionRegistry<A, C> {
        &self.shared.registry
    }

    /// Runs one host command.
    ///
    /// # Errors
    /// - [`BotError::UnknownSession`] when the command names an identity
    ///   with no session.
    /// - [`BotError::Session`] when a `Send` is refused (queue full or
    ///   session closed).
    pub async fn execute(&self, command: HostCommand) -> Result<HostReply, BotError> {
        match command {
            HostCommand::StartSession { identity, target } => self.start_session(identity, target).await,
            HostCommand::StopSession { identity } => self.stop_session(identity).await,
            HostCommand::ListSessions => Ok(HostReply::Sessions {
                sessions: self.shared.registry.list_active().await,
            }),
            HostCommand::Status { identity } => {
                let handle = self
                    .shared
                    .registry
                    .get(&identity)
                    .await
                    .ok_or(BotError::UnknownSession(identity))?;
                Ok(HostReply::Status {
                    session: handle.snapshot(),
                })
            }
            HostCommand::Reconnect { identity } => self.reconnect_now(identity).await,
            HostCommand::Send { identity, intent } => {
                let handle = self
                    .shared
                    .registry
                    .get(&identity)
                    .await
                    .ok_or_else(|| BotError::UnknownSession(identity.clone()))?;
                handle.send(intent)?;
                Ok(HostReply::Queued { identity })
            }
        }
    }

    /// Stops supervising everything and disconnects every session.
    ///
    /// Returns how many sessions were running.
    pub async fn shutdown(&self, reason: &str) -> usize {
        self.shared.supervised.lock().await.clear();
        self.shared.registry.shutdown_all(reason).await
    }

    async fn start_session(&self, identity: Identity, target: Target) -> Result<HostReply, BotError> {
        let (mut supervised, handle) = loop {
            let supervised = self.shared.supervised.lock().await;
            match self.shared.registry.try_acquire(identity.clone(), target.clone()).await {
                Ok(handle) => break (supervised, handle),
                Err(closing) => {
                    drop(supervised);
                    closing.closed().await;
                }
            }
        };

        let attempts = match supervised.get(&identity) {
            Some(entry) if entry.session_id == Some(handle.session_id()) => entry.attempts,
            _ => 0,
        };
        supervised.insert(
            identity,
            Supervised {
                target: handle.target().clone(),
                session_id: Some(handle.session_id()),
                attempts,
            },
        );
        Ok(HostReply::Started {
            session: handle.snapshot(),
        })
    }

    async fn stop_session(&self, identity: Identity) -> Result<HostReply, BotError> {
        let mut supervised = self.shared.supervised.lock().await;
        let was_supervised = supervised.remove(&identity).is_some();
        let released = self
            .shared
            .registry
            .release(&identity, REASON_STOPPED_BY_HOST)
            .await;
        if !released && !was_supervised {
            return Err(BotError::UnknownSession(identity));
        }
        tracing::info!(%identity, "bot stopped by host");
        Ok(HostReply::Stopped { identity })
    }

    async fn reconnect_now(&self, identity: Identity) -> Result<HostReply, BotError> {
        let mut supervised = self.shared.supervised.lock().await;
        let current = self.shared.registry.get(&identity).await;
        let target = match (supervised.get(&identity), &current) {
            (Some(entry), _) => entry.target.clone(),
            (None, Some(handle)) => handle.target().clone(),
            (None, None) => return Err(BotError::UnknownSession(identity)),
        };
        if let Some(handle) = current {
            handle.disconnect(REASON_RECONNECT_REQUESTED);
        }
        // No session id: the old session's Disconnected is not a drop.
        supervised.insert(
            identity.clone(),
            Supervised {
                target: target.clone(),
                session_id: None,
                attempts: 0,
            },
        );

        loop {
            match self.shared.registry.try_acquire(identity.clone(), target.clone()).await {
                Ok(handle) => {
                    tracing::info!(%identity, session = handle.session_id(), "reconnect requested by host");
                    if let Some(entry) = supervised.get_mut(&identity) {
                        entry.session_id = Some(handle.session_id());
                    }
                    return Ok(HostReply::Reconnecting {
                        session: handle.snapshot(),
                    });
                }
                Err(closing) => {
                    drop(supervised);
                    closing.closed().await;
                    supervised = self.shared.supervised.lock().await;
                    // Stopped by the host while the old session closed.
                    if !supervised.contains_key(&identity) {
                        return Err(BotError::UnknownSession(identity));
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event pump and reconnect supervisor
// ---------------------------------------------------------------------------

/// Forwards session events to the host and reacts to state changes.
///
/// Holds the bridge weakly: once the host drops it, the sessions end, the
/// event channel closes and this task finishes.
async fn pump<A: AuthProvider, C: Connector>(
    shared: Weak<Shared<A, C>>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let _ = shared.notifications.send(event.clone().into());
        Shared::observe(&shared, &event).await;
    }
}

impl<A: AuthProvider, C: Connector> Shared<A, C> {
    fn notify(&self, notification: HostNotification) {
        let _ = self.notifications.send(notification);
    }

    async fn observe(this: &Arc<Self>, event: &SessionEvent) {
        let SessionEventKind::StateChanged { state, .. } = &event.kind else {
            return;
        };
        let identity = &event.identity;
        let mut supervised = this.supervised.lock().await;
        let Some(entry) = supervised.get_mut(identity) else {
            return;
        };
        if entry.session_id != Some(event.session_id) {
            return;
        }

        match state {
            ProtocolState::Play => entry.attempts = 0,
            ProtocolState::Disconnected if !this.reconnect.enabled => {
                supervised.remove(identity);
            }
            ProtocolState::Disconnected => {
                entry.session_id = None;
                if entry.attempts >= this.reconnect.max_attempts {
                    let attempts = entry.attempts;
                    supervised.remove(identity);
                    tracing::warn!(%identity, attempts, "giving up on reconnecting");
                    this.notify(HostNotification::ReconnectAbandoned {
                        identity: identity.clone(),
                        attempts,
                    });
                    return;
                }
                entry.attempts += 1;
                let attempt = entry.attempts;
                tracing::info!(
                    %identity,
                    attempt,
                    max_attempts = this.reconnect.max_attempts,
                    delay_secs = this.reconnect.delay_secs,
                    "reconnect scheduled"
                );
                this.notify(HostNotification::ReconnectScheduled {
                    identity: identity.clone(),
                    attempt,
                    max_attempts: this.reconnect.max_attempts,
                    delay_secs: this.reconnect.delay_secs,
                });
                tokio::spawn(Self::reconnect_after(Arc::downgrade(this), identity.clone(), attempt));
            }
            _ => {}
        }
    }

    async fn reconnect_after(this: Weak<Self>, identity: Identity, attempt: u32) {
        let Some(delay) = this.upgrade().map(|shared| shared.reconnect.delay()) else {
            return;
        };
        tokio::time::sleep(delay).await;

        let Some(this) = this.upgrade() else {
            return;
        };
        loop {
            let mut supervised = this.supervised.lock().await;
            // Stopped, restarted or rescheduled while we slept.
            let Some(entry) = supervised.get_mut(&identity) else {
                return;
            };
            if entry.session_id.is_some() || entry.attempts != attempt {
                return;
            }

            match this.registry.try_acquire(identity.clone(), entry.target.clone()).await {
                Ok(handle) => {
                    tracing::info!(%identity, attempt, session = handle.session_id(), "reconnecting");
                    entry.session_id = Some(handle.session_id());
                    return;
                }
                Err(closing) => {
                    drop(supervised);
                    closing.closed().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_session_event_state_change() {
        let event = SessionEvent {
            identity: Identity::new("Steve"),
            session_id: 3,
            kind: SessionEventKind::StateChanged {
                state: ProtocolState::Disconnected,
                reason: Some("timed out".into()),
            },
        };
        let notification = HostNotification::from(event);
        assert_eq!(
            notification,
            HostNotification::StateChanged {
                identity: Identity::new("Steve"),
                session_id: 3,
                state: ProtocolState::Disconnected,
                reason: Some("timed out".into()),
            }
        );
    }

    #[test]
    fn test_from_session_event_process_warning_becomes_warning() {
        let event = SessionEvent {
            identity: Identity::new("Steve"),
            session_id: 1,
            kind: SessionEventKind::ProcessWarning {
                message: "too many open files".into(),
            },
        };
        assert!(matches!(
            HostNotification::from(event),
            HostNotification::Warning { message, .. } if message == "too many open files"
        ));
    }

    #[test]
    fn test_notification_serializes_flat() {
        let notification = HostNotification::Game {
            identity: Identity::new("Steve"),
            session_id: 7,
            event: GameEvent::Died,
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "game");
        assert_eq!(json["identity"], "Steve");
        assert_eq!(json["event"]["event"], "died");
    }

    #[test]
    fn test_reconnect_scheduled_serializes_counts() {
        let notification = HostNotification::ReconnectScheduled {
            identity: Identity::new("Alex"),
            attempt: 2,
            max_attempts: 10,
            delay_secs: 30,
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "reconnect_scheduled");
        assert_eq!(json["attempt"], 2);
        assert_eq!(json["delay_secs"], 30);
    }
}
