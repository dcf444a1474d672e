//! Integration tests for the bridge: command dispatch, notifications and
//! the reconnect supervisor.

use std::sync::Arc;
use std::time::Duration;

use mcbot::prelude::*;
use mcbot::{REASON_RECONNECT_REQUESTED, REASON_STOPPED_BY_HOST};
use mcbot_protocol::{Clientbound, Decoded, PacketTable, Serverbound, WireCodec};
use mcbot_session::{SessionEngine, SessionError};
use mcbot_transport::{Connection, Connector, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Mock connectors
// =========================================================================

/// Never finishes connecting: sessions stay in Handshake until stopped.
struct StalledConnector;

impl Connector for StalledConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _target: &Target) -> Result<Connection<DuplexStream>, TransportError> {
        std::future::pending().await
    }
}

/// Refuses every connection immediately.
struct RefusingConnector;

impl Connector for RefusingConnector {
    type Stream = DuplexStream;

    async fn connect(&self, target: &Target) -> Result<Connection<DuplexStream>, TransportError> {
        Err(TransportError::ConnectFailed {
            target: target.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        })
    }
}

// =========================================================================
// Mock server
// =========================================================================

/// Just enough of a server to take a bot to Play.
struct ServerConn {
    stream: TcpStream,
    codec: WireCodec,
    state: ProtocolState,
}

impl ServerConn {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("bot should connect")
            .expect("should accept");
        Self {
            stream,
            codec: WireCodec::new(Arc::new(PacketTable::v1_21())),
            state: ProtocolState::Handshake,
        }
    }

    async fn recv(&mut self) -> Serverbound {
        let mut buf = [0u8; 4096];
        loop {
            if let Decoded::Ready(packet) = self
                .codec
                .decode::<Serverbound>(self.state)
                .expect("bot sent a malformed packet")
            {
                return packet;
            }
            let n = tokio::time::timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for the bot")
                .expect("read should succeed");
            assert!(n > 0, "bot closed the connection");
            self.codec.feed(&buf[..n]);
        }
    }

    async fn send(&mut self, packet: Clientbound) {
        let bytes = self.codec.encode(self.state, &packet).expect("should encode");
        self.stream.write_all(&bytes).await.expect("should write");
    }

    async fn login(&mut self) {
        assert!(matches!(self.recv().await, Serverbound::Intention { .. }));
        self.state = ProtocolState::Login;
        let Serverbound::LoginStart { name, uuid } = self.recv().await else {
            panic!("expected LoginStart");
        };
        self.send(Clientbound::LoginSuccess {
            uuid,
            username: name,
            properties: Vec::new(),
            strict_error_handling: false,
        })
        .await;
        assert_eq!(self.recv().await, Serverbound::LoginAcknowledged);
        self.state = ProtocolState::Configuration;
        assert!(matches!(self.recv().await, Serverbound::PluginMessage { .. }));
        assert!(matches!(self.recv().await, Serverbound::ClientInformation(_)));
        self.send(Clientbound::FinishConfiguration).await;
        assert_eq!(self.recv().await, Serverbound::AcknowledgeFinishConfiguration);
        self.state = ProtocolState::Play;
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn bridge<C: Connector>(
    connector: C,
    reconnect: ReconnectConfig,
) -> (
    BotBridge<OfflineAuthProvider, C>,
    UnboundedReceiver<HostNotification>,
) {
    let engine =
        SessionEngine::new(OfflineAuthProvider, SessionConfig::default()).with_connector(connector);
    BotBridge::with_engine(engine, reconnect)
}

fn no_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        enabled: false,
        ..ReconnectConfig::default()
    }
}

fn target() -> Target {
    "localhost:25565".parse().unwrap()
}

fn start(name: &str, target: Target) -> HostCommand {
    HostCommand::StartSession {
        identity: Identity::new(name),
        target,
    }
}

async fn next(notifications: &mut UnboundedReceiver<HostNotification>) -> HostNotification {
    tokio::time::timeout(WAIT, notifications.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("notification channel closed")
}

/// Skips notifications until one matches `pred`.
async fn next_matching(
    notifications: &mut UnboundedReceiver<HostNotification>,
    pred: impl Fn(&HostNotification) -> bool,
) -> HostNotification {
    loop {
        let notification = next(notifications).await;
        if pred(&notification) {
            return notification;
        }
    }
}

fn is_disconnected(notification: &HostNotification) -> bool {
    matches!(
        notification,
        HostNotification::StateChanged {
            state: ProtocolState::Disconnected,
            ..
        }
    )
}

// =========================================================================
// Command dispatch
// =========================================================================

#[tokio::test]
async fn test_start_session_twice_reuses_session() {
    let (bridge, _notifications) = bridge(StalledConnector, no_reconnect());

    let first = match bridge.execute(start("Steve", target())).await.unwrap() {
        HostReply::Started { session } => session,
        other => panic!("expected Started, got {other:?}"),
    };
    let second = match bridge.execute(start("Steve", target())).await.unwrap() {
        HostReply::Started { session } => session,
        other => panic!("expected Started, got {other:?}"),
    };

    assert_eq!(first.session_id, second.session_id);
    assert_eq!(first.state, ProtocolState::Handshake);
}

#[tokio::test]
async fn test_list_sessions_sorted_by_identity() {
    let (bridge, _notifications) = bridge(StalledConnector, no_reconnect());
    bridge.execute(start("Zed", target())).await.unwrap();
    bridge.execute(start("Alex", target())).await.unwrap();

    match bridge.execute(HostCommand::ListSessions).await.unwrap() {
        HostReply::Sessions { sessions } => {
            let names: Vec<_> = sessions.iter().map(|s| s.identity.as_str()).collect();
            assert_eq!(names, vec!["Alex", "Zed"]);
        }
        other => panic!("expected Sessions, got {other:?}"),
    }
}

#[tokio::test]
async fn test_status_unknown_identity_returns_unknown_session() {
    let (bridge, _notifications) = bridge(StalledConnector, no_reconnect());
    let result = bridge
        .execute(HostCommand::Status {
            identity: Identity::new("Nobody"),
        })
        .await;
    assert!(matches!(result, Err(BotError::UnknownSession(id)) if id.as_str() == "Nobody"));
}

#[tokio::test]
async fn test_send_unknown_identity_returns_unknown_session() {
    let (bridge, _notifications) = bridge(StalledConnector, no_reconnect());
    let result = bridge
        .execute(HostCommand::Send {
            identity: Identity::new("Nobody"),
            intent: Intent::Chat("hi".into()),
        })
        .await;
    assert!(matches!(result, Err(BotError::UnknownSession(_))));
}

#[tokio::test]
async fn test_send_queues_intent_before_play() {
    let (bridge, _notifications) = bridge(StalledConnector, no_reconnect());
    bridge.execute(start("Steve", target())).await.unwrap();

    let reply = bridge
        .execute(HostCommand::Send {
            identity: Identity::new("Steve"),
            intent: Intent::Command("/help".into()),
        })
        .await
        .unwrap();
    assert_eq!(
        reply,
        HostReply::Queued {
            identity: Identity::new("Steve")
        }
    );
}

#[tokio::test]
async fn test_stop_session_disconnects_with_host_reason() {
    let (bridge, mut notifications) = bridge(StalledConnector, ReconnectConfig::default());
    bridge.execute(start("Steve", target())).await.unwrap();

    let reply = bridge
        .execute(HostCommand::StopSession {
            identity: Identity::new("Steve"),
        })
        .await
        .unwrap();
    assert!(matches!(reply, HostReply::Stopped { .. }));

    match next_matching(&mut notifications, is_disconnected).await {
        HostNotification::StateChanged { reason, .. } => {
            assert_eq!(reason.as_deref(), Some(REASON_STOPPED_BY_HOST));
        }
        other => panic!("expected StateChanged, got {other:?}"),
    }

    let result = bridge
        .execute(HostCommand::Send {
            identity: Identity::new("Steve"),
            intent: Intent::Respawn,
        })
        .await;
    assert!(matches!(result, Err(BotError::UnknownSession(_))));
}

#[tokio::test]
async fn test_stop_session_unknown_identity_returns_unknown_session() {
    let (bridge, _notifications) = bridge(StalledConnector, no_reconnect());
    let result = bridge
        .execute(HostCommand::StopSession {
            identity: Identity::new("Nobody"),
        })
        .await;
    assert!(matches!(result, Err(BotError::UnknownSession(_))));
}

#[tokio::test]
async fn test_send_backpressure_surfaces_as_session_error() {
    let config = SessionConfig {
        outbound_queue: 1,
        ..SessionConfig::default()
    };
    let engine = SessionEngine::new(OfflineAuthProvider, config).with_connector(StalledConnector);
    let (bridge, _notifications) = BotBridge::with_engine(engine, no_reconnect());
    bridge.execute(start("Steve", target())).await.unwrap();

    let send = || HostCommand::Send {
        identity: Identity::new("Steve"),
        intent: Intent::Chat("spam".into()),
    };
    bridge.execute(send()).await.unwrap();
    let result = bridge.execute(send()).await;
    assert!(matches!(
        result,
        Err(BotError::Session(SessionError::Backpressure { capacity: 1, .. }))
    ));
}

#[tokio::test]
async fn test_reconnect_command_replaces_session() {
    let (bridge, mut notifications) = bridge(StalledConnector, ReconnectConfig::default());
    let old = match bridge.execute(start("Steve", target())).await.unwrap() {
        HostReply::Started { session } => session.session_id,
        other => panic!("expected Started, got {other:?}"),
    };

    let new = match bridge
        .execute(HostCommand::Reconnect {
            identity: Identity::new("Steve"),
        })
        .await
        .unwrap()
    {
        HostReply::Reconnecting { session } => session.session_id,
        other => panic!("expected Reconnecting, got {other:?}"),
    };
    assert_ne!(old, new);

    match next_matching(&mut notifications, is_disconnected).await {
        HostNotification::StateChanged {
            session_id, reason, ..
        } => {
            assert_eq!(session_id, old);
            assert_eq!(reason.as_deref(), Some(REASON_RECONNECT_REQUESTED));
        }
        other => panic!("expected StateChanged, got {other:?}"),
    }

    // The old session's disconnect is not treated as a drop.
    bridge.shutdown("test over").await;
    let mut rest = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        rest.push(notification);
    }
    assert!(
        !rest
            .iter()
            .any(|n| matches!(n, HostNotification::ReconnectScheduled { .. })),
        "got {rest:?}"
    );
}

#[tokio::test]
async fn test_start_session_waiting_on_close_does_not_block_other_commands() {
    let (bridge, _notifications) = bridge(StalledConnector, no_reconnect());
    bridge.execute(start("Alex", target())).await.unwrap();
    bridge.execute(start("Steve", target())).await.unwrap();
    let steve = Identity::new("Steve");
    let old = bridge.registry().get(&steve).await.unwrap();
    assert!(bridge.registry().release(&steve, "going away").await);

    // Park a start for Steve on the closing session.
    let mut restart = std::pin::pin!(bridge.execute(start("Steve", target())));
    assert!(
        tokio::time::timeout(Duration::ZERO, &mut restart)
            .await
            .is_err(),
        "old session has not closed yet"
    );

    let stop = tokio::time::timeout(
        Duration::from_secs(1),
        bridge.execute(HostCommand::StopSession {
            identity: Identity::new("Alex"),
        }),
    )
    .await
    .expect("commands for other bots must not wait");
    assert!(matches!(stop, Ok(HostReply::Stopped { .. })));
    tokio::time::timeout(Duration::from_secs(1), bridge.execute(HostCommand::ListSessions))
        .await
        .expect("commands for other bots must not wait")
        .unwrap();

    match restart.await.unwrap() {
        HostReply::Started { session } => assert_ne!(session.session_id, old.session_id()),
        other => panic!("expected Started, got {other:?}"),
    }
    assert_eq!(old.state(), ProtocolState::Disconnected);
}

// =========================================================================
// Reconnect supervisor
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_max_attempts() {
    let reconnect = ReconnectConfig {
        enabled: true,
        delay_secs: 1,
        max_attempts: 2,
    };
    let (bridge, mut notifications) = bridge(RefusingConnector, reconnect);
    bridge.execute(start("Steve", target())).await.unwrap();

    let mut scheduled = Vec::new();
    let mut disconnects = 0;
    let abandoned = loop {
        match next(&mut notifications).await {
            HostNotification::StateChanged {
                state: ProtocolState::Disconnected,
                reason,
                ..
            } => {
                let reason = reason.unwrap();
                assert!(reason.starts_with("connect failed"), "got {reason:?}");
                disconnects += 1;
            }
            HostNotification::ReconnectScheduled {
                attempt,
                max_attempts,
                delay_secs,
                ..
            } => {
                assert_eq!((max_attempts, delay_secs), (2, 1));
                scheduled.push(attempt);
            }
            HostNotification::ReconnectAbandoned { attempts, .. } => break attempts,
            _ => {}
        }
    };

    assert_eq!(scheduled, vec![1, 2]);
    assert_eq!(disconnects, 3);
    assert_eq!(abandoned, 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_reconnect_delay_cancels_reconnect() {
    let reconnect = ReconnectConfig {
        enabled: true,
        delay_secs: 10,
        max_attempts: 5,
    };
    let (bridge, mut notifications) = bridge(RefusingConnector, reconnect);
    bridge.execute(start("Steve", target())).await.unwrap();

    next_matching(&mut notifications, |n| {
        matches!(n, HostNotification::ReconnectScheduled { attempt: 1, .. })
    })
    .await;
    bridge
        .execute(HostCommand::StopSession {
            identity: Identity::new("Steve"),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(notifications.try_recv().is_err(), "no reconnect after a host stop");
    assert!(bridge.registry().is_empty().await);
}

#[tokio::test]
async fn test_reconnect_attempts_reset_after_reaching_play() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let reconnect = ReconnectConfig {
        enabled: true,
        delay_secs: 0,
        max_attempts: 1,
    };
    let (bridge, mut notifications) = BotBridge::with_engine(
        SessionEngine::new(OfflineAuthProvider, SessionConfig::default()),
        reconnect,
    );
    bridge
        .execute(start("Steve", Target::new("127.0.0.1", port).unwrap()))
        .await
        .unwrap();

    // Twice: reach Play, get dropped, get rescheduled as attempt 1.
    for _ in 0..2 {
        let mut conn = ServerConn::accept(&listener).await;
        conn.login().await;
        next_matching(&mut notifications, |n| {
            matches!(
                n,
                HostNotification::StateChanged {
                    state: ProtocolState::Play,
                    ..
                }
            )
        })
        .await;
        drop(conn);

        match next_matching(&mut notifications, |n| {
            matches!(
                n,
                HostNotification::ReconnectScheduled { .. } | HostNotification::ReconnectAbandoned { .. }
            )
        })
        .await
        {
            HostNotification::ReconnectScheduled { attempt, .. } => assert_eq!(attempt, 1),
            other => panic!("expected ReconnectScheduled, got {other:?}"),
        }
    }

    bridge.shutdown("test over").await;
}

#[tokio::test]
async fn test_game_events_forwarded_as_notifications() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (bridge, mut notifications) = BotBridge::with_engine(
        SessionEngine::new(OfflineAuthProvider, SessionConfig::default()),
        no_reconnect(),
    );
    bridge
        .execute(start("Steve", Target::new("127.0.0.1", port).unwrap()))
        .await
        .unwrap();

    let mut conn = ServerConn::accept(&listener).await;
    conn.login().await;
    conn.send(Clientbound::SetHealth {
        health: 0.0,
        food: 20,
        saturation: 5.0,
    })
    .await;

    next_matching(&mut notifications, |n| {
        matches!(
            n,
            HostNotification::Game {
                event: GameEvent::Died,
                ..
            }
        )
    })
    .await;
    assert!(matches!(
        conn.recv().await,
        Serverbound::ClientStatus { .. }
    ));
}
