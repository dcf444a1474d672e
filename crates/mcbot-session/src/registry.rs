//! The session registry: at most one live session per identity.
//!
//! The registry is the host-facing entry point for starting and stopping
//! bots. It wraps a [`SessionEngine`] and remembers the handle of every
//! session it started, keyed by [`Identity`].
//!
//! # Concurrency note
//!
//! The map sits behind one `tokio::sync::Mutex`, and `acquire` holds it
//! from lookup to insert. Two concurrent `acquire` calls for the same
//! identity therefore see each other: the second one gets the first one's
//! session.
//!
//! The lock is never held across a wait. When the previous session of an
//! identity is still shutting down, `acquire` unlocks, waits for it to
//! close, then locks again and looks at the slot afresh.
//!
//! Finished sessions are not removed eagerly. Every registry operation
//! first prunes handles whose state is Disconnected. A session's state
//! flips to Disconnected before its terminal event goes out, so a host
//! reacting to that event already sees the slot free.

use std::collections::HashMap;

use mcbot_protocol::ProtocolState;
use mcbot_transport::{Connector, TcpConnector, Target};
use tokio::sync::{Mutex, mpsc};

use crate::{AuthProvider, Identity, SessionEngine, SessionEvent, SessionHandle, SessionSnapshot};

/// Tracks the live session of every identity.
pub struct SessionRegistry<A, C = TcpConnector> {
    engine: SessionEngine<A, C>,
    sessions: Mutex<HashMap<Identity, SessionHandle>>,
    /// Every session the registry starts reports here.
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<A: AuthProvider, C: Connector> SessionRegistry<A, C> {
    /// Creates an empty registry whose sessions report to `events`.
    pub fn new(engine: SessionEngine<A, C>, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            engine,
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn engine(&self) -> &SessionEngine<A, C> {
        &self.engine
    }

    /// Returns the live session for `identity`, starting one if needed.
    ///
    /// A session that is still running is reused as is, even if `target`
    /// differs. A session that is shutting down is waited for before the
    /// new one starts, so two connections for one identity never overlap.
    pub async fn acquire(&self, identity: Identity, target: Target) -> SessionHandle {
        loop {
            match self.try_acquire(identity.clone(), target.clone()).await {
                Ok(handle) => return handle,
                Err(closing) => {
                    tracing::debug!(%identity, session = closing.session_id(), "waiting for previous session to close");
                    closing.closed().await;
                }
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but never waits.
    ///
    /// # Errors
    /// Returns the previous session's handle when it is still shutting
    /// down. Wait on [`SessionHandle::closed`] and try again.
    pub async fn try_acquire(
        &self,
        identity: Identity,
        target: Target,
    ) -> Result<SessionHandle, SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        prune(&mut sessions);

        if let Some(existing) = sessions.get(&identity) {
            if existing.is_closed() {
                return Err(existing.clone());
            }
            if existing.target() != &target {
                tracing::debug!(
                    %identity,
                    running = %existing.target(),
                    requested = %target,
                    "identity already connected elsewhere, reusing"
                );
            }
            return Ok(existing.clone());
        }

        let handle = self.engine.connect(target, identity.clone(), self.events.clone());
        tracing::info!(%identity, session = handle.session_id(), "session registered");
        sessions.insert(identity, handle.clone());
        Ok(handle)
    }

    /// Asks the session for `identity` to disconnect with `reason`.
    ///
    /// The entry stays until the session is Disconnected and the next
    /// operation prunes it. Returns `false` if there was no live session.
    pub async fn release(&self, identity: &Identity, reason: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        prune(&mut sessions);
        match sessions.get(identity) {
            Some(handle) if !handle.is_closed() => {
                handle.disconnect(reason);
                tracing::info!(%identity, %reason, "session released");
                true
            }
            _ => false,
        }
    }

    /// The session for `identity`, unless it has disconnected.
    pub async fn get(&self, identity: &Identity) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        prune(&mut sessions);
        sessions.get(identity).cloned()
    }

    /// Snapshots of every session that has not disconnected, by identity.
    pub async fn list_active(&self) -> Vec<SessionSnapshot> {
        let mut sessions = self.sessions.lock().await;
        prune(&mut sessions);
        let mut snapshots: Vec<_> = sessions.values().map(SessionHandle::snapshot).collect();
        snapshots.sort_by(|a, b| a.identity.cmp(&b.identity));
        snapshots
    }

    /// Disconnects every session and waits for all of them to finish.
    ///
    /// Returns how many sessions were asked to stop.
    pub async fn shutdown_all(&self, reason: &str) -> usize {
        let handles: Vec<SessionHandle> = {
            let mut sessions = self.sessions.lock().await;
            prune(&mut sessions);
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.disconnect(reason);
        }
        tracing::info!(count = handles.len(), %reason, "shutting down all sessions");
        for handle in &handles {
            handle.closed().await;
        }
        handles.len()
    }

    /// Number of sessions that have not disconnected.
    pub async fn len(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        prune(&mut sessions);
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drops handles of sessions that have reached Disconnected.
fn prune(sessions: &mut HashMap<Identity, SessionHandle>) {
    sessions.retain(|identity, handle| {
        let live = handle.state() != ProtocolState::Disconnected;
        if !live {
            tracing::debug!(%identity, session = handle.session_id(), "pruned finished session");
        }
        live
    });
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Registry tests run against a connector that never connects, so
    //! sessions stay in Handshake until told to stop and no network is
    //! involved.

    use std::collections::HashSet;
    use std::sync::Arc;

    use mcbot_transport::{Connection, TransportError};
    use tokio::io::DuplexStream;

    use super::*;
    use crate::{OfflineAuthProvider, SessionConfig};

    struct StalledConnector;

    impl Connector for StalledConnector {
        type Stream = DuplexStream;

        async fn connect(&self, _target: &Target) -> Result<Connection<DuplexStream>, TransportError> {
            std::future::pending().await
        }
    }

    fn registry() -> (
        SessionRegistry<OfflineAuthProvider, StalledConnector>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let engine = SessionEngine::new(OfflineAuthProvider, SessionConfig::default())
            .with_connector(StalledConnector);
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionRegistry::new(engine, tx), rx)
    }

    fn target() -> Target {
        Target::new("localhost", 25565).unwrap()
    }

    #[tokio::test]
    async fn test_acquire_same_identity_reuses_session() {
        let (registry, _events) = registry();
        let a = registry.acquire(Identity::new("Steve"), target()).await;
        let b = registry.acquire(Identity::new("Steve"), target()).await;
        let c = registry.acquire(Identity::new("Alex"), target()).await;

        assert_eq!(a.session_id(), b.session_id());
        assert_ne!(a.session_id(), c.session_id());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_acquire_concurrent_keeps_single_session() {
        let (registry, _events) = registry();
        let registry = Arc::new(registry);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry
                    .acquire(Identity::new("Steve"), target())
                    .await
                    .session_id()
            }));
        }
        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap());
        }

        assert_eq!(ids.len(), 1, "every caller must get the same session");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_release_then_acquire_starts_fresh_session() {
        let (registry, _events) = registry();
        let id = Identity::new("Steve");
        let first = registry.acquire(id.clone(), target()).await;

        assert!(registry.release(&id, "stopped by host").await);
        assert!(!registry.release(&id, "again").await, "already closing");

        let second = registry.acquire(id.clone(), target()).await;
        assert_eq!(first.state(), ProtocolState::Disconnected);
        assert_eq!(first.stats().disconnect_reason.as_deref(), Some("stopped by host"));
        assert_ne!(first.session_id(), second.session_id());
    }

    #[tokio::test]
    async fn test_try_acquire_closing_session_returns_previous_handle() {
        let (registry, _events) = registry();
        let id = Identity::new("Steve");
        let first = registry.acquire(id.clone(), target()).await;
        registry.release(&id, "stopped by host").await;

        // The session task has not run yet, so it is still shutting down.
        let closing = registry.try_acquire(id.clone(), target()).await.unwrap_err();
        assert_eq!(closing.session_id(), first.session_id());

        closing.closed().await;
        let second = registry.try_acquire(id, target()).await.unwrap();
        assert_ne!(second.session_id(), first.session_id());
    }

    #[tokio::test]
    async fn test_acquire_waiting_on_close_leaves_registry_usable() {
        let (registry, _events) = registry();
        let id = Identity::new("Steve");
        registry.acquire(Identity::new("Alex"), target()).await;
        let first = registry.acquire(id.clone(), target()).await;
        registry.release(&id, "stopped by host").await;

        // Poll the acquire once so it parks on the closing session.
        let mut acquire = std::pin::pin!(registry.acquire(id.clone(), target()));
        assert!(
            tokio::time::timeout(std::time::Duration::ZERO, &mut acquire)
                .await
                .is_err(),
            "previous session has not closed yet"
        );

        let list = tokio::time::timeout(std::time::Duration::from_secs(1), registry.list_active())
            .await
            .expect("list_active must not wait for another identity's close");
        assert!(list.iter().any(|s| s.identity.as_str() == "Alex"));
        assert!(registry.get(&Identity::new("Alex")).await.is_some());

        let second = acquire.await;
        assert_eq!(first.state(), ProtocolState::Disconnected);
        assert_ne!(second.session_id(), first.session_id());
    }

    #[tokio::test]
    async fn test_release_unknown_identity_returns_false() {
        let (registry, _events) = registry();
        assert!(!registry.release(&Identity::new("Nobody"), "x").await);
    }

    #[tokio::test]
    async fn test_get_prunes_disconnected_sessions() {
        let (registry, _events) = registry();
        let id = Identity::new("Steve");
        let handle = registry.acquire(id.clone(), target()).await;
        handle.disconnect("bye");
        handle.closed().await;

        assert!(registry.get(&id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_active_sorted_by_identity() {
        let (registry, _events) = registry();
        registry.acquire(Identity::new("Zed"), target()).await;
        registry.acquire(Identity::new("Alex"), target()).await;

        let list = registry.list_active().await;
        let names: Vec<_> = list.iter().map(|s| s.identity.as_str()).collect();
        assert_eq!(names, vec!["Alex", "Zed"]);
        assert!(list.iter().all(|s| s.state == ProtocolState::Handshake));
    }

    #[tokio::test]
    async fn test_shutdown_all_disconnects_everything() {
        let (registry, mut events) = registry();
        let a = registry.acquire(Identity::new("Alex"), target()).await;
        let b = registry.acquire(Identity::new("Steve"), target()).await;

        assert_eq!(registry.shutdown_all("server stopping").await, 2);
        assert_eq!(a.state(), ProtocolState::Disconnected);
        assert_eq!(b.state(), ProtocolState::Disconnected);
        assert!(registry.is_empty().await);

        // Stalled sessions never leave Handshake, so the only events are
        // the two terminal ones.
        for _ in 0..2 {
            match events.recv().await.unwrap().kind {
                crate::SessionEventKind::StateChanged { state, reason } => {
                    assert_eq!(state, ProtocolState::Disconnected);
                    assert_eq!(reason.as_deref(), Some("server stopping"));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_send_after_disconnect_returns_session_closed() {
        let (registry, _events) = registry();
        let handle = registry.acquire(Identity::new("Steve"), target()).await;
        handle.disconnect("bye");

        let result = handle.send(crate::Intent::Respawn);
        assert!(matches!(result, Err(crate::SessionError::SessionClosed(_))));
    }

    #[tokio::test]
    async fn test_send_before_play_fills_queue_then_backpressure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = SessionConfig {
            outbound_queue: 4,
            ..SessionConfig::default()
        };
        let engine = SessionEngine::new(OfflineAuthProvider, config).with_connector(StalledConnector);
        let handle = engine.connect(target(), Identity::new("Steve"), tx);

        for i in 0..4 {
            handle.send(crate::Intent::Chat(format!("hello {i}"))).unwrap();
        }
        let result = handle.send(crate::Intent::Chat("one too many".into()));
        assert!(matches!(
            result,
            Err(crate::SessionError::Backpressure { capacity: 4, .. })
        ));
    }
}
