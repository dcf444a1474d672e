//! Session types: configuration, statistics, intents and events.
//!
//! A "session" is one bot logged in to one server. The task that drives it
//! lives in the driver module; this module holds the data that flows in and
//! out of that task:
//!
//! - [`SessionConfig`]: timeouts, limits and client settings.
//! - [`Intent`]: what the host wants the bot to do (chat, command, ...).
//! - [`SessionEvent`]: what happened (state changes, gameplay, warnings).
//! - [`SessionStats`] / [`SessionSnapshot`]: observable counters.

use std::time::{Duration, Instant};

use mcbot_protocol::{MAX_FRAME_LEN, ProtocolState, Serverbound};
use mcbot_transport::Target;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Identity;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
///
/// Shared by every session an engine starts. All fields have defaults, so
/// a config file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// TCP connect timeout.
    pub connect_timeout_secs: u64,

    /// Deadline for connect + Login + Configuration, counted from the
    /// moment the session task starts.
    pub handshake_timeout_secs: u64,

    /// In Play, a session that receives nothing for this long is dropped.
    pub read_timeout_secs: u64,

    /// How often the server is expected to send a keep-alive. The watchdog
    /// warns after twice this long without one.
    pub keep_alive_interval_secs: u64,

    /// Answering a keep-alive later than this is logged as a risk of being
    /// kicked.
    pub keep_alive_budget_ms: u64,

    /// Capacity of the per-session intent queue.
    pub outbound_queue: usize,

    /// Frame-size ceiling (never above the protocol maximum).
    pub max_frame_len: usize,

    /// Compressed frames at least this large are inflated on the blocking
    /// pool instead of the session task.
    pub offload_threshold: usize,

    /// Client locale sent in `ClientInformation`.
    pub locale: String,

    /// View distance sent in `ClientInformation`.
    pub view_distance: i8,

    /// Send a respawn request when health drops to zero.
    pub auto_respawn: bool,

    /// Trace every packet in and out.
    pub log_packets: bool,

    /// Client brand announced on `minecraft:brand`.
    pub brand: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            handshake_timeout_secs: 30,
            read_timeout_secs: 30,
            keep_alive_interval_secs: 20,
            keep_alive_budget_ms: 15_000,
            outbound_queue: 256,
            max_frame_len: MAX_FRAME_LEN,
            offload_threshold: 64 * 1024,
            locale: "en_us".into(),
            view_distance: 8,
            auto_respawn: true,
            log_packets: false,
            brand: "mcbot".into(),
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn keep_alive_budget(&self) -> Duration {
        Duration::from_millis(self.keep_alive_budget_ms)
    }
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// Something the host asks a session to do.
///
/// Intents queued before the session reaches Play are held and sent, in
/// order, once it does.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// A chat message (sent unsigned).
    Chat(String),
    /// A command, without the leading `/`.
    Command(String),
    /// Respawn after death.
    Respawn,
    /// Any serverbound Play packet.
    Packet(Serverbound),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Something a session reports to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    pub identity: Identity,
    /// Which run of the identity this came from. A reconnect starts a new
    /// session with a new id.
    pub session_id: u64,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// The protocol state changed. `reason` is set on `Disconnected`.
    StateChanged {
        state: ProtocolState,
        reason: Option<String>,
    },
    /// A gameplay event.
    Game(GameEvent),
    /// A process-level problem surfaced by this session (for example, the
    /// process ran out of sockets).
    ProcessWarning { message: String },
}

/// Gameplay happenings surfaced to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// The server accepted the login.
    LoginSuccess { username: String, uuid: Uuid },
    /// The bot spawned into a world.
    Joined { entity_id: i32 },
    /// A system or chat line, as plain text.
    Chat { message: String, overlay: bool },
    Health { health: f32, food: i32, saturation: f32 },
    Died,
    /// The server moved the bot.
    Position {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
    },
    /// The server sent the bot back to Configuration.
    Reconfiguring,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Last known position and rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

/// Counters a session publishes as it runs.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub packets_received: u64,
    pub packets_sent: u64,
    /// Packets with ids the table does not know, ignored in
    /// Configuration or Play.
    pub packets_discarded: u64,
    /// When the TCP connection came up.
    pub connected_at: Option<Instant>,
    pub last_keep_alive: Option<Instant>,
    /// Keep-alives answered after `keep_alive_budget_ms`.
    pub late_keep_alives: u64,
    pub entity_id: Option<i32>,
    pub position: Option<Position>,
    pub health: Option<f32>,
    pub food: Option<i32>,
    pub compression_threshold: Option<usize>,
    pub encrypted: bool,
    pub disconnect_reason: Option<String>,
}

impl SessionStats {
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.map(|at| at.elapsed())
    }
}

/// A serializable point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub identity: Identity,
    pub session_id: u64,
    pub target: String,
    pub state: ProtocolState,
    /// Human-readable uptime, e.g. `"3m 12s"`. Empty before connecting.
    pub uptime: String,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_discarded: u64,
    pub late_keep_alives: u64,
    pub entity_id: Option<i32>,
    pub position: Option<Position>,
    pub health: Option<f32>,
    pub food: Option<i32>,
    pub compressed: bool,
    pub encrypted: bool,
    pub disconnect_reason: Option<String>,
}

impl SessionSnapshot {
    pub(crate) fn new(
        identity: Identity,
        session_id: u64,
        target: &Target,
        state: ProtocolState,
        stats: &SessionStats,
    ) -> Self {
        Self {
            identity,
            session_id,
            target: target.to_string(),
            state,
            uptime: stats.uptime().map(format_uptime).unwrap_or_default(),
            packets_received: stats.packets_received,
            packets_sent: stats.packets_sent,
            packets_discarded: stats.packets_discarded,
            late_keep_alives: stats.late_keep_alives,
            entity_id: stats.entity_id,
            position: stats.position,
            health: stats.health,
            food: stats.food,
            compressed: stats.compression_threshold.is_some(),
            encrypted: stats.encrypted,
            disconnect_reason: stats.disconnect_reason.clone(),
        }
    }
}

/// Formats a duration as `"45s"`, `"3m 12s"` or `"2h 5m"`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
