//! Core protocol types: connection states and packet direction.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The protocol version of the default packet table (Minecraft 1.21).
pub const PROTOCOL_VERSION_1_21: i32 = 767;

// ---------------------------------------------------------------------------
// ProtocolState
// ---------------------------------------------------------------------------

/// The phase a connection is in. Packet ids only mean something relative
/// to the current state.
///
/// ```text
/// Handshake ──→ Status
///     │
///     └──────→ Login ──→ Configuration ⇄ Play
///
///   (any state) ──→ Disconnected   (terminal)
/// ```
///
/// The only backwards edge is Play → Configuration, which the server
/// triggers to push new registries mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    Handshake,
    Status,
    Login,
    Configuration,
    Play,
    Disconnected,
}

impl ProtocolState {
    /// Returns `true` if the connection has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` if `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: ProtocolState) -> bool {
        use ProtocolState::*;
        match (self, next) {
            (Disconnected, _) => false,
            (_, Disconnected) => true,
            (Handshake, Status) | (Handshake, Login) => true,
            (Login, Configuration) => true,
            (Configuration, Play) | (Play, Configuration) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::Status => "status",
            Self::Login => "login",
            Self::Configuration => "configuration",
            Self::Play => "play",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way a packet travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Server → bot.
    Clientbound,
    /// Bot → server.
    Serverbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clientbound => f.write_str("clientbound"),
            Self::Serverbound => f.write_str("serverbound"),
        }
    }
}

// ---------------------------------------------------------------------------
// NextState
// ---------------------------------------------------------------------------

/// The `next_state` field of the handshake intention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
    Transfer,
}

impl NextState {
    /// The wire value.
    pub fn id(self) -> i32 {
        match self {
            Self::Status => 1,
            Self::Login => 2,
            Self::Transfer => 3,
        }
    }

    /// Parses the wire value.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Self::Status),
            2 => Some(Self::Login),
            3 => Some(Self::Transfer),
            _ => None,
        }
    }

    /// The state the connection enters after the handshake.
    pub fn state(self) -> ProtocolState {
        match self {
            Self::Status => ProtocolState::Status,
            Self::Login | Self::Transfer => ProtocolState::Login,
        }
    }
}
