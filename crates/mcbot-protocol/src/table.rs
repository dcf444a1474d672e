//! Versioned packet-id tables.
//!
//! Packet ids are renumbered almost every release, so they live in data,
//! not in the packet enums. A [`PacketTable`] maps
//! `(state, direction, id) → kind` for decoding and the reverse for
//! encoding. Tables are built once and shared by every session through an
//! `Arc`; nothing mutates them afterwards.

use std::collections::HashMap;

use crate::{Direction, PacketKind, ProtocolState, PROTOCOL_VERSION_1_21};

/// A complete id mapping for one protocol version.
#[derive(Debug, Clone)]
pub struct PacketTable {
    protocol_version: i32,
    by_id: HashMap<(ProtocolState, Direction, i32), PacketKind>,
    by_kind: HashMap<(ProtocolState, Direction, PacketKind), i32>,
}

impl PacketTable {
    /// Starts an empty table for `protocol_version`.
    pub fn builder(protocol_version: i32) -> PacketTableBuilder {
        PacketTableBuilder {
            table: PacketTable {
                protocol_version,
                by_id: HashMap::new(),
                by_kind: HashMap::new(),
            },
        }
    }

    /// The table for Minecraft 1.21 (protocol 767).
    pub fn v1_21() -> Self {
        let mut builder = Self::builder(PROTOCOL_VERSION_1_21);
        for &(state, direction, id, kind) in V1_21 {
            builder = builder.register(state, direction, id, kind);
        }
        builder.build()
    }

    /// The protocol version sent in the handshake.
    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    /// Looks up what an incoming id means.
    pub fn kind_for(&self, state: ProtocolState, direction: Direction, id: i32) -> Option<PacketKind> {
        self.by_id.get(&(state, direction, id)).copied()
    }

    /// Looks up the id to send a packet kind with.
    pub fn id_for(&self, state: ProtocolState, direction: Direction, kind: PacketKind) -> Option<i32> {
        self.by_kind.get(&(state, direction, kind)).copied()
    }

    /// Number of registered `(state, direction, id)` entries.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for PacketTable {
    fn default() -> Self {
        Self::v1_21()
    }
}

/// Builder for [`PacketTable`].
pub struct PacketTableBuilder {
    table: PacketTable,
}

impl PacketTableBuilder {
    /// Maps `id` to `kind` in `state` for `direction`.
    ///
    /// A later registration for the same id (or the same kind) replaces
    /// the earlier one, with a warning.
    pub fn register(
        mut self,
        state: ProtocolState,
        direction: Direction,
        id: i32,
        kind: PacketKind,
    ) -> Self {
        if let Some(old) = self.table.by_id.insert((state, direction, id), kind) {
            tracing::warn!(%state, %direction, id, ?old, ?kind, "packet id registered twice, replacing");
            self.table.by_kind.remove(&(state, direction, old));
        }
        if let Some(old_id) = self.table.by_kind.insert((state, direction, kind), id) {
            if old_id != id {
                tracing::warn!(%state, %direction, ?kind, old_id, id, "packet kind registered twice, replacing");
                self.table.by_id.remove(&(state, direction, old_id));
            }
        }
        self
    }

    /// Finishes the table.
    pub fn build(self) -> PacketTable {
        self.table
    }
}

use Direction::{Clientbound as Cb, Serverbound as Sb};
use PacketKind as K;
use ProtocolState::{Configuration as Cfg, Handshake as Hs, Login, Play, Status};

/// Ids for protocol 767.
const V1_21: &[(ProtocolState, Direction, i32, PacketKind)] = &[
    (Hs, Sb, 0x00, K::Intention),
    // Status
    (Status, Sb, 0x00, K::StatusRequest),
    (Status, Sb, 0x01, K::PingRequest),
    (Status, Cb, 0x00, K::StatusResponse),
    (Status, Cb, 0x01, K::PongResponse),
    // Login
    (Login, Cb, 0x00, K::LoginDisconnect),
    (Login, Cb, 0x01, K::EncryptionRequest),
    (Login, Cb, 0x02, K::LoginSuccess),
    (Login, Cb, 0x03, K::SetCompression),
    (Login, Cb, 0x04, K::LoginPluginRequest),
    (Login, Cb, 0x05, K::CookieRequest),
    (Login, Sb, 0x00, K::LoginStart),
    (Login, Sb, 0x01, K::EncryptionResponse),
    (Login, Sb, 0x02, K::LoginPluginResponse),
    (Login, Sb, 0x03, K::LoginAcknowledged),
    (Login, Sb, 0x04, K::CookieResponse),
    // Configuration
    (Cfg, Cb, 0x00, K::CookieRequest),
    (Cfg, Cb, 0x01, K::PluginMessage),
    (Cfg, Cb, 0x02, K::Disconnect),
    (Cfg, Cb, 0x03, K::FinishConfiguration),
    (Cfg, Cb, 0x04, K::KeepAlive),
    (Cfg, Cb, 0x05, K::Ping),
    (Cfg, Cb, 0x06, K::ResetChat),
    (Cfg, Cb, 0x07, K::RegistryData),
    (Cfg, Cb, 0x08, K::RemoveResourcePack),
    (Cfg, Cb, 0x09, K::AddResourcePack),
    (Cfg, Cb, 0x0A, K::StoreCookie),
    (Cfg, Cb, 0x0B, K::Transfer),
    (Cfg, Cb, 0x0C, K::FeatureFlags),
    (Cfg, Cb, 0x0D, K::UpdateTags),
    (Cfg, Cb, 0x0E, K::KnownPacks),
    (Cfg, Cb, 0x0F, K::CustomReportDetails),
    (Cfg, Cb, 0x10, K::ServerLinks),
    (Cfg, Sb, 0x00, K::ClientInformation),
    (Cfg, Sb, 0x01, K::CookieResponse),
    (Cfg, Sb, 0x02, K::PluginMessage),
    (Cfg, Sb, 0x03, K::AcknowledgeFinishConfiguration),
    (Cfg, Sb, 0x04, K::KeepAlive),
    (Cfg, Sb, 0x05, K::Pong),
    (Cfg, Sb, 0x06, K::ResourcePackResponse),
    (Cfg, Sb, 0x07, K::KnownPacks),
    // Play
    (Play, Cb, 0x0C, K::ChunkBatchFinished),
    (Play, Cb, 0x1D, K::Disconnect),
    (Play, Cb, 0x26, K::KeepAlive),
    (Play, Cb, 0x2B, K::JoinGame),
    (Play, Cb, 0x35, K::Ping),
    (Play, Cb, 0x40, K::SynchronizePlayerPosition),
    (Play, Cb, 0x5D, K::SetHealth),
    (Play, Cb, 0x69, K::StartConfiguration),
    (Play, Cb, 0x6C, K::SystemChat),
    (Play, Sb, 0x00, K::ConfirmTeleportation),
    (Play, Sb, 0x04, K::ChatCommand),
    (Play, Sb, 0x06, K::ChatMessage),
    (Play, Sb, 0x08, K::ChunkBatchReceived),
    (Play, Sb, 0x09, K::ClientStatus),
    (Play, Sb, 0x0A, K::ClientInformation),
    (Play, Sb, 0x0C, K::AcknowledgeConfiguration),
    (Play, Sb, 0x12, K::PluginMessage),
    (Play, Sb, 0x18, K::KeepAlive),
    (Play, Sb, 0x1B, K::SetPlayerPositionAndRotation),
    (Play, Sb, 0x27, K::Pong),
];
