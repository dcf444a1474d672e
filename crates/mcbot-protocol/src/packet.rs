//! Packet schemas.
//!
//! A packet on the wire is just `id + body`; what the id means depends on
//! the connection state and the protocol version. This module owns the
//! *bodies*: [`Clientbound`] and [`Serverbound`] enumerate every packet
//! the bot reads or writes, tagged by a version-independent
//! [`PacketKind`]. Mapping kinds to numeric ids is the job of the
//! [`PacketTable`](crate::PacketTable).
//!
//! Kinds with an identical body in several states share a variant
//! (`KeepAlive` exists in both Configuration and Play). Clientbound
//! packets the bot accepts but never inspects are kept as
//! [`Clientbound::Opaque`] with their raw body.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::buf::{
    MAX_STRING_CHARS, Wire, read_array, read_bool, read_byte_array, read_f32, read_f64,
    read_i8, read_i32, read_i64, read_rest, read_string, read_u8, read_u16, read_uuid,
    write_array, write_bool, write_byte_array, write_string, write_uuid,
};
use crate::text::Text;
use crate::varint::{read_varint, write_varint};
use crate::{Direction, NextState, ProtocolError};

/// Identifier strings (`namespace:path`) are capped at this length.
const MAX_IDENTIFIER: usize = 32767;

/// Version-independent name of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    // Handshake
    Intention,
    // Status
    StatusRequest,
    StatusResponse,
    PingRequest,
    PongResponse,
    // Login
    LoginStart,
    LoginDisconnect,
    EncryptionRequest,
    EncryptionResponse,
    LoginSuccess,
    SetCompression,
    LoginPluginRequest,
    LoginPluginResponse,
    LoginAcknowledged,
    CookieRequest,
    CookieResponse,
    // Configuration
    PluginMessage,
    Disconnect,
    FinishConfiguration,
    AcknowledgeFinishConfiguration,
    KeepAlive,
    Ping,
    Pong,
    ResetChat,
    RegistryData,
    RemoveResourcePack,
    AddResourcePack,
    ResourcePackResponse,
    StoreCookie,
    Transfer,
    FeatureFlags,
    UpdateTags,
    KnownPacks,
    CustomReportDetails,
    ServerLinks,
    ClientInformation,
    // Play
    JoinGame,
    ChunkBatchFinished,
    ChunkBatchReceived,
    SynchronizePlayerPosition,
    ConfirmTeleportation,
    SetPlayerPositionAndRotation,
    SetHealth,
    ClientStatus,
    StartConfiguration,
    AcknowledgeConfiguration,
    SystemChat,
    ChatCommand,
    ChatMessage,
}

/// One direction's set of packet bodies.
///
/// The codec is generic over this trait, so the bot decodes
/// [`Clientbound`] and encodes [`Serverbound`] while a test server does
/// the opposite with the same code.
pub trait Packet: Sized + Send + 'static {
    /// Which way packets of this type travel.
    const DIRECTION: Direction;

    /// The kind the packet table maps to an id.
    fn kind(&self) -> PacketKind;

    /// Writes the body (everything after the id).
    fn write_body(&self, buf: &mut BytesMut);

    /// Reads a body of the given kind.
    ///
    /// # Errors
    /// Any field-level [`ProtocolError`], or `InvalidMessage` if `kind`
    /// does not belong to this direction.
    fn read_body(kind: PacketKind, buf: &mut Bytes) -> Result<Self, ProtocolError>;
}

// ---------------------------------------------------------------------------
// Nested structures
// ---------------------------------------------------------------------------

/// A signed property attached to a game profile (usually `textures`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

impl Wire for ProfileProperty {
    fn write_to(&self, buf: &mut impl BufMut) {
        write_string(buf, &self.name);
        write_string(buf, &self.value);
        write_bool(buf, self.signature.is_some());
        if let Some(sig) = &self.signature {
            write_string(buf, sig);
        }
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        let name = read_string(buf, 64)?;
        let value = read_string(buf, MAX_STRING_CHARS)?;
        let signature = if read_bool(buf)? {
            Some(read_string(buf, 1024)?)
        } else {
            None
        };
        Ok(Self {
            name,
            value,
            signature,
        })
    }
}

/// A data pack both sides agree on during configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPack {
    pub namespace: String,
    pub id: String,
    pub version: String,
}

impl Wire for KnownPack {
    fn write_to(&self, buf: &mut impl BufMut) {
        write_string(buf, &self.namespace);
        write_string(buf, &self.id);
        write_string(buf, &self.version);
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Self {
            namespace: read_string(buf, MAX_STRING_CHARS)?,
            id: read_string(buf, MAX_STRING_CHARS)?,
            version: read_string(buf, MAX_STRING_CHARS)?,
        })
    }
}

struct Identifier(String);

impl Wire for Identifier {
    fn write_to(&self, buf: &mut impl BufMut) {
        write_string(buf, &self.0);
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        read_string(buf, MAX_IDENTIFIER).map(Self)
    }
}

/// Client settings, sent on entering Configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInformation {
    pub locale: String,
    pub view_distance: i8,
    /// 0 = full, 1 = commands only, 2 = hidden.
    pub chat_mode: i32,
    pub chat_colors: bool,
    /// Bit mask of visible skin layers.
    pub displayed_skin_parts: u8,
    /// 0 = left, 1 = right.
    pub main_hand: i32,
    pub enable_text_filtering: bool,
    pub allow_server_listings: bool,
}

impl Default for ClientInformation {
    fn default() -> Self {
        Self {
            locale: "en_us".into(),
            view_distance: 8,
            chat_mode: 0,
            chat_colors: true,
            displayed_skin_parts: 0x7F,
            main_hand: 1,
            enable_text_filtering: false,
            allow_server_listings: true,
        }
    }
}

impl Wire for ClientInformation {
    fn write_to(&self, buf: &mut impl BufMut) {
        write_string(buf, &self.locale);
        buf.put_i8(self.view_distance);
        write_varint(buf, self.chat_mode);
        write_bool(buf, self.chat_colors);
        buf.put_u8(self.displayed_skin_parts);
        write_varint(buf, self.main_hand);
        write_bool(buf, self.enable_text_filtering);
        write_bool(buf, self.allow_server_listings);
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Self {
            locale: read_string(buf, 16)?,
            view_distance: read_i8(buf)?,
            chat_mode: read_varint(buf)?,
            chat_colors: read_bool(buf)?,
            displayed_skin_parts: read_u8(buf)?,
            main_hand: read_varint(buf)?,
            enable_text_filtering: read_bool(buf)?,
            allow_server_listings: read_bool(buf)?,
        })
    }
}

/// Answer to an `AddResourcePack` offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePackResult {
    SuccessfullyLoaded,
    Declined,
    FailedDownload,
    Accepted,
    Downloaded,
    InvalidUrl,
    FailedReload,
    Discarded,
}

impl ResourcePackResult {
    fn id(self) -> i32 {
        match self {
            Self::SuccessfullyLoaded => 0,
            Self::Declined => 1,
            Self::FailedDownload => 2,
            Self::Accepted => 3,
            Self::Downloaded => 4,
            Self::InvalidUrl => 5,
            Self::FailedReload => 6,
            Self::Discarded => 7,
        }
    }

    fn from_id(id: i32) -> Result<Self, ProtocolError> {
        Ok(match id {
            0 => Self::SuccessfullyLoaded,
            1 => Self::Declined,
            2 => Self::FailedDownload,
            3 => Self::Accepted,
            4 => Self::Downloaded,
            5 => Self::InvalidUrl,
            6 => Self::FailedReload,
            7 => Self::Discarded,
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "unknown resource pack result {other}"
                )));
            }
        })
    }
}

/// Action field of `ClientStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatusAction {
    Respawn,
    RequestStats,
}

/// Flags of `SynchronizePlayerPosition`: which fields are relative.
pub mod teleport_flags {
    pub const X: u8 = 0x01;
    pub const Y: u8 = 0x02;
    pub const Z: u8 = 0x04;
    pub const YAW: u8 = 0x08;
    pub const PITCH: u8 = 0x10;
}

// ---------------------------------------------------------------------------
// Clientbound
// ---------------------------------------------------------------------------

/// Packets the server sends to the bot.
#[derive(Debug, Clone, PartialEq)]
pub enum Clientbound {
    StatusResponse {
        json: String,
    },
    PongResponse {
        payload: i64,
    },
    LoginDisconnect {
        reason: Text,
    },
    EncryptionRequest {
        server_id: String,
        public_key: Vec<u8>,
        verify_token: Vec<u8>,
        should_authenticate: bool,
    },
    LoginSuccess {
        uuid: Uuid,
        username: String,
        properties: Vec<ProfileProperty>,
        strict_error_handling: bool,
    },
    SetCompression {
        threshold: i32,
    },
    LoginPluginRequest {
        message_id: i32,
        channel: String,
        data: Bytes,
    },
    CookieRequest {
        key: String,
    },
    PluginMessage {
        channel: String,
        data: Bytes,
    },
    /// Configuration/Play disconnect (NBT reason).
    Disconnect {
        reason: Text,
    },
    FinishConfiguration,
    KeepAlive {
        id: i64,
    },
    Ping {
        id: i32,
    },
    AddResourcePack {
        uuid: Uuid,
        url: String,
        hash: String,
        forced: bool,
        prompt: Option<Text>,
    },
    FeatureFlags {
        flags: Vec<String>,
    },
    KnownPacks {
        packs: Vec<KnownPack>,
    },
    JoinGame {
        entity_id: i32,
        hardcore: bool,
        /// Dimension and world details the bot does not interpret.
        rest: Bytes,
    },
    ChunkBatchFinished {
        batch_size: i32,
    },
    SynchronizePlayerPosition {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        flags: u8,
        teleport_id: i32,
    },
    SetHealth {
        health: f32,
        food: i32,
        saturation: f32,
    },
    StartConfiguration,
    SystemChat {
        content: Text,
        overlay: bool,
    },
    /// A packet the table knows but the bot never inspects.
    Opaque {
        kind: PacketKind,
        data: Bytes,
    },
}

impl Packet for Clientbound {
    const DIRECTION: Direction = Direction::Clientbound;

    fn kind(&self) -> PacketKind {
        match self {
            Self::StatusResponse { .. } => PacketKind::StatusResponse,
            Self::PongResponse { .. } => PacketKind::PongResponse,
            Self::LoginDisconnect { .. } => PacketKind::LoginDisconnect,
            Self::EncryptionRequest { .. } => PacketKind::EncryptionRequest,
            Self::LoginSuccess { .. } => PacketKind::LoginSuccess,
            Self::SetCompression { .. } => PacketKind::SetCompression,
            Self::LoginPluginRequest { .. } => PacketKind::LoginPluginRequest,
            Self::CookieRequest { .. } => PacketKind::CookieRequest,
            Self::PluginMessage { .. } => PacketKind::PluginMessage,
            Self::Disconnect { .. } => PacketKind::Disconnect,
            Self::FinishConfiguration => PacketKind::FinishConfiguration,
            Self::KeepAlive { .. } => PacketKind::KeepAlive,
            Self::Ping { .. } => PacketKind::Ping,
            Self::AddResourcePack { .. } => PacketKind::AddResourcePack,
            Self::FeatureFlags { .. } => PacketKind::FeatureFlags,
            Self::KnownPacks { .. } => PacketKind::KnownPacks,
            Self::JoinGame { .. } => PacketKind::JoinGame,
            Self::ChunkBatchFinished { .. } => PacketKind::ChunkBatchFinished,
            Self::SynchronizePlayerPosition { .. } => PacketKind::SynchronizePlayerPosition,
            Self::SetHealth { .. } => PacketKind::SetHealth,
            Self::StartConfiguration => PacketKind::StartConfiguration,
            Self::SystemChat { .. } => PacketKind::SystemChat,
            Self::Opaque { kind, .. } => *kind,
        }
    }

    fn write_body(&self, buf: &mut BytesMut) {
        match self {
            Self::StatusResponse { json } => write_string(buf, json),
            Self::PongResponse { payload } => buf.put_i64(*payload),
            Self::LoginDisconnect { reason } => write_string(buf, &reason.to_json()),
            Self::EncryptionRequest {
                server_id,
                public_key,
                verify_token,
                should_authenticate,
            } => {
                write_string(buf, server_id);
                write_byte_array(buf, public_key);
                write_byte_array(buf, verify_token);
                write_bool(buf, *should_authenticate);
            }
            Self::LoginSuccess {
                uuid,
                username,
                properties,
                strict_error_handling,
            } => {
                write_uuid(buf, uuid);
                write_string(buf, username);
                write_array(buf, properties);
                write_bool(buf, *strict_error_handling);
            }
            Self::SetCompression { threshold } => write_varint(buf, *threshold),
            Self::LoginPluginRequest {
                message_id,
                channel,
                data,
            } => {
                write_varint(buf, *message_id);
                write_string(buf, channel);
                buf.put_slice(data);
            }
            Self::CookieRequest { key } => write_string(buf, key),
            Self::PluginMessage { channel, data } => {
                write_string(buf, channel);
                buf.put_slice(data);
            }
            Self::Disconnect { reason } => reason.write_nbt(buf),
            Self::FinishConfiguration | Self::StartConfiguration => {}
            Self::KeepAlive { id } => buf.put_i64(*id),
            Self::Ping { id } => buf.put_i32(*id),
            Self::AddResourcePack {
                uuid,
                url,
                hash,
                forced,
                prompt,
            } => {
                write_uuid(buf, uuid);
                write_string(buf, url);
                write_string(buf, hash);
                write_bool(buf, *forced);
                write_bool(buf, prompt.is_some());
                if let Some(prompt) = prompt {
                    prompt.write_nbt(buf);
                }
            }
            Self::FeatureFlags { flags } => {
                let ids: Vec<Identifier> = flags.iter().cloned().map(Identifier).collect();
                write_array(buf, &ids);
            }
            Self::KnownPacks { packs } => write_array(buf, packs),
            Self::JoinGame {
                entity_id,
                hardcore,
                rest,
            } => {
                buf.put_i32(*entity_id);
                write_bool(buf, *hardcore);
                buf.put_slice(rest);
            }
            Self::ChunkBatchFinished { batch_size } => write_varint(buf, *batch_size),
            Self::SynchronizePlayerPosition {
                x,
                y,
                z,
                yaw,
                pitch,
                flags,
                teleport_id,
            } => {
                buf.put_f64(*x);
                buf.put_f64(*y);
                buf.put_f64(*z);
                buf.put_f32(*yaw);
                buf.put_f32(*pitch);
                buf.put_u8(*flags);
                write_varint(buf, *teleport_id);
            }
            Self::SetHealth {
                health,
                food,
                saturation,
            } => {
                buf.put_f32(*health);
                write_varint(buf, *food);
                buf.put_f32(*saturation);
            }
            Self::SystemChat { content, overlay } => {
                content.write_nbt(buf);
                write_bool(buf, *overlay);
            }
            Self::Opaque { data, .. } => buf.put_slice(data),
        }
    }

    fn read_body(kind: PacketKind, buf: &mut Bytes) -> Result<Self, ProtocolError> {
        use PacketKind as K;
        let packet = match kind {
            K::StatusResponse => Self::StatusResponse {
                json: read_string(buf, MAX_STRING_CHARS)?,
            },
            K::PongResponse => Self::PongResponse {
                payload: read_i64(buf)?,
            },
            K::LoginDisconnect => Self::LoginDisconnect {
                reason: Text::from_json(&read_string(buf, 262_144)?)?,
            },
            K::EncryptionRequest => Self::EncryptionRequest {
                server_id: read_string(buf, 20)?,
                public_key: read_byte_array(buf)?,
                verify_token: read_byte_array(buf)?,
                should_authenticate: read_bool(buf)?,
            },
            K::LoginSuccess => Self::LoginSuccess {
                uuid: read_uuid(buf)?,
                username: read_string(buf, 16)?,
                properties: read_array(buf)?,
                strict_error_handling: read_bool(buf)?,
            },
            K::SetCompression => Self::SetCompression {
                threshold: read_varint(buf)?,
            },
            K::LoginPluginRequest => Self::LoginPluginRequest {
                message_id: read_varint(buf)?,
                channel: read_string(buf, MAX_IDENTIFIER)?,
                data: read_rest(buf),
            },
            K::CookieRequest => Self::CookieRequest {
                key: read_string(buf, MAX_IDENTIFIER)?,
            },
            K::PluginMessage => Self::PluginMessage {
                channel: read_string(buf, MAX_IDENTIFIER)?,
                data: read_rest(buf),
            },
            K::Disconnect => Self::Disconnect {
                reason: Text::read_nbt(buf)?,
            },
            K::FinishConfiguration => Self::FinishConfiguration,
            K::KeepAlive => Self::KeepAlive { id: read_i64(buf)? },
            K::Ping => Self::Ping { id: read_i32(buf)? },
            K::AddResourcePack => {
                let uuid = read_uuid(buf)?;
                let url = read_string(buf, MAX_STRING_CHARS)?;
                let hash = read_string(buf, 40)?;
                let forced = read_bool(buf)?;
                let prompt = if read_bool(buf)? {
                    Some(Text::read_nbt(buf)?)
                } else {
                    None
                };
                Self::AddResourcePack {
                    uuid,
                    url,
                    hash,
                    forced,
                    prompt,
                }
            }
            K::FeatureFlags => Self::FeatureFlags {
                flags: read_array::<Identifier>(buf)?.into_iter().map(|i| i.0).collect(),
            },
            K::KnownPacks => Self::KnownPacks {
                packs: read_array(buf)?,
            },
            K::JoinGame => Self::JoinGame {
                entity_id: read_i32(buf)?,
                hardcore: read_bool(buf)?,
                rest: read_rest(buf),
            },
            K::ChunkBatchFinished => Self::ChunkBatchFinished {
                batch_size: read_varint(buf)?,
            },
            K::SynchronizePlayerPosition => Self::SynchronizePlayerPosition {
                x: read_f64(buf)?,
                y: read_f64(buf)?,
                z: read_f64(buf)?,
                yaw: read_f32(buf)?,
                pitch: read_f32(buf)?,
                flags: read_u8(buf)?,
                teleport_id: read_varint(buf)?,
            },
            K::SetHealth => Self::SetHealth {
                health: read_f32(buf)?,
                food: read_varint(buf)?,
                saturation: read_f32(buf)?,
            },
            K::StartConfiguration => Self::StartConfiguration,
            K::SystemChat => Self::SystemChat {
                content: Text::read_nbt(buf)?,
                overlay: read_bool(buf)?,
            },
            K::ResetChat
            | K::RegistryData
            | K::RemoveResourcePack
            | K::StoreCookie
            | K::Transfer
            | K::UpdateTags
            | K::CustomReportDetails
            | K::ServerLinks => Self::Opaque {
                kind,
                data: read_rest(buf),
            },
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{other:?} is not a clientbound packet"
                )));
            }
        };
        Ok(packet)
    }
}

// ---------------------------------------------------------------------------
// Serverbound
// ---------------------------------------------------------------------------

/// Packets the bot sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Serverbound {
    Intention {
        protocol_version: i32,
        host: String,
        port: u16,
        next: NextState,
    },
    StatusRequest,
    PingRequest {
        payload: i64,
    },
    LoginStart {
        name: String,
        uuid: Uuid,
    },
    EncryptionResponse {
        shared_secret: Vec<u8>,
        verify_token: Vec<u8>,
    },
    /// `data: None` means "not understood".
    LoginPluginResponse {
        message_id: i32,
        data: Option<Bytes>,
    },
    LoginAcknowledged,
    CookieResponse {
        key: String,
        payload: Option<Vec<u8>>,
    },
    ClientInformation(ClientInformation),
    PluginMessage {
        channel: String,
        data: Bytes,
    },
    AcknowledgeFinishConfiguration,
    KeepAlive {
        id: i64,
    },
    Pong {
        id: i32,
    },
    ResourcePackResponse {
        uuid: Uuid,
        result: ResourcePackResult,
    },
    KnownPacks {
        packs: Vec<KnownPack>,
    },
    ConfirmTeleportation {
        teleport_id: i32,
    },
    ChatCommand {
        command: String,
    },
    /// Unsigned chat: no signature and an empty acknowledgement set.
    ChatMessage {
        message: String,
        timestamp: i64,
        salt: i64,
    },
    ChunkBatchReceived {
        chunks_per_tick: f32,
    },
    ClientStatus {
        action: ClientStatusAction,
    },
    AcknowledgeConfiguration,
    SetPlayerPositionAndRotation {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
}

impl Packet for Serverbound {
    const DIRECTION: Direction = Direction::Serverbound;

    fn kind(&self) -> PacketKind {
        match self {
            Self::Intention { .. } => PacketKind::Intention,
            Self::StatusRequest => PacketKind::StatusRequest,
            Self::PingRequest { .. } => PacketKind::PingRequest,
            Self::LoginStart { .. } => PacketKind::LoginStart,
            Self::EncryptionResponse { .. } => PacketKind::EncryptionResponse,
            Self::LoginPluginResponse { .. } => PacketKind::LoginPluginResponse,
            Self::LoginAcknowledged => PacketKind::LoginAcknowledged,
            Self::CookieResponse { .. } => PacketKind::CookieResponse,
            Self::ClientInformation(_) => PacketKind::ClientInformation,
            Self::PluginMessage { .. } => PacketKind::PluginMessage,
            Self::AcknowledgeFinishConfiguration => PacketKind::AcknowledgeFinishConfiguration,
            Self::KeepAlive { .. } => PacketKind::KeepAlive,
            Self::Pong { .. } => PacketKind::Pong,
            Self::ResourcePackResponse { .. } => PacketKind::ResourcePackResponse,
            Self::KnownPacks { .. } => PacketKind::KnownPacks,
            Self::ConfirmTeleportation { .. } => PacketKind::ConfirmTeleportation,
            Self::ChatCommand { .. } => PacketKind::ChatCommand,
            Self::ChatMessage { .. } => PacketKind::ChatMessage,
            Self::ChunkBatchReceived { .. } => PacketKind::ChunkBatchReceived,
            Self::ClientStatus { .. } => PacketKind::ClientStatus,
            Self::AcknowledgeConfiguration => PacketKind::AcknowledgeConfiguration,
            Self::SetPlayerPositionAndRotation { .. } => PacketKind::SetPlayerPositionAndRotation,
        }
    }

    fn write_body(&self, buf: &mut BytesMut) {
        match self {
            Self::Intention {
                protocol_version,
                host,
                port,
                next,
            } => {
                write_varint(buf, *protocol_version);
                write_string(buf, host);
                buf.put_u16(*port);
                write_varint(buf, next.id());
            }
            Self::StatusRequest
            | Self::LoginAcknowledged
            | Self::AcknowledgeFinishConfiguration
            | Self::AcknowledgeConfiguration => {}
            Self::PingRequest { payload } => buf.put_i64(*payload),
            Self::LoginStart { name, uuid } => {
                write_string(buf, name);
                write_uuid(buf, uuid);
            }
            Self::EncryptionResponse {
                shared_secret,
                verify_token,
            } => {
                write_byte_array(buf, shared_secret);
                write_byte_array(buf, verify_token);
            }
            Self::LoginPluginResponse { message_id, data } => {
                write_varint(buf, *message_id);
                write_bool(buf, data.is_some());
                if let Some(data) = data {
                    buf.put_slice(data);
                }
            }
            Self::CookieResponse { key, payload } => {
                write_string(buf, key);
                write_bool(buf, payload.is_some());
                if let Some(payload) = payload {
                    write_byte_array(buf, payload);
                }
            }
            Self::ClientInformation(info) => info.write_to(buf),
            Self::PluginMessage { channel, data } => {
                write_string(buf, channel);
                buf.put_slice(data);
            }
            Self::KeepAlive { id } => buf.put_i64(*id),
            Self::Pong { id } => buf.put_i32(*id),
            Self::ResourcePackResponse { uuid, result } => {
                write_uuid(buf, uuid);
                write_varint(buf, result.id());
            }
            Self::KnownPacks { packs } => write_array(buf, packs),
            Self::ConfirmTeleportation { teleport_id } => write_varint(buf, *teleport_id),
            Self::ChatCommand { command } => write_string(buf, command),
            Self::ChatMessage {
                message,
                timestamp,
                salt,
            } => {
                write_string(buf, message);
                buf.put_i64(*timestamp);
                buf.put_i64(*salt);
                write_bool(buf, false);
                write_varint(buf, 0);
                // 20-bit acknowledged set, all clear.
                buf.put_slice(&[0, 0, 0]);
            }
            Self::ChunkBatchReceived { chunks_per_tick } => buf.put_f32(*chunks_per_tick),
            Self::ClientStatus { action } => write_varint(
                buf,
                match action {
                    ClientStatusAction::Respawn => 0,
                    ClientStatusAction::RequestStats => 1,
                },
            ),
            Self::SetPlayerPositionAndRotation {
                x,
                y,
                z,
                yaw,
                pitch,
                on_ground,
            } => {
                buf.put_f64(*x);
                buf.put_f64(*y);
                buf.put_f64(*z);
                buf.put_f32(*yaw);
                buf.put_f32(*pitch);
                write_bool(buf, *on_ground);
            }
        }
    }

    fn read_body(kind: PacketKind, buf: &mut Bytes) -> Result<Self, ProtocolError> {
        use PacketKind as K;
        let packet = match kind {
            K::Intention => {
                let protocol_version = read_varint(buf)?;
                let host = read_string(buf, 255)?;
                let port = read_u16(buf)?;
                let next_id = read_varint(buf)?;
                let next = NextState::from_id(next_id).ok_or_else(|| {
                    ProtocolError::InvalidMessage(format!("invalid next state {next_id}"))
                })?;
                Self::Intention {
                    protocol_version,
                    host,
                    port,
                    next,
                }
            }
            K::StatusRequest => Self::StatusRequest,
            K::PingRequest => Self::PingRequest {
                payload: read_i64(buf)?,
            },
            K::LoginStart => Self::LoginStart {
                name: read_string(buf, 16)?,
                uuid: read_uuid(buf)?,
            },
            K::EncryptionResponse => Self::EncryptionResponse {
                shared_secret: read_byte_array(buf)?,
                verify_token: read_byte_array(buf)?,
            },
            K::LoginPluginResponse => {
                let message_id = read_varint(buf)?;
                let data = if read_bool(buf)? {
                    Some(read_rest(buf))
                } else {
                    None
                };
                Self::LoginPluginResponse { message_id, data }
            }
            K::LoginAcknowledged => Self::LoginAcknowledged,
            K::CookieResponse => {
                let key = read_string(buf, MAX_IDENTIFIER)?;
                let payload = if read_bool(buf)? {
                    Some(read_byte_array(buf)?)
                } else {
                    None
                };
                Self::CookieResponse { key, payload }
            }
            K::ClientInformation => Self::ClientInformation(ClientInformation::read_from(buf)?),
            K::PluginMessage => Self::PluginMessage {
                channel: read_string(buf, MAX_IDENTIFIER)?,
                data: read_rest(buf),
            },
            K::AcknowledgeFinishConfiguration => Self::AcknowledgeFinishConfiguration,
            K::KeepAlive => Self::KeepAlive { id: read_i64(buf)? },
            K::Pong => Self::Pong { id: read_i32(buf)? },
            K::ResourcePackResponse => Self::ResourcePackResponse {
                uuid: read_uuid(buf)?,
                result: ResourcePackResult::from_id(read_varint(buf)?)?,
            },
            K::KnownPacks => Self::KnownPacks {
                packs: read_array(buf)?,
            },
            K::ConfirmTeleportation => Self::ConfirmTeleportation {
                teleport_id: read_varint(buf)?,
            },
            K::ChatCommand => Self::ChatCommand {
                command: read_string(buf, MAX_STRING_CHARS)?,
            },
            K::ChatMessage => {
                let message = read_string(buf, 256)?;
                let timestamp = read_i64(buf)?;
                let salt = read_i64(buf)?;
                if read_bool(buf)? {
                    return Err(ProtocolError::InvalidMessage(
                        "signed chat is not supported".into(),
                    ));
                }
                let _message_count = read_varint(buf)?;
                crate::buf::ensure(buf, 3)?;
                buf.advance(3);
                Self::ChatMessage {
                    message,
                    timestamp,
                    salt,
                }
            }
            K::ChunkBatchReceived => Self::ChunkBatchReceived {
                chunks_per_tick: read_f32(buf)?,
            },
            K::ClientStatus => Self::ClientStatus {
                action: match read_varint(buf)? {
                    0 => ClientStatusAction::Respawn,
                    1 => ClientStatusAction::RequestStats,
                    other => {
                        return Err(ProtocolError::InvalidMessage(format!(
                            "unknown client status action {other}"
                        )));
                    }
                },
            },
            K::AcknowledgeConfiguration => Self::AcknowledgeConfiguration,
            K::SetPlayerPositionAndRotation => Self::SetPlayerPositionAndRotation {
                x: read_f64(buf)?,
                y: read_f64(buf)?,
                z: read_f64(buf)?,
                yaw: read_f32(buf)?,
                pitch: read_f32(buf)?,
                on_ground: read_bool(buf)?,
            },
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{other:?} is not a serverbound packet"
                )));
            }
        };
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip<P: Packet + PartialEq + std::fmt::Debug>(packet: P) {
        let mut buf = BytesMut::new();
        packet.write_body(&mut buf);
        let mut body = buf.freeze();
        let decoded = P::read_body(packet.kind(), &mut body).unwrap();
        assert_eq!(decoded, packet);
        assert!(!body.has_remaining(), "{:?} left trailing bytes", packet.kind());
    }

    #[test]
    fn test_clientbound_schemas_round_trip() {
        let packets = vec![
            Clientbound::StatusResponse {
                json: r#"{"version":{"name":"1.21","protocol":767}}"#.into(),
            },
            Clientbound::PongResponse { payload: -7 },
            Clientbound::LoginDisconnect {
                reason: Text::from_value(json!({"text": "whitelist"})),
            },
            Clientbound::EncryptionRequest {
                server_id: String::new(),
                public_key: vec![1, 2, 3],
                verify_token: vec![9, 9, 9, 9],
                should_authenticate: true,
            },
            Clientbound::LoginSuccess {
                uuid: Uuid::from_u128(42),
                username: "Steve".into(),
                properties: vec![ProfileProperty {
                    name: "textures".into(),
                    value: "e30=".into(),
                    signature: Some("sig".into()),
                }],
                strict_error_handling: false,
            },
            Clientbound::SetCompression { threshold: 256 },
            Clientbound::LoginPluginRequest {
                message_id: 3,
                channel: "velocity:player_info".into(),
                data: Bytes::from_static(&[1]),
            },
            Clientbound::CookieRequest {
                key: "minecraft:session".into(),
            },
            Clientbound::PluginMessage {
                channel: "minecraft:brand".into(),
                data: Bytes::from_static(b"\x07vanilla"),
            },
            Clientbound::Disconnect {
                reason: Text::plain("bye"),
            },
            Clientbound::FinishConfiguration,
            Clientbound::KeepAlive { id: i64::MIN },
            Clientbound::Ping { id: 12 },
            Clientbound::AddResourcePack {
                uuid: Uuid::from_u128(7),
                url: "https://example.net/pack.zip".into(),
                hash: "0".repeat(40),
                forced: true,
                prompt: Some(Text::plain("please")),
            },
            Clientbound::FeatureFlags {
                flags: vec!["minecraft:vanilla".into()],
            },
            Clientbound::KnownPacks {
                packs: vec![KnownPack {
                    namespace: "minecraft".into(),
                    id: "core".into(),
                    version: "1.21".into(),
                }],
            },
            Clientbound::JoinGame {
                entity_id: 1001,
                hardcore: false,
                rest: Bytes::from_static(&[0, 1, 2]),
            },
            Clientbound::ChunkBatchFinished { batch_size: 25 },
            Clientbound::SynchronizePlayerPosition {
                x: 0.5,
                y: 64.0,
                z: -12.25,
                yaw: 90.0,
                pitch: 0.0,
                flags: teleport_flags::YAW,
                teleport_id: 1,
            },
            Clientbound::SetHealth {
                health: 20.0,
                food: 20,
                saturation: 5.0,
            },
            Clientbound::StartConfiguration,
            Clientbound::SystemChat {
                content: Text::plain("[Server] hello"),
                overlay: false,
            },
            Clientbound::Opaque {
                kind: PacketKind::RegistryData,
                data: Bytes::from_static(&[0xCA, 0xFE]),
            },
        ];
        for packet in packets {
            round_trip(packet);
        }
    }

    #[test]
    fn test_serverbound_schemas_round_trip() {
        let packets = vec![
            Serverbound::Intention {
                protocol_version: 767,
                host: "localhost".into(),
                port: 25565,
                next: NextState::Login,
            },
            Serverbound::StatusRequest,
            Serverbound::PingRequest { payload: 99 },
            Serverbound::LoginStart {
                name: "bot_01".into(),
                uuid: Uuid::from_u128(1),
            },
            Serverbound::EncryptionResponse {
                shared_secret: vec![0; 128],
                verify_token: vec![1; 128],
            },
            Serverbound::LoginPluginResponse {
                message_id: 3,
                data: None,
            },
            Serverbound::LoginAcknowledged,
            Serverbound::CookieResponse {
                key: "minecraft:session".into(),
                payload: None,
            },
            Serverbound::ClientInformation(ClientInformation::default()),
            Serverbound::PluginMessage {
                channel: "minecraft:brand".into(),
                data: Bytes::from_static(b"\x05mcbot"),
            },
            Serverbound::AcknowledgeFinishConfiguration,
            Serverbound::KeepAlive { id: 123_456_789 },
            Serverbound::Pong { id: -3 },
            Serverbound::ResourcePackResponse {
                uuid: Uuid::from_u128(7),
                result: ResourcePackResult::Accepted,
            },
            Serverbound::KnownPacks { packs: vec![] },
            Serverbound::ConfirmTeleportation { teleport_id: 1 },
            Serverbound::ChatCommand {
                command: "spawn".into(),
            },
            Serverbound::ChatMessage {
                message: "hello".into(),
                timestamp: 1_700_000_000_000,
                salt: 42,
            },
            Serverbound::ChunkBatchReceived {
                chunks_per_tick: 9.0,
            },
            Serverbound::ClientStatus {
                action: ClientStatusAction::Respawn,
            },
            Serverbound::AcknowledgeConfiguration,
            Serverbound::SetPlayerPositionAndRotation {
                x: 1.0,
                y: 2.0,
                z: 3.0,
                yaw: 4.0,
                pitch: 5.0,
                on_ground: true,
            },
        ];
        for packet in packets {
            round_trip(packet);
        }
    }

    #[test]
    fn test_read_body_wrong_direction_rejected() {
        let mut body = Bytes::new();
        let result = Clientbound::read_body(PacketKind::LoginStart, &mut body);
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));

        let mut body = Bytes::new();
        let result = Serverbound::read_body(PacketKind::JoinGame, &mut body);
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_read_body_truncated_keep_alive_rejected() {
        let mut body = Bytes::from_static(&[0, 0, 0]);
        let result = Clientbound::read_body(PacketKind::KeepAlive, &mut body);
        assert!(matches!(result, Err(ProtocolError::BufferTooShort { .. })));
    }
}
