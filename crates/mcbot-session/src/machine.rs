//! The protocol state machine.
//!
//! [`ProtocolMachine`] knows what a well-behaved client answers to each
//! server packet, and nothing else: it never touches a socket, a cipher or
//! a clock. The driver feeds it decoded packets and executes the
//! [`Action`]s it returns, in order.
//!
//! ```text
//! Handshake ─(Intention)─→ Login ─(LoginSuccess)─→ Configuration ─(Finish)─→ Play
//!                                                        ↑                      │
//!                                                        └─(StartConfiguration)─┘
//! ```
//!
//! Keeping the rules pure makes every edge of the login dance testable
//! without a server.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use mcbot_protocol::buf::write_string;
use mcbot_protocol::{
    ClientInformation, ClientStatusAction, Clientbound, NextState, Packet, ProtocolState,
    ResourcePackResult, Serverbound, strip_legacy_codes, teleport_flags,
};
use rand::Rng;

use crate::session::Position;
use crate::{EncryptionChallenge, EncryptionMaterial, GameEvent, Intent, Profile};

/// Longest chat message the server accepts.
const MAX_CHAT_LEN: usize = 256;

/// Chunk rate reported in `ChunkBatchReceived`.
const CHUNKS_PER_TICK: f32 = 20.0;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One step the driver must take, in the order returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Encode and write a packet in the current wire state.
    Send(Serverbound),
    /// Switch the wire state. Later sends and decodes use the new state.
    Transition(ProtocolState),
    /// Apply a compression threshold (negative disables).
    SetCompression(i32),
    /// Ask the auth provider to answer the challenge, off the loop.
    BeginEncryption(EncryptionChallenge),
    /// Install the cipher in both directions.
    EnableEncryption([u8; 16]),
    /// Surface a gameplay event to the host.
    Event(GameEvent),
    /// End the session with this reason.
    Disconnect(String),
}

// ---------------------------------------------------------------------------
// ConfigurationFlow
// ---------------------------------------------------------------------------

/// Answers Configuration-state packets that need an acknowledgment.
///
/// Keep-alive, ping and `FinishConfiguration` are handled by the machine;
/// everything else arriving in Configuration is offered here. An empty
/// answer means the packet is accepted silently.
pub trait ConfigurationFlow: Send + Sync + 'static {
    fn respond(&self, packet: &Clientbound) -> Vec<Serverbound>;
}

/// What a vanilla client with no extra content answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct VanillaConfigurationFlow;

impl ConfigurationFlow for VanillaConfigurationFlow {
    fn respond(&self, packet: &Clientbound) -> Vec<Serverbound> {
        match packet {
            // Claiming no packs makes the server send the full registries.
            Clientbound::KnownPacks { .. } => vec![Serverbound::KnownPacks { packs: Vec::new() }],
            Clientbound::AddResourcePack { uuid, .. } => vec![
                Serverbound::ResourcePackResponse {
                    uuid: *uuid,
                    result: ResourcePackResult::Accepted,
                },
                Serverbound::ResourcePackResponse {
                    uuid: *uuid,
                    result: ResourcePackResult::SuccessfullyLoaded,
                },
            ],
            Clientbound::CookieRequest { key } => vec![Serverbound::CookieResponse {
                key: key.clone(),
                payload: None,
            }],
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProtocolMachine
// ---------------------------------------------------------------------------

/// Client settings the machine needs.
#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub protocol_version: i32,
    /// Host and port as sent in `Intention`.
    pub host: String,
    pub port: u16,
    pub brand: String,
    pub client_information: ClientInformation,
    pub auto_respawn: bool,
}

/// Login-to-Play rules for one session.
pub struct ProtocolMachine {
    state: ProtocolState,
    settings: MachineSettings,
    profile: Profile,
    flow: Arc<dyn ConfigurationFlow>,
    position: Position,
    dead: bool,
}

impl ProtocolMachine {
    pub fn new(settings: MachineSettings, profile: Profile, flow: Arc<dyn ConfigurationFlow>) -> Self {
        Self {
            state: ProtocolState::Handshake,
            settings,
            profile,
            flow,
            position: Position::default(),
            dead: false,
        }
    }

    /// The state after every action returned so far has been applied.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Opens the connection: handshake into Login and start logging in.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::Send(Serverbound::Intention {
            protocol_version: self.settings.protocol_version,
            host: self.settings.host.clone(),
            port: self.settings.port,
            next: NextState::Login,
        })];
        self.transition(ProtocolState::Login, &mut actions);
        actions.push(Action::Send(Serverbound::LoginStart {
            name: self.profile.name.clone(),
            uuid: self.profile.uuid,
        }));
        actions
    }

    /// Finishes the encryption handshake once the provider has answered.
    ///
    /// The response goes out in the clear; everything after it is
    /// encrypted.
    pub fn encryption_ready(&mut self, material: EncryptionMaterial) -> Vec<Action> {
        vec![
            Action::Send(Serverbound::EncryptionResponse {
                shared_secret: material.encrypted_shared_secret,
                verify_token: material.encrypted_verify_token,
            }),
            Action::EnableEncryption(material.shared_secret),
        ]
    }

    /// Reacts to a packet id the table does not know in the current state.
    ///
    /// Before Configuration the login dance cannot recover from surprises,
    /// so the session ends. Later, unknown packets are gameplay the bot
    /// does not model and are dropped (an empty result).
    pub fn handle_unknown(&mut self, id: i32) -> Vec<Action> {
        match self.state {
            ProtocolState::Handshake | ProtocolState::Login | ProtocolState::Status => {
                let reason = format!("protocol error: unexpected packet 0x{id:02X} in {}", self.state);
                self.disconnect(reason)
            }
            _ => Vec::new(),
        }
    }

    /// Reacts to one decoded server packet.
    pub fn handle(&mut self, packet: Clientbound) -> Vec<Action> {
        match self.state {
            ProtocolState::Login => self.handle_login(packet),
            ProtocolState::Configuration => self.handle_configuration(packet),
            ProtocolState::Play => self.handle_play(packet),
            ProtocolState::Disconnected => Vec::new(),
            state => self.disconnect(format!(
                "protocol error: unexpected {:?} in {state}",
                packet.kind()
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Per-state rules
    // -----------------------------------------------------------------------

    fn handle_login(&mut self, packet: Clientbound) -> Vec<Action> {
        match packet {
            Clientbound::EncryptionRequest {
                server_id,
                public_key,
                verify_token,
                should_authenticate,
            } => vec![Action::BeginEncryption(EncryptionChallenge {
                server_id,
                public_key,
                verify_token,
                should_authenticate,
            })],
            Clientbound::SetCompression { threshold } => vec![Action::SetCompression(threshold)],
            // Proxies poke clients with plugin requests; "not understood" is a
            // valid answer and the only one that never hangs the login.
            Clientbound::LoginPluginRequest { message_id, .. } => {
                vec![Action::Send(Serverbound::LoginPluginResponse {
                    message_id,
                    data: None,
                })]
            }
            Clientbound::CookieRequest { key } => {
                vec![Action::Send(Serverbound::CookieResponse { key, payload: None })]
            }
            Clientbound::LoginSuccess { uuid, username, .. } => {
                let mut actions = vec![Action::Send(Serverbound::LoginAcknowledged)];
                self.transition(ProtocolState::Configuration, &mut actions);
                actions.push(Action::Event(GameEvent::LoginSuccess { username, uuid }));
                actions.push(Action::Send(self.brand_packet()));
                actions.push(Action::Send(Serverbound::ClientInformation(
                    self.settings.client_information.clone(),
                )));
                actions
            }
            Clientbound::LoginDisconnect { reason } => self.disconnect(reason.to_plain()),
            other => self.disconnect(format!(
                "protocol error: unexpected {:?} in login",
                other.kind()
            )),
        }
    }

    fn handle_configuration(&mut self, packet: Clientbound) -> Vec<Action> {
        match packet {
            Clientbound::KeepAlive { id } => vec![Action::Send(Serverbound::KeepAlive { id })],
            Clientbound::Ping { id } => vec![Action::Send(Serverbound::Pong { id })],
            Clientbound::Disconnect { reason } => self.disconnect(reason.to_plain()),
            Clientbound::FinishConfiguration => {
                let mut actions = vec![Action::Send(Serverbound::AcknowledgeFinishConfiguration)];
                self.transition(ProtocolState::Play, &mut actions);
                actions
            }
            other => self.flow.respond(&other).into_iter().map(Action::Send).collect(),
        }
    }

    fn handle_play(&mut self, packet: Clientbound) -> Vec<Action> {
        match packet {
            Clientbound::KeepAlive { id } => vec![Action::Send(Serverbound::KeepAlive { id })],
            Clientbound::Ping { id } => vec![Action::Send(Serverbound::Pong { id })],
            Clientbound::Disconnect { reason } => self.disconnect(reason.to_plain()),
            Clientbound::SynchronizePlayerPosition {
                x,
                y,
                z,
                yaw,
                pitch,
                flags,
                teleport_id,
            } => {
                let relative = |bit: u8| flags & bit != 0;
                let p = &mut self.position;
                p.x = if relative(teleport_flags::X) { p.x + x } else { x };
                p.y = if relative(teleport_flags::Y) { p.y + y } else { y };
                p.z = if relative(teleport_flags::Z) { p.z + z } else { z };
                p.yaw = if relative(teleport_flags::YAW) { p.yaw + yaw } else { yaw };
                p.pitch = if relative(teleport_flags::PITCH) { p.pitch + pitch } else { pitch };
                let p = *p;
                vec![
                    Action::Send(Serverbound::ConfirmTeleportation { teleport_id }),
                    Action::Send(Serverbound::SetPlayerPositionAndRotation {
                        x: p.x,
                        y: p.y,
                        z: p.z,
                        yaw: p.yaw,
                        pitch: p.pitch,
                        on_ground: false,
                    }),
                    Action::Event(GameEvent::Position {
                        x: p.x,
                        y: p.y,
                        z: p.z,
                        yaw: p.yaw,
                        pitch: p.pitch,
                    }),
                ]
            }
            Clientbound::StartConfiguration => {
                let mut actions = vec![Action::Send(Serverbound::AcknowledgeConfiguration)];
                self.transition(ProtocolState::Configuration, &mut actions);
                actions.push(Action::Event(GameEvent::Reconfiguring));
                actions.push(Action::Send(Serverbound::ClientInformation(
                    self.settings.client_information.clone(),
                )));
                actions
            }
            Clientbound::ChunkBatchFinished { .. } => {
                vec![Action::Send(Serverbound::ChunkBatchReceived {
                    chunks_per_tick: CHUNKS_PER_TICK,
                })]
            }
            Clientbound::SetHealth {
                health,
                food,
                saturation,
            } => {
                let mut actions = vec![Action::Event(GameEvent::Health {
                    health,
                    food,
                    saturation,
                })];
                if health <= 0.0 {
                    // The server repeats SetHealth while dead; report once.
                    if !self.dead {
                        self.dead = true;
                        actions.push(Action::Event(GameEvent::Died));
                        if self.settings.auto_respawn {
                            actions.push(Action::Send(Serverbound::ClientStatus {
                                action: ClientStatusAction::Respawn,
                            }));
                        }
                    }
                } else {
                    self.dead = false;
                }
                actions
            }
            Clientbound::SystemChat { content, overlay } => vec![Action::Event(GameEvent::Chat {
                message: content.to_plain(),
                overlay,
            })],
            Clientbound::JoinGame { entity_id, .. } => {
                self.dead = false;
                vec![Action::Event(GameEvent::Joined { entity_id })]
            }
            _ => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn transition(&mut self, next: ProtocolState, actions: &mut Vec<Action>) {
        debug_assert!(self.state.can_transition_to(next), "{} -> {next}", self.state);
        self.state = next;
        actions.push(Action::Transition(next));
    }

    fn disconnect(&mut self, reason: String) -> Vec<Action> {
        self.state = ProtocolState::Disconnected;
        vec![Action::Disconnect(reason)]
    }

    fn brand_packet(&self) -> Serverbound {
        let mut data = BytesMut::new();
        write_string(&mut data, &self.settings.brand);
        Serverbound::PluginMessage {
            channel: "minecraft:brand".into(),
            data: data.freeze(),
        }
    }
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// Turns a host intent into the Play packet that carries it.
pub fn intent_packet(intent: Intent) -> Serverbound {
    match intent {
        Intent::Chat(message) => {
            let mut message = strip_legacy_codes(&message);
            if message.chars().count() > MAX_CHAT_LEN {
                message = message.chars().take(MAX_CHAT_LEN).collect();
            }
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or_default();
            Serverbound::ChatMessage {
                message,
                timestamp,
                salt: rand::rng().random(),
            }
        }
        Intent::Command(command) => Serverbound::ChatCommand {
            command: command.trim_start_matches('/').to_string(),
        },
        Intent::Respawn => Serverbound::ClientStatus {
            action: ClientStatusAction::Respawn,
        },
        Intent::Packet(packet) => packet,
    }
}

// =========================================================================
// Tests
// =========================================================================
