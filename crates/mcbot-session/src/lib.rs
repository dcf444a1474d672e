//! Bot sessions for mcbot.
//!
//! This crate handles the lifecycle of bot connections:
//!
//! 1. **Authentication**: who a bot logs in as ([`AuthProvider`] trait,
//!    with [`OfflineAuthProvider`] and [`CachingAuthProvider`] adapters)
//! 2. **Protocol rules**: what to answer to each server packet
//!    ([`ProtocolMachine`], pure and I/O-free)
//! 3. **Sessions**: one task per bot that owns the socket
//!    ([`SessionEngine`], [`SessionHandle`])
//! 4. **Registry**: at most one live session per identity
//!    ([`SessionRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Bridge (above)  ← host commands in, notifications out
//!     ↕
//! Session Layer (this crate)  ← login, keep-alive, state machine, registry
//!     ↕
//! Protocol Layer (below)  ← packets, framing, compression, encryption
//!     ↕
//! Transport Layer  ← TCP
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod driver;
mod engine;
mod error;
mod machine;
mod registry;
mod session;

pub mod status;

pub use auth::{
    AuthError, AuthProvider, CachingAuthProvider, Credential, DEFAULT_MAX_REFRESH_FAILURES,
    DEFAULT_REFRESH_THRESHOLD, EncryptionChallenge, EncryptionMaterial, Identity,
    OfflineAuthProvider, Profile, SharedSecret, is_valid_username,
};
pub use engine::{SessionEngine, SessionHandle};
pub use error::SessionError;
pub use machine::{
    Action, ConfigurationFlow, MachineSettings, ProtocolMachine, VanillaConfigurationFlow,
    intent_packet,
};
pub use registry::SessionRegistry;
pub use session::{
    GameEvent, Intent, Position, SessionConfig, SessionEvent, SessionEventKind, SessionSnapshot,
    SessionStats, format_uptime,
};
pub use status::StatusReport;
