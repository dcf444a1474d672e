//! # mcbot
//!
//! Headless Minecraft (Java edition) bots driven by a host.
//!
//! A host starts, stops and queries bots through one [`BotBridge`] and
//! hears about them on a notification channel. Below the bridge each bot is
//! a session task that logs in, answers keep-alives and configuration
//! packets, and reconnects when the server drops it.
//!
//! ```text
//! Host  ← HostCommand in, HostNotification out
//!     ↕
//! Bridge (this crate)  ← command dispatch, reconnect supervisor
//!     ↕
//! Session Layer  ← auth, login/configuration/play state machine, registry
//!     ↕
//! Protocol Layer  ← packets, framing, compression, encryption
//!     ↕
//! Transport Layer  ← TCP
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcbot::prelude::*;
//!
//! # async fn run() -> Result<(), BotError> {
//! let config = BotConfig::default().validated()?;
//! let (bridge, mut notifications) = BotBridge::new(OfflineAuthProvider, config);
//!
//! let target: Target = "localhost:25565".parse()?;
//! bridge
//!     .execute(HostCommand::StartSession {
//!         identity: Identity::new("Steve"),
//!         target,
//!     })
//!     .await?;
//!
//! while let Some(notification) = notifications.recv().await {
//!     println!("{notification:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod bridge;
mod config;
mod error;

pub mod logging;

pub use bridge::{
    BotBridge, HostCommand, HostNotification, HostReply, REASON_RECONNECT_REQUESTED,
    REASON_STOPPED_BY_HOST,
};
pub use config::{BotConfig, ReconnectConfig};
pub use error::BotError;

/// Everything a host usually needs, in one import.
pub mod prelude {
    pub use crate::{
        BotBridge, BotConfig, BotError, HostCommand, HostNotification, HostReply, ReconnectConfig,
    };
    pub use mcbot_protocol::ProtocolState;
    pub use mcbot_session::{
        AuthProvider, CachingAuthProvider, GameEvent, Identity, Intent, OfflineAuthProvider,
        SessionConfig, SessionSnapshot,
    };
    pub use mcbot_transport::Target;
}
