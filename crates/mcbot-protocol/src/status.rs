//! The server-list status document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ProtocolError, Text};

/// Body of `StatusResponse`, as shown in the multiplayer server list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub version: StatusVersion,
    #[serde(default)]
    pub players: Option<StatusPlayers>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub enforces_secure_chat: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPlayers {
    pub max: i32,
    pub online: i32,
}

impl ServerStatus {
    /// Parses the JSON document.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The message of the day as plain text.
    pub fn motd(&self) -> String {
        self.description
            .clone()
            .map(|d| Text::from_value(d).to_plain())
            .unwrap_or_default()
    }
}
