//! Bot configuration: session settings plus the reconnect policy.
//!
//! Every field has a default, so a host can deserialize a partial document
//! and call [`BotConfig::validated`] before starting anything.

use std::ops::RangeInclusive;
use std::time::Duration;

use mcbot_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::BotError;

const RECONNECT_DELAY_SECS: RangeInclusive<u64> = 1..=3600;
const RECONNECT_ATTEMPTS: RangeInclusive<u32> = 1..=100;
const KEEP_ALIVE_INTERVAL_SECS: RangeInclusive<u64> = 5..=300;
const CONNECT_TIMEOUT_SECS: RangeInclusive<u64> = 1..=60;

/// When and how often a dropped session is restarted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Wait between a disconnect and the next attempt.
    pub delay_secs: u64,
    /// Consecutive failed attempts before giving up. Reaching Play resets
    /// the count.
    pub max_attempts: u32,
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: 30,
            max_attempts: 10,
        }
    }
}

/// Everything the bridge needs to run bots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub session: SessionConfig,
    pub reconnect: ReconnectConfig,
}

impl BotConfig {
    /// Checks every bounded field and returns the config unchanged.
    ///
    /// # Errors
    /// [`BotError::Config`] naming the first field out of range.
    pub fn validated(self) -> Result<Self, BotError> {
        check("reconnect.delay_secs", self.reconnect.delay_secs, RECONNECT_DELAY_SECS)?;
        check("reconnect.max_attempts", self.reconnect.max_attempts, RECONNECT_ATTEMPTS)?;
        check(
            "session.keep_alive_interval_secs",
            self.session.keep_alive_interval_secs,
            KEEP_ALIVE_INTERVAL_SECS,
        )?;
        check(
            "session.connect_timeout_secs",
            self.session.connect_timeout_secs,
            CONNECT_TIMEOUT_SECS,
        )?;
        if self.session.outbound_queue == 0 {
            return Err(BotError::Config("session.outbound_queue must be at least 1".into()));
        }
        Ok(self)
    }
}

fn check<T>(field: &str, value: T, range: RangeInclusive<T>) -> Result<(), BotError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(BotError::Config(format!(
            "{field} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}
