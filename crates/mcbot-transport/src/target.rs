//! Server addresses.

use std::fmt;
use std::str::FromStr;

use crate::TransportError;

/// The port vanilla servers listen on when none is given.
pub const DEFAULT_PORT: u16 = 25565;

/// A server a session connects to: `host:port`.
///
/// The host is kept as written (not resolved) because the handshake sends
/// it to the server verbatim, and proxies route on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    /// Creates a validated target.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidTarget`] when the host is not
    /// `localhost`, an IPv4 address or a DNS hostname, or when the port is 0.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransportError> {
        let host = host.into();
        let host = host.trim().to_string();
        if !is_valid_host(&host) {
            return Err(TransportError::InvalidTarget(format!(
                "invalid host {host:?}"
            )));
        }
        if port == 0 {
            return Err(TransportError::InvalidTarget("port must be 1-65535".into()));
        }
        Ok(Self { host, port })
    }

    /// The host as it will appear in the handshake.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses `host` or `host:port`. A missing port means [`DEFAULT_PORT`].
impl FromStr for Target {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    TransportError::InvalidTarget(format!("invalid port {port:?}"))
                })?;
                Self::new(host, port)
            }
            None => Self::new(s, DEFAULT_PORT),
        }
    }
}

fn is_valid_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    if host.eq_ignore_ascii_case("localhost") || is_ipv4(host) {
        return true;
    }
    host.split('.').all(is_valid_label)
}

fn is_ipv4(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| {
            !o.is_empty() && o.len() <= 3 && o.parse::<u8>().is_ok()
        })
}

/// One DNS label: alphanumeric at both ends, hyphens allowed inside,
/// at most 63 characters.
fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= 63
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        }
        _ => false,
    }
}
