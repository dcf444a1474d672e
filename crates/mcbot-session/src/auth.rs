//! Authentication: who a session logs in as.
//!
//! mcbot does not talk to any account service itself. The [`AuthProvider`]
//! trait is the boundary: a session asks it for a [`Credential`] before
//! connecting and, if the server runs in online mode, asks it to answer the
//! server's encryption challenge. Both calls are opaque async
//! request/response pairs.
//!
//! Two adapters ship with the crate:
//!
//! - [`OfflineAuthProvider`]: offline-mode accounts with a name-derived UUID.
//! - [`CachingAuthProvider`]: wraps any provider, caches credentials per
//!   identity and refreshes them when they get old.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use mcbot_protocol::SHARED_SECRET_LEN;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity and credentials
// ---------------------------------------------------------------------------

/// The account key a session authenticates as (the username).
///
/// The registry allows one live session per identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Returns `true` for a legal Minecraft username: 3 to 16 characters from
/// `[A-Za-z0-9_]`.
pub fn is_valid_username(name: &str) -> bool {
    (3..=16).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// The game profile a credential logs in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub uuid: Uuid,
}

/// What an [`AuthProvider`] issues for an identity.
///
/// Immutable once issued. A refresh replaces the whole credential, and
/// sessions keep a shared `Arc` to the one they started with.
#[derive(Debug, Clone)]
pub struct Credential {
    pub profile: Profile,
    /// Opaque token for the account service. Empty for offline accounts.
    pub access_token: String,
    pub issued_at: SystemTime,
    /// `None` means the credential does not expire.
    pub expires_at: Option<SystemTime>,
}

impl Credential {
    /// A credential issued now that never expires.
    pub fn new(profile: Profile, access_token: impl Into<String>) -> Self {
        Self {
            profile,
            access_token: access_token.into(),
            issued_at: SystemTime::now(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| SystemTime::now() >= at)
    }

    /// `true` once the credential is expired or at least `threshold` old.
    pub fn needs_refresh(&self, threshold: Duration) -> bool {
        if self.is_expired() {
            return true;
        }
        // A clock that went backwards counts as fresh.
        SystemTime::now()
            .duration_since(self.issued_at)
            .map(|age| age >= threshold)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Encryption handshake material
// ---------------------------------------------------------------------------

/// The server's `EncryptionRequest`, as handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionChallenge {
    pub server_id: String,
    /// DER-encoded RSA public key.
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
    /// Whether the server will check the session with the account service.
    pub should_authenticate: bool,
}

/// The provider's answer to an [`EncryptionChallenge`].
///
/// `shared_secret` is the raw AES key the session installs;
/// the other two fields go on the wire in `EncryptionResponse`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionMaterial {
    pub shared_secret: [u8; SHARED_SECRET_LEN],
    pub encrypted_shared_secret: Vec<u8>,
    pub encrypted_verify_token: Vec<u8>,
}

impl fmt::Debug for EncryptionMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionMaterial")
            .field("shared_secret", &"<redacted>")
            .field("encrypted_shared_secret", &self.encrypted_shared_secret.len())
            .field("encrypted_verify_token", &self.encrypted_verify_token.len())
            .finish()
    }
}

/// Random AES shared secrets for provider implementations.
pub struct SharedSecret;

impl SharedSecret {
    /// Generates a fresh 16-byte secret.
    pub fn generate() -> [u8; SHARED_SECRET_LEN] {
        rand::rng().random()
    }
}

// ---------------------------------------------------------------------------
// AuthError
// ---------------------------------------------------------------------------

/// Why a provider could not produce a credential or answer a challenge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The account service refused the account.
    #[error("authentication rejected: {0}")]
    Rejected(String),

    /// The account service could not be reached.
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),

    /// The provider cannot do what was asked (for example, an offline
    /// account joining an online-mode server).
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("credential for {0} has expired")]
    Expired(Identity),

    #[error("invalid identity {0:?}")]
    InvalidIdentity(String),

    /// Refreshing failed too many times in a row.
    #[error("gave up refreshing {identity} after {attempts} failed attempts")]
    RefreshLimit { identity: Identity, attempts: u32 },
}

// ---------------------------------------------------------------------------
// AuthProvider
// ---------------------------------------------------------------------------

/// Issues credentials and answers encryption challenges.
///
/// Sessions call both methods from a spawned task, never from their own
/// loop, so a slow provider delays only the session waiting on it.
pub trait AuthProvider: Send + Sync + 'static {
    /// Returns a credential for `identity`.
    fn credential_for(
        &self,
        identity: &Identity,
    ) -> impl std::future::Future<Output = Result<Arc<Credential>, AuthError>> + Send;

    /// Produces the shared secret and its encrypted forms for `challenge`.
    fn sign_encryption_challenge(
        &self,
        credential: &Credential,
        challenge: &EncryptionChallenge,
    ) -> impl std::future::Future<Output = Result<EncryptionMaterial, AuthError>> + Send;
}

impl<A: AuthProvider> AuthProvider for Arc<A> {
    async fn credential_for(&self, identity: &Identity) -> Result<Arc<Credential>, AuthError> {
        (**self).credential_for(identity).await
    }

    async fn sign_encryption_challenge(
        &self,
        credential: &Credential,
        challenge: &EncryptionChallenge,
    ) -> Result<EncryptionMaterial, AuthError> {
        (**self).sign_encryption_challenge(credential, challenge).await
    }
}

// ---------------------------------------------------------------------------
// OfflineAuthProvider
// ---------------------------------------------------------------------------

/// Offline-mode accounts.
///
/// The UUID is a name-based (v3) UUID of `"OfflinePlayer:<name>"`, so the
/// same name always maps to the same profile. Encryption challenges are
/// refused: an offline account cannot join an online-mode server.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAuthProvider;

impl OfflineAuthProvider {
    pub fn new() -> Self {
        Self
    }

    /// The offline profile UUID for `name`.
    pub fn offline_uuid(name: &str) -> Uuid {
        Uuid::new_v3(&Uuid::NAMESPACE_OID, format!("OfflinePlayer:{name}").as_bytes())
    }
}

impl AuthProvider for OfflineAuthProvider {
    async fn credential_for(&self, identity: &Identity) -> Result<Arc<Credential>, AuthError> {
        let name = identity.as_str();
        if !is_valid_username(name) {
            return Err(AuthError::InvalidIdentity(name.to_string()));
        }
        let profile = Profile {
            name: name.to_string(),
            uuid: Self::offline_uuid(name),
        };
        tracing::debug!(%identity, uuid = %profile.uuid, "issued offline credential");
        Ok(Arc::new(Credential::new(profile, "")))
    }

    async fn sign_encryption_challenge(
        &self,
        _credential: &Credential,
        _challenge: &EncryptionChallenge,
    ) -> Result<EncryptionMaterial, AuthError> {
        Err(AuthError::Unsupported(
            "offline accounts cannot join online-mode servers".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// CachingAuthProvider
// ---------------------------------------------------------------------------

/// Credentials older than this are refreshed.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(22 * 60 * 60);

/// Consecutive refresh failures before giving up on an identity.
pub const DEFAULT_MAX_REFRESH_FAILURES: u32 = 3;

#[derive(Default)]
struct CacheEntry {
    credential: Option<Arc<Credential>>,
    failures: u32,
}

/// Caches credentials per identity in front of another provider.
///
/// A cached credential is reused until it expires or reaches the refresh
/// threshold. A failed refresh falls back to the cached credential while it
/// is still unexpired. After `max_failures` consecutive failures the
/// identity is locked out with [`AuthError::RefreshLimit`] until
/// [`CachingAuthProvider::invalidate`] is called. A refresh that fails
/// while the cached credential has already expired reports
/// [`AuthError::Expired`].
///
/// Each identity has its own slot lock: concurrent callers for one
/// identity share a single refresh, and a slow refresh never holds up
/// other identities.
pub struct CachingAuthProvider<A> {
    inner: A,
    refresh_threshold: Duration,
    max_failures: u32,
    entries: Mutex<HashMap<Identity, Arc<Mutex<CacheEntry>>>>,
}

impl<A: AuthProvider> CachingAuthProvider<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            max_failures: DEFAULT_MAX_REFRESH_FAILURES,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn with_max_failures(mut self, max: u32) -> Self {
        self.max_failures = max.max(1);
        self
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Drops the cached credential and failure count for `identity`.
    pub async fn invalidate(&self, identity: &Identity) {
        if self.entries.lock().await.remove(identity).is_some() {
            tracing::debug!(%identity, "credential invalidated");
        }
    }
}

impl<A: AuthProvider> AuthProvider for CachingAuthProvider<A> {
    async fn credential_for(&self, identity: &Identity) -> Result<Arc<Credential>, AuthError> {
        let slot = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(identity.clone()).or_default())
        };
        let mut entry = slot.lock().await;

        if let Some(cached) = &entry.credential {
            if !cached.needs_refresh(self.refresh_threshold) {
                return Ok(Arc::clone(cached));
            }
        }

        if entry.failures >= self.max_failures {
            return Err(AuthError::RefreshLimit {
                identity: identity.clone(),
                attempts: entry.failures,
            });
        }

        match self.inner.credential_for(identity).await {
            Ok(fresh) => {
                tracing::debug!(%identity, "credential refreshed");
                entry.credential = Some(Arc::clone(&fresh));
                entry.failures = 0;
                Ok(fresh)
            }
            Err(e) => {
                entry.failures += 1;
                tracing::warn!(
                    %identity,
                    attempt = entry.failures,
                    error = %e,
                    "credential refresh failed"
                );
                if entry.failures >= self.max_failures {
                    return Err(AuthError::RefreshLimit {
                        identity: identity.clone(),
                        attempts: entry.failures,
                    });
                }
                match &entry.credential {
                    Some(cached) if !cached.is_expired() => Ok(Arc::clone(cached)),
                    Some(_) => Err(AuthError::Expired(identity.clone())),
                    None => Err(e),
                }
            }
        }
    }

    async fn sign_encryption_challenge(
        &self,
        credential: &Credential,
        challenge: &EncryptionChallenge,
    ) -> Result<EncryptionMaterial, AuthError> {
        self.inner.sign_encryption_challenge(credential, challenge).await
    }
}

// =========================================================================
// Tests
// =========================================================================
