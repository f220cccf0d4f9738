//! Data models for the vault SDK
//!
//! # Key Types
//!
//! * [`Token`] - the session credential with its validity window
//! * [`Lease`] - a time-bounded grant (token or dynamic secret) tracked by the
//!   lease manager
//! * [`LeaseState`] - per-lease lifecycle state
//! * [`SecretRecord`] - the result of reading a secret path
//!
//! Wire-level response shapes live here too but stay crate-private; the vault
//! HTTP surface is treated as a black-box RPC boundary.

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;

/// An authentication token with its validity window
///
/// Owned exclusively by the auth session; replaced atomically on refresh and
/// never mutated in place. The token string itself is protected with
/// [`SecretString`] so it cannot leak through logs or debug output.
#[derive(Clone)]
pub struct Token {
    value: SecretString,
    issued_at: OffsetDateTime,
    ttl: Option<Duration>,
    renewable: bool,
}

impl Token {
    /// Create a token issued now
    pub fn new(value: SecretString, ttl: Option<Duration>, renewable: bool) -> Self {
        Self {
            value,
            issued_at: OffsetDateTime::now_utc(),
            ttl,
            renewable,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_issued_at(mut self, issued_at: OffsetDateTime) -> Self {
        self.issued_at = issued_at;
        self
    }

    /// The protected token string
    pub fn secret(&self) -> &SecretString {
        &self.value
    }

    /// When the token was issued
    pub fn issued_at(&self) -> OffsetDateTime {
        self.issued_at
    }

    /// The token's original time-to-live; `None` means non-expiring
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Whether the server will extend this token on renewal
    pub fn renewable(&self) -> bool {
        self.renewable
    }

    /// Absolute expiry, or `None` for a non-expiring token
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.ttl.map(|ttl| self.issued_at + ttl)
    }

    /// Whether the token is still comfortably inside its validity window
    ///
    /// The safety margin is `max(min_margin, ttl * margin_fraction)`: a token
    /// closer to expiry than that is treated as stale and refreshed proactively
    /// rather than used as-is.
    pub(crate) fn is_fresh(&self, margin_fraction: f64, min_margin: Duration) -> bool {
        let Some(expires_at) = self.expires_at() else {
            return true;
        };
        let ttl = self.ttl.unwrap_or(Duration::ZERO);
        let margin = min_margin.max(ttl.mul_f64(margin_fraction));
        OffsetDateTime::now_utc() + margin < expires_at
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"****")
            .field("issued_at", &self.issued_at)
            .field("ttl", &self.ttl)
            .field("renewable", &self.renewable)
            .finish()
    }
}

/// A time-bounded grant issued by the vault service
///
/// One entry exists per active secret-or-token grant. The lease manager is the
/// sole owner; everything else refers to a lease by id.
#[derive(Debug, Clone)]
pub struct Lease {
    /// Unique id issued by the vault service
    pub id: String,
    /// Current time-to-live
    pub ttl: Duration,
    /// When the lease was issued or last successfully renewed
    pub issued_at: OffsetDateTime,
    /// Whether renewal attempts may extend this lease
    pub renewable: bool,
    /// The secret path this lease backs, or `None` for the auth token's own lease
    pub secret_path: Option<String>,
}

impl Lease {
    /// Absolute expiry of the current validity window
    pub fn expires_at(&self) -> OffsetDateTime {
        self.issued_at + self.ttl
    }
}

/// Lifecycle state of a tracked lease
///
/// `Active -> RenewalScheduled -> Active` on successful renewal;
/// `Expired` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Valid, renewal timer pending
    Active,
    /// Renewal attempt in progress or queued
    RenewalScheduled,
    /// Expired without successful renewal (terminal)
    Expired,
    /// Explicitly revoked (terminal)
    Revoked,
}

/// A secret read from the vault
///
/// Produced per read and not cached by the SDK. `lease_id` is a weak
/// back-reference: resolve it through the lease manager, which remains the
/// sole authority for eviction. A record can therefore outlive its lease, and
/// resolving the id after eviction fails loudly instead of silently serving a
/// dead grant.
#[derive(Debug, Clone)]
pub struct SecretRecord {
    /// The path the secret was read from
    pub path: String,
    /// Secret payload: string keys mapping to opaque values
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Back-reference to the lease tracking this secret, if any
    pub lease_id: Option<String>,
    /// When this record was fetched
    pub fetched_at: OffsetDateTime,
    /// Server-side request id, if reported
    pub request_id: Option<String>,
}

// Wire types

/// Generic vault response envelope shared by secret reads, writes, logins and
/// lease operations
#[derive(Debug, Deserialize)]
pub(crate) struct VaultResponse {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub lease_duration: u64,
    pub data: Option<serde_json::Value>,
    pub auth: Option<AuthPayload>,
}

impl VaultResponse {
    /// Extract lease metadata, if the response carries any
    pub fn lease(&self, secret_path: Option<&str>) -> Option<Lease> {
        if self.lease_id.is_empty() || self.lease_duration == 0 {
            return None;
        }
        Some(Lease {
            id: self.lease_id.clone(),
            ttl: Duration::from_secs(self.lease_duration),
            issued_at: OffsetDateTime::now_utc(),
            renewable: self.renewable,
            secret_path: secret_path.map(str::to_string),
        })
    }

    /// The `data` object as a string-keyed map, empty when absent
    pub fn data_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match &self.data {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        }
    }
}

/// The `auth` block of a login or token-renewal response
#[derive(Debug, Deserialize)]
pub(crate) struct AuthPayload {
    pub client_token: SecretString,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

/// The `data` block of `auth/token/lookup-self`
#[derive(Debug, Deserialize)]
pub(crate) struct TokenLookupData {
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub accessor: String,
}
