//! Authentication: credentials and the token session
//!
//! [`Credentials`] is a small closed set of tagged variants, each knowing how
//! to authenticate against the vault; the [`AuthSession`] above it is
//! credential-agnostic. The session owns the one live [`Token`] and refreshes
//! it with single-flight semantics: during an in-flight refresh, every
//! concurrent `get_token` caller waits for that refresh and observes the same
//! outcome, success or failure. Refresh work runs detached from any single
//! caller, so cancelling a read does not abort a refresh other callers are
//! waiting on.

use crate::endpoints::Endpoints;
use crate::errors::{Error, Result};
use crate::lease::{LeaseManager, TokenCell};
use crate::models::{Lease, Token, TokenLookupData, VaultResponse};
use crate::transport::{Request, Transport};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the session authenticates against the vault
///
/// A closed set of variants selected by configuration; adding a method means
/// adding a variant here. All credential material is held as [`SecretString`]
/// and redacted from debug output.
#[derive(Clone)]
pub enum Credentials {
    /// A static vault token; its ttl and renewability are discovered via
    /// self-lookup
    Token(SecretString),
    /// Role-based login against an auth mount (e.g. `approle`)
    AppRole {
        /// Auth mount name, typically `approle`
        mount: String,
        /// Public role identifier
        role_id: String,
        /// Secret role credential
        secret_id: SecretString,
    },
}

impl Credentials {
    /// Static token credentials
    pub fn token(token: impl Into<String>) -> Self {
        Credentials::Token(SecretString::new(token.into()))
    }

    /// AppRole credentials on the standard `approle` mount
    pub fn app_role(role_id: impl Into<String>, secret_id: impl Into<String>) -> Self {
        Credentials::AppRole {
            mount: "approle".to_string(),
            role_id: role_id.into(),
            secret_id: SecretString::new(secret_id.into()),
        }
    }

    /// AppRole credentials on a custom auth mount
    pub fn app_role_at(
        mount: impl Into<String>,
        role_id: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Self {
        Credentials::AppRole {
            mount: mount.into(),
            role_id: role_id.into(),
            secret_id: SecretString::new(secret_id.into()),
        }
    }

    /// Perform the authenticate-or-lookup call and produce the token plus its
    /// own lease, when the server reports one
    pub(crate) async fn authenticate(
        &self,
        transport: &Transport,
        endpoints: &Endpoints,
    ) -> Result<(Token, Option<Lease>)> {
        match self {
            Credentials::Token(secret) => {
                let request = Request::get(endpoints.token_lookup_self())
                    .with_path("auth/token/lookup-self");
                let response = transport.send(&request, Some(secret)).await?;
                let parsed: VaultResponse = response.json()?;
                let lookup: TokenLookupData = match parsed.data {
                    Some(data) => serde_json::from_value(data)?,
                    None => {
                        return Err(Error::Deserialize(
                            "token lookup response carried no data".to_string(),
                        ))
                    }
                };

                let ttl = (lookup.ttl > 0).then(|| Duration::from_secs(lookup.ttl));
                let token = Token::new(secret.clone(), ttl, lookup.renewable);
                let lease = ttl.map(|ttl| Lease {
                    id: token_lease_id(&lookup.accessor),
                    ttl,
                    issued_at: token.issued_at(),
                    renewable: lookup.renewable,
                    secret_path: None,
                });
                Ok((token, lease))
            }
            Credentials::AppRole {
                mount,
                role_id,
                secret_id,
            } => {
                let body = serde_json::json!({
                    "role_id": role_id,
                    "secret_id": secret_id.expose_secret(),
                });
                // Safe to retry: an orphaned token from a lost response
                // simply expires on its own.
                let request = Request::post(endpoints.login(mount), body)
                    .with_path(format!("auth/{mount}/login"))
                    .idempotent(true);
                let response = transport.send(&request, None).await?;
                let parsed: VaultResponse = response.json()?;
                let auth = parsed.auth.ok_or_else(|| {
                    Error::Deserialize("login response carried no auth block".to_string())
                })?;

                let ttl = (auth.lease_duration > 0).then(|| Duration::from_secs(auth.lease_duration));
                let token = Token::new(auth.client_token, ttl, auth.renewable);
                let lease = ttl.map(|ttl| Lease {
                    id: token_lease_id(&auth.accessor),
                    ttl,
                    issued_at: token.issued_at(),
                    renewable: auth.renewable,
                    secret_path: None,
                });
                Ok((token, lease))
            }
        }
    }
}

/// Lease id under which the session token's own grant is tracked
fn token_lease_id(accessor: &str) -> String {
    if accessor.is_empty() {
        "auth/token/self".to_string()
    } else {
        format!("auth/token/{accessor}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => write!(f, "Credentials::Token(****)"),
            Credentials::AppRole { mount, role_id, .. } => f
                .debug_struct("Credentials::AppRole")
                .field("mount", mount)
                .field("role_id", role_id)
                .field("secret_id", &"****")
                .finish(),
        }
    }
}

/// Safety-margin configuration for proactive refresh
#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    /// Fraction of the token's ttl reserved as lead time
    pub margin_fraction: f64,
    /// Minimum lead time regardless of ttl
    pub min_margin: Duration,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<Token>,
    /// Set when a refresh failed; the stale token is retained but not served
    invalidated: bool,
    /// Bumped after every completed refresh so queued waiters can share its
    /// outcome instead of re-authenticating
    epoch: u64,
    last_error: Option<String>,
    /// Id the token's own lease is registered under, for logout
    token_lease_id: Option<String>,
}

/// The token session
///
/// Cheap to clone; all clones share the same token and refresh state.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    transport: Transport,
    endpoints: Endpoints,
    credentials: Credentials,
    leases: LeaseManager,
    token_cell: TokenCell,
    config: SessionConfig,
    state: Mutex<SessionState>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("AuthSession")
            .field("credentials", &self.inner.credentials)
            .field("has_token", &state.token.is_some())
            .field("invalidated", &state.invalidated)
            .finish()
    }
}

impl AuthSession {
    pub(crate) fn new(
        transport: Transport,
        endpoints: Endpoints,
        credentials: Credentials,
        leases: LeaseManager,
        token_cell: TokenCell,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                endpoints,
                credentials,
                leases,
                token_cell,
                config,
                state: Mutex::new(SessionState::default()),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Get a valid token, refreshing transparently if it is absent, stale, or
    /// inside the safety margin
    ///
    /// Callable concurrently; at most one underlying authenticate call is in
    /// flight at a time, and every waiter observes that call's outcome.
    pub async fn get_token(&self) -> Result<Token> {
        if let Some(token) = self.inner.fresh_token() {
            return Ok(token);
        }
        self.refresh(false).await
    }

    /// Refresh unconditionally, bypassing the safety-margin check
    ///
    /// Used after the server rejects a token the client still believed valid.
    pub async fn force_refresh(&self) -> Result<Token> {
        self.refresh(true).await
    }

    async fn refresh(&self, forced: bool) -> Result<Token> {
        let observed_epoch = self.inner.lock_state().epoch;
        let inner = self.inner.clone();
        // Detached: cancelling this caller must not abort a refresh that
        // other callers are queued behind.
        let handle = tokio::spawn(async move { inner.refresh_token(observed_epoch, forced).await });
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(Error::AuthenticationFailed(format!(
                "refresh task failed: {err}"
            ))),
        }
    }

    /// Drop the session token and revoke its lease
    ///
    /// A subsequent `get_token` authenticates from scratch.
    pub async fn logout(&self) -> Result<()> {
        // Revoke while the token is still installed; revoke-self needs it.
        let lease_id = self.inner.lock_state().token_lease_id.take();
        if let Some(id) = lease_id {
            match self.inner.leases.revoke(&id).await {
                Ok(()) => info!("session token revoked"),
                // Already evicted; nothing left to revoke.
                Err(Error::LeaseExpired { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        {
            let mut state = self.inner.lock_state();
            state.token = None;
            state.invalidated = false;
            state.last_error = None;
            state.epoch += 1;
        }
        *self
            .inner
            .token_cell
            .write()
            .unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

impl SessionInner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The installed token, only if it is serviceable without I/O
    fn fresh_token(&self) -> Option<Token> {
        let state = self.lock_state();
        if state.invalidated {
            return None;
        }
        state
            .token
            .as_ref()
            .filter(|t| t.is_fresh(self.config.margin_fraction, self.config.min_margin))
            .cloned()
    }

    /// The single-flight refresh critical section
    async fn refresh_token(self: Arc<Self>, observed_epoch: u64, forced: bool) -> Result<Token> {
        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.lock_state();
            // A refresh completed while we were queued; share its outcome.
            if state.epoch != observed_epoch {
                return match (&state.token, state.invalidated) {
                    (Some(token), false) => Ok(token.clone()),
                    _ => Err(Error::AuthenticationFailed(
                        state
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "credential rejected".to_string()),
                    )),
                };
            }
        }
        if !forced {
            if let Some(token) = self.fresh_token() {
                return Ok(token);
            }
        }

        debug!(forced, "refreshing session token");
        let result = self
            .credentials
            .authenticate(&self.transport, &self.endpoints)
            .await;

        let (outcome, lease) = {
            let mut state = self.lock_state();
            state.epoch += 1;
            match result {
                Ok((token, lease)) => {
                    // Linearized install: a refresh that lost the race to a
                    // newer token is discarded, and its caller gets the newer
                    // token instead.
                    let newer = state
                        .token
                        .as_ref()
                        .map_or(true, |cur| token.issued_at() >= cur.issued_at());
                    if newer {
                        state.token = Some(token.clone());
                        state.invalidated = false;
                        state.last_error = None;
                        if let Some(lease) = &lease {
                            state.token_lease_id = Some(lease.id.clone());
                        }
                        (Ok(token), lease)
                    } else {
                        let current = state.token.clone().map(Ok).unwrap_or(Ok(token));
                        (current, None)
                    }
                }
                Err(err) => {
                    state.invalidated = true;
                    let message = err.to_string();
                    state.last_error = Some(message.clone());
                    (Err(Error::AuthenticationFailed(message)), None)
                }
            }
        };

        match &outcome {
            Ok(token) => {
                *self.token_cell.write().unwrap_or_else(|e| e.into_inner()) =
                    Some(token.secret().clone());
                if let Some(lease) = lease {
                    self.leases.register(lease);
                }
                info!(
                    renewable = token.renewable(),
                    expires_at = ?token.expires_at(),
                    "session token installed"
                );
            }
            Err(err) => warn!(error = %err, "token refresh failed"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacted() {
        let token = Credentials::token("hvs.super-secret");
        assert_eq!(format!("{:?}", token), "Credentials::Token(****)");

        let approle = Credentials::app_role("role-123", "secret-456");
        let debug = format!("{:?}", approle);
        assert!(debug.contains("role-123"));
        assert!(!debug.contains("secret-456"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_app_role_mounts() {
        match Credentials::app_role("r", "s") {
            Credentials::AppRole { mount, .. } => assert_eq!(mount, "approle"),
            _ => panic!("expected AppRole"),
        }
        match Credentials::app_role_at("jwt", "r", "s") {
            Credentials::AppRole { mount, .. } => assert_eq!(mount, "jwt"),
            _ => panic!("expected AppRole"),
        }
    }

    #[test]
    fn test_token_lease_id() {
        assert_eq!(token_lease_id(""), "auth/token/self");
        assert_eq!(token_lease_id("acc-1"), "auth/token/acc-1");
    }
}
