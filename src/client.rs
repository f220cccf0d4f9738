//! Vault client implementation
//!
//! The [`Client`] is the public entry point: it reads and writes secret paths,
//! delegating token handling to the [`AuthSession`] and lease bookkeeping to
//! the [`LeaseManager`]. All I/O goes through the retrying [`Transport`].
//!
//! # Examples
//!
//! ```no_run
//! use vault_lease_sdk::{ClientBuilder, Credentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new("https://vault.example.com")
//!     .credentials(Credentials::token("hvs.xxxx"))
//!     .build()?;
//!
//! let record = client.read("secret/data/db").await?;
//! if let Some(lease_id) = &record.lease_id {
//!     println!("tracking lease {lease_id}");
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
    auth::{AuthSession, SessionConfig},
    config::ClientConfig,
    endpoints::Endpoints,
    errors::{Error, Result},
    lease::{LeaseManager, TokenCell},
    models::{Lease, SecretRecord, VaultResponse},
    transport::{Request, Response, Transport},
};

use reqwest::Client as HttpClient;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

const USER_AGENT_PREFIX: &str = "vault-lease-sdk-rust";

/// Vault secret client
///
/// Cheap to clone; clones share the session, lease manager, and connection
/// pool. Every public call returns either a value or one categorized
/// [`Error`], never a partial state.
#[derive(Clone)]
pub struct Client {
    pub(crate) config: ClientConfig,
    transport: Transport,
    endpoints: Endpoints,
    session: AuthSession,
    leases: LeaseManager,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("max_attempts", &self.config.retry.max_attempts)
            .field("active_leases", &self.leases.active_count())
            .finish()
    }
}

impl Client {
    /// Create a new client with the given configuration
    pub(crate) fn new(config: ClientConfig) -> Result<Self> {
        let user_agent = match &config.user_agent_suffix {
            Some(suffix) => format!("{}/{} {}", USER_AGENT_PREFIX, crate::VERSION, suffix),
            None => format!("{}/{}", USER_AGENT_PREFIX, crate::VERSION),
        };

        // The reqwest timeout applies to each attempt, giving the per-attempt
        // budget the retry policy expects.
        let http = HttpClient::builder()
            .user_agent(user_agent)
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let transport = Transport::new(http, config.retry.clone());
        let endpoints = Endpoints::new(&config.base_url);
        let token_cell: TokenCell = Arc::new(RwLock::new(None));

        let leases = LeaseManager::new(
            transport.clone(),
            endpoints.clone(),
            token_cell.clone(),
            config.renewal.clone(),
        );
        let session = AuthSession::new(
            transport.clone(),
            endpoints.clone(),
            config.credentials.clone(),
            leases.clone(),
            token_cell,
            SessionConfig {
                margin_fraction: config.safety_margin_fraction,
                min_margin: config.min_safety_margin,
            },
        );

        Ok(Self {
            transport,
            endpoints,
            session,
            leases,
            config,
        })
    }

    /// The token session behind this client
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// The lease manager behind this client
    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Read the secret at a vault path
    ///
    /// Authenticates through the session, registers any lease metadata the
    /// response carries, and returns the record with a weak back-reference to
    /// that lease. Records are produced per read; nothing is cached.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if no secret lives at the path
    /// * [`Error::AuthenticationFailed`] if the token is rejected twice
    /// * [`Error::TransportExhausted`] when retries run out
    pub async fn read(&self, path: &str) -> Result<SecretRecord> {
        let request = Request::get(self.endpoints.secret(path)).with_path(path);
        let response = self.execute(request).await?;
        let parsed: VaultResponse = response.json()?;

        let lease = parsed.lease(Some(path));
        let lease_id = lease.as_ref().map(|l| l.id.clone());
        if let Some(lease) = lease {
            self.leases.register(lease);
        }

        debug!(path, lease = lease_id.as_deref().unwrap_or("-"), "read secret");
        Ok(SecretRecord {
            path: path.to_string(),
            data: parsed.data_map(),
            lease_id,
            fetched_at: OffsetDateTime::now_utc(),
            request_id: (!parsed.request_id.is_empty()).then(|| parsed.request_id.clone()),
        })
    }

    /// Write secret data to a vault path
    ///
    /// Not idempotent from the transport's point of view, so transient
    /// failures are not retried. Returns the lease the server attached to the
    /// write, if any, already registered with the lease manager.
    pub async fn write<T: serde::Serialize>(&self, path: &str, data: &T) -> Result<Option<Lease>> {
        let body = serde_json::to_value(data)?;
        let request = Request::post(self.endpoints.secret(path), body).with_path(path);
        let response = self.execute(request).await?;

        // Plain KV writes answer 204 with no body.
        if response.body().is_null() {
            debug!(path, "wrote secret");
            return Ok(None);
        }

        let parsed: VaultResponse = response.json()?;
        let lease = parsed.lease(Some(path));
        if let Some(lease) = lease.clone() {
            self.leases.register(lease);
        }
        debug!(path, "wrote secret");
        Ok(lease)
    }

    /// Revoke a tracked lease by id
    pub async fn revoke_lease(&self, id: &str) -> Result<()> {
        self.leases.revoke(id).await
    }

    /// Drop the session token and revoke its lease
    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await
    }

    /// Execute a request with a valid token, allowing exactly one forced
    /// re-authentication when the server rejects the token outright
    async fn execute(&self, request: Request) -> Result<Response> {
        let token = self.session.get_token().await?;
        match self.transport.send(&request, Some(token.secret())).await {
            Err(err) if err.is_auth_rejection() => {
                warn!(
                    path = %request.path,
                    status = err.status_code().unwrap_or(0),
                    "token rejected, forcing re-authentication"
                );
                let token = self.session.force_refresh().await?;
                self.transport
                    .send(&request, Some(token.secret()))
                    .await
                    .map_err(|err| {
                        if err.is_auth_rejection() {
                            Error::AuthenticationFailed(err.to_string())
                        } else {
                            err
                        }
                    })
            }
            other => other,
        }
    }
}
