//! Lease tracking and background renewal
//!
//! The [`LeaseManager`] is the sole owner of all active leases: the session
//! token's own lease and every dynamic secret lease the client picks up.
//! Each renewable lease gets an independent timer task keyed by lease id, so
//! removing one lease is O(1) and renewal of one lease never delays another.
//! The map mutex guards only insert/remove/update; renewal network calls run
//! outside it.
//!
//! Scheduling: a renewable lease is renewed at
//! `issued_at + ttl * renew_before_fraction` (default half-life), but never
//! later than `renew_floor` before expiry. A failed renewal (after the
//! transport's own retries) gets exactly one more attempt after
//! `ttl * renew_retry_fraction`; if that fails too, the lease is removed as
//! expired and callers must re-fetch the secret. Renewal failures are logged,
//! never surfaced.

use crate::endpoints::Endpoints;
use crate::errors::{Error, Result};
use crate::models::{Lease, LeaseState, VaultResponse};
use crate::transport::{Request, Transport};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared cell holding the current session token
///
/// Written by the auth session on every successful refresh, read by renewal
/// tasks when they authenticate their calls. Passing resolved tokens by value
/// through this cell keeps the session and the manager free of nested locking.
pub(crate) type TokenCell = Arc<RwLock<Option<SecretString>>>;

/// Renewal scheduling configuration
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// Fraction of the ttl after which renewal is attempted (default 0.5)
    pub renew_before_fraction: f64,
    /// Minimum lead time before expiry for the renewal attempt (default 10s)
    pub renew_floor: Duration,
    /// Fraction of the ttl to wait before the single post-failure retry
    /// (default 0.25)
    pub renew_retry_fraction: f64,
    /// Requested renewal increment; the server may shorten or extend it
    pub renew_increment: Option<Duration>,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            renew_before_fraction: crate::DEFAULT_RENEW_BEFORE_FRACTION,
            renew_floor: Duration::from_secs(crate::DEFAULT_RENEW_FLOOR_SECS),
            renew_retry_fraction: crate::DEFAULT_RENEW_RETRY_FRACTION,
            renew_increment: None,
        }
    }
}

/// When to attempt renewal: half-life by default, clamped so the attempt
/// happens at least `renew_floor` before expiry
fn renewal_point(issued_at: OffsetDateTime, ttl: Duration, config: &RenewalConfig) -> OffsetDateTime {
    let fraction_point = issued_at + ttl.mul_f64(config.renew_before_fraction);
    let floor_point = issued_at + ttl.saturating_sub(config.renew_floor);
    fraction_point.min(floor_point).max(issued_at)
}

/// Sleep until an absolute wall-clock instant
async fn sleep_until(target: OffsetDateTime) {
    let now = OffsetDateTime::now_utc();
    if target > now {
        let delta: Duration = (target - now).try_into().unwrap_or_default();
        tokio::time::sleep(delta).await;
    }
}

#[derive(Debug)]
struct LeaseEntry {
    lease: Lease,
    state: LeaseState,
    task: Option<JoinHandle<()>>,
}

/// Tracks active leases and keeps them renewed in the background
///
/// Cheap to clone; all clones share the same lease map and tasks.
#[derive(Debug, Clone)]
pub struct LeaseManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    transport: Transport,
    endpoints: Endpoints,
    token: TokenCell,
    config: RenewalConfig,
    entries: Mutex<HashMap<String, LeaseEntry>>,
}

impl LeaseManager {
    pub(crate) fn new(
        transport: Transport,
        endpoints: Endpoints,
        token: TokenCell,
        config: RenewalConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                endpoints,
                token,
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start tracking a lease
    ///
    /// Registering an id that is already tracked replaces the old entry and
    /// cancels its timer, so the map never holds two entries with the same id.
    /// Renewable leases get a renewal task; non-renewable leases get an
    /// eviction task that fires exactly at `issued_at + ttl`.
    pub fn register(&self, lease: Lease) {
        let id = lease.id.clone();
        let renewable = lease.renewable;
        debug!(lease_id = %id, renewable, ttl_secs = lease.ttl.as_secs(), "registering lease");

        // Insert, spawn, and record the handle under one lock acquisition:
        // concurrent registers of the same id must each see the task they are
        // replacing, or two timers end up renewing the same lease. The spawned
        // task's first step locks this same mutex, so it parks until the entry
        // is in place. Tasks hold the manager weakly; dropping the last
        // manager handle ends them instead of leaking renewal traffic.
        let mut entries = self.inner.lock_entries();
        if let Some(old) = entries.insert(
            id.clone(),
            LeaseEntry {
                lease,
                state: LeaseState::Active,
                task: None,
            },
        ) {
            if let Some(old_task) = old.task {
                old_task.abort();
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let task = if renewable {
            tokio::spawn(renew_loop(weak, id.clone()))
        } else {
            tokio::spawn(expiry_watch(weak, id.clone()))
        };
        if let Some(entry) = entries.get_mut(&id) {
            entry.task = Some(task);
        }
    }

    /// Look up a lease by id
    pub fn get(&self, id: &str) -> Option<Lease> {
        self.inner.lock_entries().get(id).map(|e| e.lease.clone())
    }

    /// Look up a lease by id, failing with [`Error::LeaseExpired`] if it has
    /// been evicted or revoked
    pub fn lookup(&self, id: &str) -> Result<Lease> {
        self.get(id).ok_or_else(|| Error::LeaseExpired {
            lease_id: id.to_string(),
        })
    }

    /// Current lifecycle state of a tracked lease
    pub fn state(&self, id: &str) -> Option<LeaseState> {
        self.inner.lock_entries().get(id).map(|e| e.state)
    }

    /// Number of leases currently tracked
    pub fn active_count(&self) -> usize {
        self.inner.lock_entries().len()
    }

    /// Revoke a lease: cancel its timer, remove it, and tell the server
    pub async fn revoke(&self, id: &str) -> Result<()> {
        let entry = self.inner.lock_entries().remove(id);
        let Some(mut entry) = entry else {
            return Err(Error::LeaseExpired {
                lease_id: id.to_string(),
            });
        };
        entry.state = LeaseState::Revoked;
        if let Some(task) = entry.task.take() {
            task.abort();
        }

        let token = self.inner.current_token();
        let request = if entry.lease.secret_path.is_none() {
            Request::post(self.inner.endpoints.token_revoke_self(), serde_json::json!({}))
                .with_path("auth/token/revoke-self")
                .idempotent(true)
        } else {
            Request::put(
                self.inner.endpoints.lease_revoke(),
                serde_json::json!({ "lease_id": id }),
            )
            .with_path("sys/leases/revoke")
            .idempotent(true)
        };
        let _ = self.inner.transport.send(&request, token.as_ref()).await?;
        info!(lease_id = %id, "lease revoked");
        Ok(())
    }

    /// Stop all renewal tasks and drop every tracked lease
    ///
    /// Server-side state is untouched; use [`LeaseManager::revoke`] for that.
    pub fn shutdown(&self) {
        let mut entries = self.inner.lock_entries();
        for (_, mut entry) in entries.drain() {
            if let Some(task) = entry.task.take() {
                task.abort();
            }
        }
    }
}

impl Inner {
    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, LeaseEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_token(&self) -> Option<SecretString> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// One renewal call; token leases renew themselves, dynamic leases go
    /// through the sys lease API. The transport's retry policy applies.
    async fn renew(&self, id: &str, is_token_lease: bool) -> Result<Duration> {
        let token = self.current_token();
        let request = if is_token_lease {
            Request::post(self.endpoints.token_renew_self(), serde_json::json!({}))
                .with_path("auth/token/renew-self")
                .idempotent(true)
        } else {
            let mut body = serde_json::json!({ "lease_id": id });
            if let Some(increment) = self.config.renew_increment {
                body["increment"] = serde_json::json!(increment.as_secs());
            }
            Request::put(self.endpoints.lease_renew(), body)
                .with_path("sys/leases/renew")
                .idempotent(true)
        };

        let response = self.transport.send(&request, token.as_ref()).await?;
        let parsed: VaultResponse = response.json()?;
        let seconds = match parsed.auth {
            Some(auth) => auth.lease_duration,
            None => parsed.lease_duration,
        };
        if seconds == 0 {
            return Err(Error::Other(format!(
                "renewal response for lease {id} carried no lease duration"
            )));
        }
        Ok(Duration::from_secs(seconds))
    }

    /// Remove an entry in a terminal state
    fn remove(&self, id: &str, state: LeaseState) {
        let mut entries = self.lock_entries();
        if let Some(mut entry) = entries.remove(id) {
            entry.state = state;
            info!(lease_id = %id, ?state, "lease removed");
        }
    }
}

/// Eviction task for a non-renewable lease: fires exactly at expiry
///
/// Holds the manager weakly and only upgrades around map access, so the task
/// cannot keep a dropped manager alive through its sleep.
async fn expiry_watch(weak: Weak<Inner>, id: String) {
    let expires_at = {
        let Some(inner) = weak.upgrade() else { return };
        let entries = inner.lock_entries();
        match entries.get(&id) {
            Some(entry) => entry.lease.expires_at(),
            None => return,
        }
    };
    sleep_until(expires_at).await;
    let Some(inner) = weak.upgrade() else { return };
    inner.remove(&id, LeaseState::Expired);
}

/// Renewal task for one renewable lease
///
/// Independent of all other leases; the only shared state it touches is the
/// entry map, and only for snapshot/update. The manager is held weakly and
/// upgraded per step: once the last manager handle is gone, the task exits at
/// its next wake instead of renewing abandoned leases forever.
async fn renew_loop(weak: Weak<Inner>, id: String) {
    loop {
        let (renew_at, ttl, is_token_lease) = {
            let Some(inner) = weak.upgrade() else { return };
            let entries = inner.lock_entries();
            let Some(entry) = entries.get(&id) else { return };
            (
                renewal_point(entry.lease.issued_at, entry.lease.ttl, &inner.config),
                entry.lease.ttl,
                entry.lease.secret_path.is_none(),
            )
        };

        sleep_until(renew_at).await;

        // One more attempt after a fraction of the ttl, bounded by expiry.
        let (retry_at, expires_at) = {
            let Some(inner) = weak.upgrade() else { return };
            {
                let mut entries = inner.lock_entries();
                let Some(entry) = entries.get_mut(&id) else { return };
                entry.state = LeaseState::RenewalScheduled;
            }

            match inner.renew(&id, is_token_lease).await {
                Ok(new_ttl) => {
                    let mut entries = inner.lock_entries();
                    let Some(entry) = entries.get_mut(&id) else { return };
                    entry.lease.issued_at = OffsetDateTime::now_utc();
                    entry.lease.ttl = new_ttl;
                    entry.state = LeaseState::Active;
                    debug!(lease_id = %id, new_ttl_secs = new_ttl.as_secs(), "lease renewed");
                    continue;
                }
                Err(err) => {
                    warn!(lease_id = %id, error = %err, "lease renewal failed, scheduling one retry");
                    let entries = inner.lock_entries();
                    let Some(entry) = entries.get(&id) else { return };
                    let expires_at = entry.lease.expires_at();
                    (
                        (OffsetDateTime::now_utc()
                            + ttl.mul_f64(inner.config.renew_retry_fraction))
                        .min(expires_at),
                        expires_at,
                    )
                }
            }
        };

        if retry_at >= expires_at {
            sleep_until(expires_at).await;
            let Some(inner) = weak.upgrade() else { return };
            warn!(lease_id = %id, "lease expired before retry window");
            inner.remove(&id, LeaseState::Expired);
            return;
        }

        sleep_until(retry_at).await;

        let Some(inner) = weak.upgrade() else { return };
        match inner.renew(&id, is_token_lease).await {
            Ok(new_ttl) => {
                let mut entries = inner.lock_entries();
                let Some(entry) = entries.get_mut(&id) else { return };
                entry.lease.issued_at = OffsetDateTime::now_utc();
                entry.lease.ttl = new_ttl;
                entry.state = LeaseState::Active;
                debug!(lease_id = %id, new_ttl_secs = new_ttl.as_secs(), "lease renewed on retry");
            }
            Err(err) => {
                warn!(lease_id = %id, error = %err, "second renewal attempt failed, evicting lease");
                inner.remove(&id, LeaseState::Expired);
                return;
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in entries.drain() {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
    }
}
