//! Vault API endpoint URL construction

use crate::util::encode_path;

/// Vault API v1 base path
pub const API_V1_BASE: &str = "/v1";

/// Endpoint builder
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    /// Create a new endpoints builder
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the full URL for a path
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // Secrets

    /// Read or write a secret at a hierarchical vault path
    pub fn secret(&self, path: &str) -> String {
        self.url(&format!("{}/{}", API_V1_BASE, encode_path(path)))
    }

    // Auth

    /// Login endpoint for a role-based auth mount (e.g. `auth/approle/login`)
    pub fn login(&self, mount: &str) -> String {
        self.url(&format!("{}/auth/{}/login", API_V1_BASE, encode_path(mount)))
    }

    /// Self-lookup for a static token (discovers ttl and renewability)
    pub fn token_lookup_self(&self) -> String {
        self.url(&format!("{}/auth/token/lookup-self", API_V1_BASE))
    }

    /// Self-renewal for the session token
    pub fn token_renew_self(&self) -> String {
        self.url(&format!("{}/auth/token/renew-self", API_V1_BASE))
    }

    /// Self-revocation for the session token (logout)
    pub fn token_revoke_self(&self) -> String {
        self.url(&format!("{}/auth/token/revoke-self", API_V1_BASE))
    }

    // Leases

    /// Renew a dynamic secret lease by id
    pub fn lease_renew(&self) -> String {
        self.url(&format!("{}/sys/leases/renew", API_V1_BASE))
    }

    /// Revoke a lease by id
    pub fn lease_revoke(&self) -> String {
        self.url(&format!("{}/sys/leases/revoke", API_V1_BASE))
    }
}
