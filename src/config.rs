use crate::{
    auth::Credentials,
    errors::{Error, Result},
    lease::RenewalConfig,
    transport::RetryPolicy,
};
use std::time::Duration;

/// Client configuration
///
/// Immutable once built; every tunable the retry, renewal, and refresh
/// machinery consumes is fixed at construction time.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the vault service
    pub base_url: String,
    /// Credential variant the session authenticates with
    pub credentials: Credentials,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Retry/backoff policy shared by all requests
    pub retry: RetryPolicy,
    /// Lease renewal scheduling
    pub renewal: RenewalConfig,
    /// Fraction of token ttl reserved as refresh lead time
    pub safety_margin_fraction: f64,
    /// Minimum refresh lead time regardless of ttl
    pub min_safety_margin: Duration,
    /// User agent suffix
    pub user_agent_suffix: Option<String>,
}

/// Builder for creating a configured [`Client`](crate::Client)
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    credentials: Option<Credentials>,
    timeout_ms: u64,
    retry: RetryPolicy,
    renewal: RenewalConfig,
    safety_margin_fraction: f64,
    min_safety_margin_secs: u64,
    user_agent_suffix: Option<String>,
}

impl ClientBuilder {
    /// Create a new client builder with the given base URL
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the vault service (e.g. `"https://vault.example.com"`)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: None,
            timeout_ms: crate::DEFAULT_TIMEOUT_MS,
            retry: RetryPolicy::default(),
            renewal: RenewalConfig::default(),
            safety_margin_fraction: crate::DEFAULT_SAFETY_MARGIN_FRACTION,
            min_safety_margin_secs: crate::DEFAULT_MIN_SAFETY_MARGIN_SECS,
            user_agent_suffix: None,
        }
    }

    /// Set the credential variant used to authenticate
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the per-attempt request timeout in milliseconds
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the total attempt budget for retryable requests
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Set the base backoff delay in milliseconds
    pub fn base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.retry.base_delay = Duration::from_millis(base_delay_ms);
        self
    }

    /// Set the backoff delay cap in milliseconds
    pub fn max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.retry.max_delay = Duration::from_millis(max_delay_ms);
        self
    }

    /// Replace the whole retry policy, including the retryable category set
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the fraction of a lease's ttl after which renewal is attempted
    pub fn renew_before_fraction(mut self, fraction: f64) -> Self {
        self.renewal.renew_before_fraction = fraction;
        self
    }

    /// Set the minimum lead time (seconds) before expiry for renewal attempts
    pub fn renew_floor_secs(mut self, secs: u64) -> Self {
        self.renewal.renew_floor = Duration::from_secs(secs);
        self
    }

    /// Set the fraction of ttl to wait before the single post-failure
    /// renewal retry
    pub fn renew_retry_fraction(mut self, fraction: f64) -> Self {
        self.renewal.renew_retry_fraction = fraction;
        self
    }

    /// Request a specific renewal increment in seconds (the server may
    /// shorten or extend it)
    pub fn renew_increment_secs(mut self, secs: u64) -> Self {
        self.renewal.renew_increment = Some(Duration::from_secs(secs));
        self
    }

    /// Set the fraction of token ttl reserved as refresh lead time
    pub fn safety_margin_fraction(mut self, fraction: f64) -> Self {
        self.safety_margin_fraction = fraction;
        self
    }

    /// Set the minimum refresh lead time in seconds
    pub fn min_safety_margin_secs(mut self, secs: u64) -> Self {
        self.min_safety_margin_secs = secs;
        self
    }

    /// Add a custom user agent suffix
    pub fn user_agent_extra(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    /// Build the client with the configured options
    pub fn build(self) -> Result<crate::Client> {
        let url = self.base_url.trim_end_matches('/');
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Config(
                "Base URL must start with http:// or https://".to_string(),
            ));
        }

        let credentials = self.credentials.ok_or_else(|| {
            Error::Config(
                "Credentials are required. Use .credentials() to select an auth method".to_string(),
            )
        })?;

        if self.retry.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        for (name, value) in [
            ("renew_before_fraction", self.renewal.renew_before_fraction),
            ("renew_retry_fraction", self.renewal.renew_retry_fraction),
            ("safety_margin_fraction", self.safety_margin_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within 0.0..=1.0")));
            }
        }

        let config = ClientConfig {
            base_url: url.to_string(),
            credentials,
            timeout: Duration::from_millis(self.timeout_ms),
            retry: self.retry,
            renewal: self.renewal,
            safety_margin_fraction: self.safety_margin_fraction,
            min_safety_margin: Duration::from_secs(self.min_safety_margin_secs),
            user_agent_suffix: self.user_agent_suffix,
        };

        crate::client::Client::new(config)
    }
}
