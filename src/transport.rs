//! Retrying HTTP transport
//!
//! The transport owns no secret semantics: it takes a prepared [`Request`],
//! attaches the session token header, and applies the [`RetryPolicy`].
//!
//! Retry rules:
//! - a failure is retried only when its [`ErrorCategory`] is in the policy's
//!   retryable set AND the request is idempotent (reads always are; writes only
//!   when the caller marks them so),
//! - backoff is exponential with jitter:
//!   `min(max_delay, base_delay * 2^n) * rand(0.5..1.0)`,
//! - a timeout on a single attempt consumes one attempt from the same budget,
//! - exhausting `max_attempts` surfaces [`Error::TransportExhausted`] carrying
//!   the last underlying error.

use crate::errors::{Error, ErrorCategory, ErrorResponse, Result};
use crate::util::generate_request_id;
use rand::Rng;
use reqwest::{Client as HttpClient, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Vault session token header
const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Retry configuration, shared read-only across requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget per operation (first try included)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay, before jitter
    pub max_delay: Duration,
    /// Failure categories worth retrying
    pub retryable: Vec<ErrorCategory>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(crate::DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(crate::DEFAULT_MAX_DELAY_MS),
            retryable: vec![
                ErrorCategory::NetworkTimeout,
                ErrorCategory::Server,
                ErrorCategory::RateLimited,
            ],
        }
    }
}

impl RetryPolicy {
    /// Whether an error's category is in the retryable set
    pub fn is_retryable(&self, err: &Error) -> bool {
        self.retryable.contains(&err.category())
    }

    /// Jittered exponential delay before retry number `n` (zero-based)
    fn delay_for(&self, n: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(n));
        let capped = exp.min(self.max_delay);
        capped.mul_f64(rand::thread_rng().gen_range(0.5..1.0))
    }
}

/// A request handed to the transport
///
/// Carries everything the transport needs and nothing it doesn't: the secret
/// semantics of the path stay with the caller.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: String,
    /// Logical path for error reporting; defaults to the URL
    pub(crate) path: String,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) idempotent: bool,
}

impl Request {
    /// A GET request; reads are always idempotent
    pub fn get(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method: Method::GET,
            path: url.clone(),
            url,
            body: None,
            idempotent: true,
        }
    }

    /// A POST request; writes are not idempotent unless marked so
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        let url = url.into();
        Self {
            method: Method::POST,
            path: url.clone(),
            url,
            body: Some(body),
            idempotent: false,
        }
    }

    /// A PUT request; writes are not idempotent unless marked so
    pub fn put(url: impl Into<String>, body: serde_json::Value) -> Self {
        let url = url.into();
        Self {
            method: Method::PUT,
            path: url.clone(),
            url,
            body: Some(body),
            idempotent: false,
        }
    }

    /// Override the idempotency flag
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Set the logical path used in error messages
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// A structured response from the vault service
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code (always 2xx; failures become errors)
    pub status: u16,
    body: serde_json::Value,
}

impl Response {
    /// Deserialize the response body
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).map_err(Error::from)
    }

    /// The raw response body; `Null` for empty (204) responses
    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }
}

/// HTTP transport with retry/backoff
///
/// Cheap to clone behind the client; holds only the connection pool and the
/// immutable policy.
#[derive(Debug, Clone)]
pub struct Transport {
    http: HttpClient,
    policy: RetryPolicy,
}

impl Transport {
    /// Create a transport over an existing connection pool
    pub(crate) fn new(http: HttpClient, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    /// The active retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Issue a request, retrying per policy, authenticated with `token`
    pub async fn send(&self, request: &Request, token: Option<&SecretString>) -> Result<Response> {
        let mut attempts = 0u32;
        loop {
            match self.attempt(request, token).await {
                Ok(response) => {
                    if attempts > 0 {
                        debug!(path = %request.path, attempts = attempts + 1, "request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(err) => {
                    attempts += 1;
                    if !request.idempotent || !self.policy.is_retryable(&err) {
                        return Err(err);
                    }
                    if attempts >= self.policy.max_attempts {
                        warn!(path = %request.path, attempts, error = %err, "retry budget exhausted");
                        return Err(Error::TransportExhausted {
                            attempts,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.policy.delay_for(attempts - 1);
                    debug!(
                        path = %request.path,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One network attempt; the reqwest client applies the per-attempt timeout
    async fn attempt(&self, request: &Request, token: Option<&SecretString>) -> Result<Response> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .header("X-Request-ID", generate_request_id());

        if let Some(token) = token {
            builder = builder.header(VAULT_TOKEN_HEADER, token.expose_secret().as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(Error::from)?;
        let status = response.status();
        trace!(path = %request.path, status = status.as_u16(), "vault response");

        if !status.is_success() {
            return Err(self.error_from_response(status, request, response).await);
        }

        let body = if status == StatusCode::NO_CONTENT {
            serde_json::Value::Null
        } else {
            let bytes = response.bytes().await.map_err(Error::from)?;
            if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes)?
            }
        };

        Ok(Response {
            status: status.as_u16(),
            body,
        })
    }

    /// Map a non-2xx response to a typed error, keeping vault's own messages
    async fn error_from_response(
        &self,
        status: StatusCode,
        request: &Request,
        response: reqwest::Response,
    ) -> Error {
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) if !body.errors.is_empty() => body.errors.join("; "),
            _ => format!("HTTP error {}", status.as_u16()),
        };

        match status.as_u16() {
            404 => Error::NotFound {
                path: request.path.clone(),
            },
            400 => Error::InvalidPath {
                path: request.path.clone(),
                message,
            },
            s => Error::Http { status: s, message },
        }
    }
}
