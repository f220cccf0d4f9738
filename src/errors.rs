//! Error types and handling for the vault SDK
//!
//! The taxonomy mirrors what callers can actually act on:
//!
//! - **TransportExhausted**: the retry budget for one operation ran out; the
//!   whole operation may be retried later.
//! - **AuthenticationFailed**: the credential was rejected, or a refresh failed
//!   after the bounded one-retry policy. Fatal to the operation, not the process.
//! - **LeaseExpired**: a lease id was looked up after the manager evicted it;
//!   the caller must re-fetch the secret.
//! - **NotFound** / **InvalidPath**: vault-reported semantic errors, passed
//!   through untranslated apart from categorization.
//!
//! Transient transport errors are retried internally and never surface unless
//! exhausted. Lease renewal failures are absorbed (logged, not thrown) and only
//! become visible when a later lookup fails.
//!
//! # Example
//!
//! ```no_run
//! # use vault_lease_sdk::{Client, Error};
//! # async fn example(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
//! match client.read("secret/data/db").await {
//!     Ok(record) => println!("fetched at {}", record.fetched_at),
//!     Err(Error::NotFound { path }) => println!("no secret at {path}"),
//!     Err(Error::AuthenticationFailed(reason)) => println!("auth: {reason}"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Result type alias for the SDK
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SDK
#[derive(Error, Debug)]
pub enum Error {
    /// Retry budget exhausted on a single operation
    #[error("transport exhausted after {attempts} attempts: {last}")]
    TransportExhausted {
        /// Number of attempts issued before giving up
        attempts: u32,
        /// The last underlying error
        #[source]
        last: Box<Error>,
    },

    /// Credential rejected, or token refresh failed after one forced retry
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A lease id was looked up after its removal
    #[error("lease {lease_id} has expired or been revoked")]
    LeaseExpired {
        /// The stale lease id
        lease_id: String,
    },

    /// Vault reported no secret at the path
    #[error("not found: {path}")]
    NotFound {
        /// The requested path
        path: String,
    },

    /// Vault rejected the path or request shape
    #[error("invalid path {path}: {message}")]
    InvalidPath {
        /// The requested path
        path: String,
        /// Vault's error message, untranslated
        message: String,
    },

    /// Other HTTP error from the vault service
    #[error("http {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Error messages from the server, joined
        message: String,
    },

    /// Network error (connect/DNS/reset)
    #[error("network: {0}")]
    Network(String),

    /// Single attempt exceeded its timeout
    #[error("timeout")]
    Timeout,

    /// Failed to parse a server response
    #[error("deserialize: {0}")]
    Deserialize(String),

    /// Invalid client configuration
    #[error("config: {0}")]
    Config(String),

    /// Other errors
    #[error("other: {0}")]
    Other(String),
}

/// Failure categories used by the retry policy
///
/// A request is retried only when its failure category is listed in the
/// policy's retryable set and the request is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection failures and per-attempt timeouts
    NetworkTimeout,
    /// Server-side errors (5xx)
    Server,
    /// Rate limiting (429)
    RateLimited,
    /// Authentication/authorization rejections (401/403)
    Auth,
    /// Missing resources (404)
    NotFound,
    /// Malformed paths or requests (400)
    InvalidPath,
    /// Everything else
    Other,
}

impl Error {
    /// Get the failure category for retry classification
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network(_) | Error::Timeout => ErrorCategory::NetworkTimeout,
            Error::Http { status, .. } if *status == 429 => ErrorCategory::RateLimited,
            Error::Http { status, .. } if (500..600).contains(status) => ErrorCategory::Server,
            Error::Http { status, .. } if matches!(status, 401 | 403) => ErrorCategory::Auth,
            Error::AuthenticationFailed(_) => ErrorCategory::Auth,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::InvalidPath { .. } => ErrorCategory::InvalidPath,
            Error::TransportExhausted { last, .. } => last.category(),
            _ => ErrorCategory::Other,
        }
    }

    /// Get the HTTP status code if this error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::NotFound { .. } => Some(404),
            Error::InvalidPath { .. } => Some(400),
            _ => None,
        }
    }

    /// Whether this is a 401/403-class rejection, eligible for one forced
    /// re-authentication
    pub(crate) fn is_auth_rejection(&self) -> bool {
        matches!(self.status_code(), Some(401) | Some(403))
    }
}

/// Vault error response body: `{"errors": ["permission denied"]}`
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_connect() || err.is_request() {
            Error::Network(err.to_string())
        } else if err.is_decode() {
            Error::Deserialize(err.to_string())
        } else {
            Error::Other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> Error {
        Error::Http {
            status,
            message: "test".to_string(),
        }
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(Error::Timeout.category(), ErrorCategory::NetworkTimeout);
        assert_eq!(
            Error::Network("reset".into()).category(),
            ErrorCategory::NetworkTimeout
        );
        assert_eq!(http(500).category(), ErrorCategory::Server);
        assert_eq!(http(503).category(), ErrorCategory::Server);
        assert_eq!(http(429).category(), ErrorCategory::RateLimited);
        assert_eq!(http(401).category(), ErrorCategory::Auth);
        assert_eq!(http(403).category(), ErrorCategory::Auth);
        assert_eq!(
            Error::NotFound {
                path: "secret/x".into()
            }
            .category(),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn test_exhausted_inherits_category() {
        let err = Error::TransportExhausted {
            attempts: 3,
            last: Box::new(http(502)),
        };
        assert_eq!(err.category(), ErrorCategory::Server);
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_status_code() {
        assert_eq!(http(401).status_code(), Some(401));
        assert_eq!(
            Error::NotFound {
                path: "secret/x".into()
            }
            .status_code(),
            Some(404)
        );
        assert_eq!(Error::Timeout.status_code(), None);
    }

    #[test]
    fn test_auth_rejection() {
        assert!(http(401).is_auth_rejection());
        assert!(http(403).is_auth_rejection());
        assert!(!http(404).is_auth_rejection());
        assert!(!Error::Timeout.is_auth_rejection());
    }
}
