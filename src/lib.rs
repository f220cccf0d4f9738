//! Vault lease SDK for Rust
//!
//! A client library for secrets-management vault services, built around the
//! session and lease lifecycle: token-based authentication with single-flight
//! refresh, automatic background renewal of dynamic secret leases, and a
//! retrying transport that keeps both resilient on a flaky network.
//!
//! # Features
//!
//! - Async/await support with the tokio runtime
//! - Automatic retries with exponential backoff and jitter
//! - Single-flight token refresh with a configurable safety margin
//! - Per-lease renewal tasks with half-life scheduling
//! - Pluggable credential variants (static token, AppRole)
//! - Secure token handling via `secrecy`
//! - Categorized error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use vault_lease_sdk::{ClientBuilder, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new("https://vault.example.com")
//!         .credentials(Credentials::app_role("role-id", "secret-id"))
//!         .build()?;
//!
//!     let record = client.read("database/creds/readonly").await?;
//!     println!("fetched {} keys", record.data.len());
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs, missing_debug_implementations, unsafe_code)]

mod auth;
mod client;
mod config;
mod endpoints;
mod errors;
mod lease;
mod models;
mod transport;
mod util;

pub use auth::{AuthSession, Credentials};
pub use client::Client;
pub use config::{ClientBuilder, ClientConfig};
pub use errors::{Error, ErrorCategory, Result};
pub use lease::{LeaseManager, RenewalConfig};
pub use models::{Lease, LeaseState, SecretRecord, Token};
pub use transport::RetryPolicy;

// Re-export commonly used types
pub use secrecy::SecretString;

/// SDK version, matches Cargo.toml version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default per-attempt timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default total attempt budget per operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff delay in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Default backoff delay cap in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Default fraction of a lease's ttl after which renewal is attempted
pub const DEFAULT_RENEW_BEFORE_FRACTION: f64 = 0.5;

/// Default minimum lead time before expiry for renewal attempts, in seconds
pub const DEFAULT_RENEW_FLOOR_SECS: u64 = 10;

/// Default fraction of ttl to wait before the single post-failure renewal retry
pub const DEFAULT_RENEW_RETRY_FRACTION: f64 = 0.25;

/// Default fraction of token ttl reserved as refresh lead time
pub const DEFAULT_SAFETY_MARGIN_FRACTION: f64 = 0.1;

/// Default minimum refresh lead time in seconds
pub const DEFAULT_MIN_SAFETY_MARGIN_SECS: u64 = 5;
