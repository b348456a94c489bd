//! KMS error types and result alias.
//!
//! Every [`KmsClient`](crate::KmsClient) implementation maps its internal
//! failures onto [`KmsError`]. Two variants carry meaning for callers beyond
//! "something went wrong":
//!
//! - [`KmsError::NotFound`] - the service does not know the key id. Key
//!   resolution treats this as "try the next candidate".
//! - [`KmsError::InvalidSignature`] - the key exists but the signature does
//!   not match. Verification treats this as a `false` outcome, not a failure.
//!
//! # Example
//!
//! ```
//! use sisjwt_kms::{KmsError, KmsResult};
//!
//! fn lookup(key_id: &str) -> KmsResult<()> {
//!     Err(KmsError::not_found(key_id))
//! }
//!
//! assert!(lookup("alias/missing").unwrap_err().is_not_found());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A shared error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for KMS operations.
pub type KmsResult<T> = Result<T, KmsError>;

/// Errors that can occur while talking to a key-management service.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` so new service conditions can be
/// mapped without a semver-breaking change. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum KmsError {
    /// The service has no key with this id in the client's region.
    #[error("Key not found: {key_id}")]
    NotFound {
        /// The key id that was not found.
        key_id: String,
    },

    /// The key exists but the signature does not verify.
    #[error("Signature is invalid")]
    InvalidSignature,

    /// The key cannot be used for the requested operation or algorithm.
    #[error("Invalid key usage for {key_id}: {message}")]
    InvalidKeyUsage {
        /// The key id that rejected the request.
        key_id: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The key exists but is disabled.
    #[error("Key is disabled: {key_id}")]
    Disabled {
        /// The disabled key id.
        key_id: String,
    },

    /// The client itself is misconfigured (region, profile, credentials).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Network or transport failure reaching the service.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The request did not complete within the configured time limit.
    #[error("Operation timeout")]
    Timeout,

    /// Any other service-side failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },
}

impl KmsError {
    /// Creates a new `NotFound` error for the given key id.
    #[must_use]
    pub fn not_found(key_id: impl Into<String>) -> Self {
        Self::NotFound { key_id: key_id.into() }
    }

    /// Creates a new `InvalidSignature` error.
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates a new `InvalidKeyUsage` error.
    #[must_use]
    pub fn invalid_key_usage(key_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKeyUsage { key_id: key_id.into(), message: message.into() }
    }

    /// Creates a new `Disabled` error.
    #[must_use]
    pub fn disabled(key_id: impl Into<String>) -> Self {
        Self::Disabled { key_id: key_id.into() }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` if the service reported the key id as unknown.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the service rejected the signature.
    #[must_use]
    pub fn is_invalid_signature(&self) -> bool {
        matches!(self, Self::InvalidSignature)
    }
}
