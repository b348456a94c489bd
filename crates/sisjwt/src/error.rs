//! Error types for token signing and verification.
//!
//! Only configuration and infrastructure problems surface as [`SisJwtError`].
//! A token that fails verification is never an error: it produces a
//! [`VerificationResult`](crate::VerificationResult) whose error list says why.

use std::path::PathBuf;

use sisjwt_kms::KmsError;
use thiserror::Error;

use crate::codec::DecodeError;

/// Result type alias for sisjwt operations.
pub type Result<T> = std::result::Result<T, SisJwtError>;

/// Errors raised by sisjwt.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SisJwtError {
    /// Options failed validation; signing is not allowed.
    #[error("KMS is not configured properly, KMS signing not allowed!\n{messages}")]
    Configuration {
        /// Accumulated validation messages.
        messages: String,
    },

    /// No key resolution strategy located the verification key.
    #[error("key_id not found: '{key_id}'")]
    KeyNotFound {
        /// The key id carried by the token.
        key_id: String,
    },

    /// The token could not be decoded or its signature did not match.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The key-management service failed for a reason other than an unknown
    /// key or a signature mismatch.
    #[error("KMS error: {0}")]
    Kms(#[from] KmsError),

    /// Unknown options mode.
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// The ARN inventory file is unusable.
    #[error("{0}")]
    InventoryFile(String),

    /// A referenced file does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl SisJwtError {
    /// Creates a new `Configuration` error from accumulated messages.
    #[must_use]
    pub fn configuration(messages: impl Into<String>) -> Self {
        Self::Configuration { messages: messages.into() }
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(key_id: impl Into<String>) -> Self {
        Self::KeyNotFound { key_id: key_id.into() }
    }

    /// Creates a new `InventoryFile` error.
    #[must_use]
    pub fn inventory_file(message: impl Into<String>) -> Self {
        Self::InventoryFile(message.into())
    }

    /// Returns `true` if this error describes a rejected token rather than a
    /// broken environment.
    ///
    /// These are the errors the token façade folds into a
    /// [`VerificationResult`](crate::VerificationResult).
    #[must_use]
    pub fn is_token_rejection(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::KeyNotFound { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn key_not_found_message_quotes_key() {
        let err = SisJwtError::key_not_found("arn:aws:kms:us-east-1:1:key/x");
        assert_eq!(err.to_string(), "key_id not found: 'arn:aws:kms:us-east-1:1:key/x'");
        assert!(err.is_token_rejection());
    }

    #[test]
    fn configuration_message_leads_with_summary() {
        let err = SisJwtError::configuration("Errors:\n\tiss can't be blank");
        let rendered = err.to_string();
        assert!(rendered.starts_with("KMS is not configured properly"));
        assert!(rendered.contains("not configured properly"));
        assert!(rendered.ends_with("iss can't be blank"));
        assert!(!err.is_token_rejection());
    }

    #[test]
    fn decode_errors_are_transparent() {
        let err: SisJwtError = DecodeError::SignatureMismatch.into();
        assert_eq!(err.to_string(), "Signature verification failed");
        assert!(err.is_token_rejection());
    }

    #[test]
    fn kms_errors_are_not_rejections() {
        let err: SisJwtError = KmsError::timeout().into();
        assert!(!err.is_token_rejection());
        assert_eq!(err.to_string(), "KMS error: Operation timeout");
    }
}
