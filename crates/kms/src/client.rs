//! The [`KmsClient`] trait and its request/response types.
//!
//! The boundary mirrors the two public operations a key-management service
//! exposes for asymmetric keys: `Sign` and `Verify`. Private key material
//! never crosses it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KmsResult;

/// How the service should interpret [`SignRequest::message`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// The message is the raw data; the service hashes it.
    #[default]
    Raw,
    /// The message is already a digest.
    Digest,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("RAW"),
            Self::Digest => f.write_str("DIGEST"),
        }
    }
}

/// Parameters for a `Sign` call.
#[derive(Clone, PartialEq, Eq)]
pub struct SignRequest {
    /// Key id, alias, or ARN of the signing key.
    pub key_id: String,
    /// Service-specific algorithm name, e.g. `RSASSA_PKCS1_V1_5_SHA_256`.
    pub signing_algorithm: String,
    /// Interpretation of `message`.
    pub message_type: MessageType,
    /// Bytes to sign.
    pub message: Vec<u8>,
}

impl SignRequest {
    /// Builds a request for a raw (unhashed) message.
    #[must_use]
    pub fn raw(
        key_id: impl Into<String>,
        signing_algorithm: impl Into<String>,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            signing_algorithm: signing_algorithm.into(),
            message_type: MessageType::Raw,
            message: message.into(),
        }
    }
}

impl fmt::Debug for SignRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignRequest")
            .field("key_id", &self.key_id)
            .field("signing_algorithm", &self.signing_algorithm)
            .field("message_type", &self.message_type)
            .field("message_len", &self.message.len())
            .finish()
    }
}

/// Result of a successful `Sign` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResponse {
    /// The key that produced the signature, as reported by the service.
    pub key_id: String,
    /// Algorithm used.
    pub signing_algorithm: String,
    /// Signature bytes.
    pub signature: Vec<u8>,
}

/// Parameters for a `Verify` call.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    /// Key id, alias, or ARN of the verification key.
    pub key_id: String,
    /// Algorithm the signature was produced with.
    pub signing_algorithm: String,
    /// Interpretation of `message`.
    pub message_type: MessageType,
    /// Signed bytes.
    pub message: Vec<u8>,
    /// Signature to check.
    pub signature: Vec<u8>,
}

impl VerifyRequest {
    /// Builds a request for a raw (unhashed) message.
    #[must_use]
    pub fn raw(
        key_id: impl Into<String>,
        signing_algorithm: impl Into<String>,
        message: impl Into<Vec<u8>>,
        signature: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            signing_algorithm: signing_algorithm.into(),
            message_type: MessageType::Raw,
            message: message.into(),
            signature: signature.into(),
        }
    }

    /// Returns a copy of this request addressed to a different key id.
    #[must_use]
    pub fn with_key_id(&self, key_id: impl Into<String>) -> Self {
        Self { key_id: key_id.into(), ..self.clone() }
    }
}

impl fmt::Debug for VerifyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyRequest")
            .field("key_id", &self.key_id)
            .field("signing_algorithm", &self.signing_algorithm)
            .field("message_type", &self.message_type)
            .field("message_len", &self.message.len())
            .field("signature_len", &self.signature.len())
            .finish()
    }
}

/// Result of a `Verify` call that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResponse {
    /// The key that checked the signature, as reported by the service.
    pub key_id: String,
    /// Algorithm used.
    pub signing_algorithm: String,
    /// Whether the signature matched.
    pub signature_valid: bool,
}

/// Client for an external key-management service.
///
/// Implementations must be thread-safe; one client is shared by every
/// sign and verify call in the process.
///
/// # Error contract
///
/// - An unknown key id yields [`KmsError::NotFound`](crate::KmsError::NotFound).
/// - A signature that does not match yields
///   [`KmsError::InvalidSignature`](crate::KmsError::InvalidSignature), not a
///   response with `signature_valid == false`.
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// The region this client sends requests to.
    fn region(&self) -> &str;

    /// Signs a message with the given key.
    async fn sign(&self, request: SignRequest) -> KmsResult<SignResponse>;

    /// Verifies a signature with the given key.
    async fn verify(&self, request: VerifyRequest) -> KmsResult<VerifyResponse>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn raw_requests_default_to_raw_message_type() {
        let sign = SignRequest::raw("k", "ECDSA_SHA_256", b"data".to_vec());
        assert_eq!(sign.message_type, MessageType::Raw);

        let verify = VerifyRequest::raw("k", "ECDSA_SHA_256", b"data".to_vec(), vec![1, 2]);
        assert_eq!(verify.message_type, MessageType::Raw);
    }

    #[test]
    fn with_key_id_keeps_everything_else() {
        let original = VerifyRequest::raw("a", "ALG", b"m".to_vec(), vec![9]);
        let swapped = original.with_key_id("b");
        assert_eq!(swapped.key_id, "b");
        assert_eq!(swapped.signing_algorithm, "ALG");
        assert_eq!(swapped.message, b"m");
        assert_eq!(swapped.signature, vec![9]);
    }

    #[test]
    fn debug_omits_message_bytes() {
        let request = SignRequest::raw("k", "ALG", b"secret-payload".to_vec());
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("secret-payload"));
        assert!(rendered.contains("message_len: 14"));
    }

    #[test]
    fn message_type_wire_names() {
        assert_eq!(MessageType::Raw.to_string(), "RAW");
        assert_eq!(MessageType::Digest.to_string(), "DIGEST");
    }
}
