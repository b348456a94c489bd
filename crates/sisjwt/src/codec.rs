//! Compact token encoding.
//!
//! A token is three base64url (unpadded) segments joined by `.`: the JSON
//! header, the JSON payload, and the signature over `header.payload`. The
//! codec frames and unframes tokens and delegates the cryptography to a
//! [`SigningAlgorithm`]. It does not judge claims; expiry and audience are the
//! verification policy's business.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    algorithm::{SigningAlgorithm, VerificationKey},
    error::Result,
    headers::Headers,
};

/// Decoded token payload.
pub type Claims = Map<String, Value>;

/// Reasons a token cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The token does not have exactly three segments.
    #[error("Not enough or too many segments")]
    MalformedToken,

    /// A segment is not valid base64url.
    #[error("Invalid segment encoding")]
    InvalidEncoding {
        /// Which segment failed.
        segment: &'static str,
    },

    /// The header or payload is not a JSON object.
    #[error("Invalid {segment} JSON: {message}")]
    InvalidJson {
        /// Which segment failed.
        segment: &'static str,
        /// Parser message.
        message: String,
    },

    /// The header has no string `alg`.
    #[error("No algorithm specified in the token header")]
    MissingAlgorithm,

    /// The header's `alg` is not accepted by the verifying algorithm.
    #[error("Expected a different algorithm")]
    AlgorithmNotAllowed(String),

    /// The signature does not match.
    #[error("Signature verification failed")]
    SignatureMismatch,
}

/// Encodes and signs a token.
///
/// `alg` is always set from [`SigningAlgorithm::name`], overriding any `alg`
/// in `headers`.
///
/// # Errors
///
/// Propagates signing failures from `algorithm`.
pub async fn encode(
    payload: &Claims,
    secret: &[u8],
    algorithm: &dyn SigningAlgorithm,
    headers: Map<String, Value>,
) -> Result<String> {
    let mut header = headers;
    header.insert("alg".to_owned(), Value::String(algorithm.name().to_owned()));

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(Value::Object(header).to_string()),
        URL_SAFE_NO_PAD.encode(Value::Object(payload.clone()).to_string())
    );
    let signature = algorithm.sign(signing_input.as_bytes(), secret).await?;

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Decodes a token, verifying its signature when `verify` is set.
///
/// `key_finder` sees the decoded header and payload and returns the key to
/// verify with. It is only called when verifying, and only after the header's
/// `alg` has been accepted by `algorithm`.
///
/// # Errors
///
/// - [`DecodeError`] (wrapped in [`SisJwtError::Decode`](crate::SisJwtError::Decode)) for
///   framing, encoding, algorithm and signature problems.
/// - Anything `algorithm.verify` raises.
pub async fn decode<F>(
    token: &str,
    verify: bool,
    algorithm: &dyn SigningAlgorithm,
    key_finder: F,
) -> Result<(Claims, Headers)>
where
    F: FnOnce(&Headers, &Claims) -> VerificationKey + Send,
{
    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
        return Err(DecodeError::MalformedToken.into());
    };

    let headers = Headers::from(decode_object(header_b64, "header")?);
    let payload = decode_object(payload_b64, "payload")?;

    if verify {
        let alg = headers.get_str("alg").ok_or(DecodeError::MissingAlgorithm)?;
        if !algorithm.is_valid_name(alg) {
            tracing::warn!(alg, "token algorithm not accepted");
            return Err(DecodeError::AlgorithmNotAllowed(alg.to_owned()).into());
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| DecodeError::InvalidEncoding { segment: "signature" })?;
        let key = key_finder(&headers, &payload);
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];

        if !algorithm.verify(signing_input.as_bytes(), &signature, &key).await? {
            return Err(DecodeError::SignatureMismatch.into());
        }
    }

    Ok((payload, headers))
}

fn decode_object(segment: &str, name: &'static str) -> std::result::Result<Claims, DecodeError> {
    let bytes =
        URL_SAFE_NO_PAD.decode(segment).map_err(|_| DecodeError::InvalidEncoding { segment: name })?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DecodeError::InvalidJson {
            segment: name,
            message: format!("expected an object, found {}", json_kind(&other)),
        }),
        Err(err) => Err(DecodeError::InvalidJson { segment: name, message: err.to_string() }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
