//! Fixtures for tests that issue or verify tokens.
//!
//! Feature-gated behind `testutil`:
//!
//! ```toml
//! [dev-dependencies]
//! sisjwt = { path = "../sisjwt", features = ["testutil"] }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use sisjwt_kms::testutil::TEST_SIGNING_ALGORITHM;

use crate::{
    algorithm::{SigningAlgorithm, VerificationKey, hmac_sha512},
    codec::Claims,
    error::Result,
    options::SisJwtOptions,
    runtime::{Runtime, TOKEN_TYPE_V1},
};

/// Issuer used by fixtures.
pub const TEST_ISSUER: &str = "SISi";

/// Audience used by fixtures.
pub const TEST_AUDIENCE: &str = "SISa";

/// Valid development sign options.
pub fn dev_options() -> Arc<SisJwtOptions> {
    Arc::new(
        SisJwtOptions::builder()
            .runtime(Runtime::development())
            .iss(TEST_ISSUER)
            .aud(TEST_AUDIENCE)
            .build(),
    )
}

/// Fully KMS-configured sign options for `key_id` in `region`.
pub fn kms_options(key_id: &str, region: &str, runtime: Runtime) -> Arc<SisJwtOptions> {
    Arc::new(
        SisJwtOptions::builder()
            .runtime(runtime)
            .token_type(TOKEN_TYPE_V1)
            .key_id(key_id)
            .key_alg(TEST_SIGNING_ALGORITHM)
            .aws_region(region)
            .iss(TEST_ISSUER)
            .aud(TEST_AUDIENCE)
            .build(),
    )
}

/// Unwraps a JSON object into claims.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn claims(value: Value) -> Claims {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Builds a token with arbitrary header and payload, HMAC-SHA512 signed with
/// `secret`. Nothing is validated, so tests can forge whatever they need.
///
/// # Panics
///
/// Panics if `secret` cannot key HMAC-SHA512.
pub fn craft_token(header: &Value, payload: &Value, secret: &[u8]) -> String {
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );
    let signature = hmac_sha512(secret, signing_input.as_bytes()).expect("secret must key HMAC");
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
}

/// HMAC-SHA512 algorithm that accepts exactly one token type and never
/// touches a key-management service.
#[derive(Debug, Clone)]
pub struct HmacOnly {
    name: String,
}

impl HmacOnly {
    /// An algorithm issuing and accepting `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl SigningAlgorithm for HmacOnly {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_valid_name(&self, candidate: &str) -> bool {
        candidate == self.name
    }

    async fn sign(&self, data: &[u8], signing_key: &[u8]) -> Result<Vec<u8>> {
        hmac_sha512(signing_key, data)
    }

    async fn verify(&self, data: &[u8], signature: &[u8], key: &VerificationKey) -> Result<bool> {
        match key {
            VerificationKey::SharedSecret(secret) => Ok(hmac_sha512(secret, data)? == signature),
            VerificationKey::Kms { .. } => Ok(false),
        }
    }
}

/// Asserts that a result is an error of the given
/// [`SisJwtError`](crate::SisJwtError) variant.
///
/// # Examples
///
/// ```ignore
/// // Requires the `testutil` feature to be enabled.
/// use sisjwt::{SisJwtError, assert_sisjwt_error};
///
/// let result: sisjwt::Result<()> = Err(SisJwtError::key_not_found("k"));
/// assert_sisjwt_error!(result, KeyNotFound);
/// ```
#[macro_export]
macro_rules! assert_sisjwt_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::SisJwtError::$variant { .. })),
            "expected SisJwtError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::SisJwtError::$variant { .. })),
            "{}: expected SisJwtError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}
