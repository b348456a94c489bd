//! The token façade.
//!
//! [`SisJwt`] is what applications hold: it stamps claims from
//! [`SisJwtOptions`], picks the headers, and turns decode failures into a
//! rejected [`VerificationResult`] instead of an error.

use std::{fmt, sync::Arc};

use serde_json::{Map, Value};
use sisjwt_kms::KmsClient;
use zeroize::Zeroizing;

use crate::{
    algorithm::{SigningAlgorithm, SisJwtV1, VerificationKey},
    arn_inventory::ArnInventory,
    clock::{Clock, SystemClock},
    codec::{self, Claims},
    error::Result,
    headers::Headers,
    options::SisJwtOptions,
    verification::VerificationResult,
};

/// Shared secret for development tokens.
pub const DEV_SHARED_SECRET: &[u8] = b"s3cr37";

/// Header naming the key-management signing algorithm.
pub const AWS_ALG_HEADER: &str = "AWS_ALG";

/// Header naming the signing key.
pub const KID_HEADER: &str = "kid";

/// Issues and verifies tokens for one set of options.
pub struct SisJwt {
    options: Arc<SisJwtOptions>,
    algorithm: Arc<dyn SigningAlgorithm>,
    clock: Arc<dyn Clock>,
    arn_inventory: Option<Arc<ArnInventory>>,
    shared_secret: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for SisJwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SisJwt")
            .field("token_type", &self.options.token_type())
            .field("kms_configured", &self.options.kms_configured())
            .field("arn_inventory", &self.arn_inventory.is_some())
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl SisJwt {
    /// Builds the façade.
    ///
    /// Without an `algorithm`, a [`SisJwtV1`] is built from `options` and
    /// `kms`.
    ///
    /// # Errors
    ///
    /// Returns [`SisJwtError::Configuration`](crate::SisJwtError::Configuration)
    /// when `options` are invalid or KMS is configured without a client.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use sisjwt::{Runtime, SisJwt, SisJwtOptions};
    ///
    /// # async fn example() -> sisjwt::Result<()> {
    /// let options = SisJwtOptions::builder()
    ///     .runtime(Runtime::development())
    ///     .iss("SISi")
    ///     .aud("SISa")
    ///     .build();
    /// let sisjwt = SisJwt::builder().options(Arc::new(options)).build()?;
    ///
    /// let token = sisjwt.encode(serde_json::Map::new()).await?;
    /// let mut result = sisjwt.verify(&token).await?;
    /// result.add_allowed_issuer("SISi");
    /// result.add_allowed_audience("SISa");
    /// assert!(result.is_valid());
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn new(
        options: Arc<SisJwtOptions>,
        kms: Option<Arc<dyn KmsClient>>,
        algorithm: Option<Arc<dyn SigningAlgorithm>>,
        clock: Option<Arc<dyn Clock>>,
        arn_inventory: Option<Arc<ArnInventory>>,
        #[builder(into)] shared_secret: Option<Vec<u8>>,
    ) -> Result<Self> {
        let algorithm = match algorithm {
            Some(algorithm) => algorithm,
            None => Arc::new(SisJwtV1::new(Arc::clone(&options), kms)?),
        };
        Ok(Self {
            options,
            algorithm,
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock)),
            arn_inventory,
            shared_secret: Zeroizing::new(
                shared_secret.unwrap_or_else(|| DEV_SHARED_SECRET.to_vec()),
            ),
        })
    }
}

impl SisJwt {
    /// A façade over the process-wide options from the environment.
    ///
    /// # Errors
    ///
    /// See [`SisJwt::builder`].
    pub fn from_current(kms: Option<Arc<dyn KmsClient>>) -> Result<Self> {
        Self::builder().options(Arc::new(SisJwtOptions::current().clone())).maybe_kms(kms).build()
    }

    /// Options tokens are issued with.
    #[must_use]
    pub fn options(&self) -> &SisJwtOptions {
        &self.options
    }

    /// Headers attached to every issued token, besides `alg`.
    #[must_use]
    pub fn encode_headers(&self) -> Map<String, Value> {
        let mut headers = Map::new();
        if let Some(key_id) = self.options.key_id() {
            headers.insert(KID_HEADER.to_owned(), Value::String(key_id.to_owned()));
        }
        if let Some(key_alg) = self.options.key_alg() {
            headers.insert(AWS_ALG_HEADER.to_owned(), Value::String(key_alg.to_owned()));
        }
        headers
    }

    /// Issues a token for `payload`.
    ///
    /// `iss` and `aud` always come from the options. `iat` and `exp` are kept
    /// when numeric and filled from the options otherwise. Null claims are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Propagates signing failures.
    #[tracing::instrument(skip_all, fields(token_type = %self.options.token_type()))]
    pub async fn encode(&self, mut payload: Claims) -> Result<String> {
        let now = self.clock.now();
        payload.insert("iss".to_owned(), optional_string(self.options.iss()));
        payload.insert("aud".to_owned(), optional_string(self.options.aud()));
        if !payload.get("iat").is_some_and(Value::is_number) {
            payload.insert("iat".to_owned(), Value::from(self.options.issued_at(now)));
        }
        if !payload.get("exp").is_some_and(Value::is_number) {
            payload.insert("exp".to_owned(), Value::from(self.options.expires_at(now)));
        }
        payload.retain(|_, value| !value.is_null());

        let headers = self.encode_headers();
        tracing::debug!(?headers, ?payload, "encoding token");
        codec::encode(&payload, &self.shared_secret, self.algorithm.as_ref(), headers).await
    }

    /// Decodes and checks `token`.
    ///
    /// Malformed tokens, signature mismatches and unknown keys come back as a
    /// rejected result. The caller still has to add the issuers and audiences
    /// it accepts.
    ///
    /// # Errors
    ///
    /// Key-management failures other than an unknown key or a bad signature.
    #[tracing::instrument(skip_all, fields(token_type = %self.options.token_type()))]
    pub async fn verify(&self, token: &str) -> Result<VerificationResult> {
        let kms_configured = self.options.kms_configured();
        let secret = &self.shared_secret;
        let key_finder = move |headers: &Headers, _: &Claims| {
            if kms_configured {
                VerificationKey::Kms {
                    algorithm: headers.get_str(AWS_ALG_HEADER).unwrap_or_default().to_owned(),
                    key_id: headers.get_str(KID_HEADER).unwrap_or_default().to_owned(),
                }
            } else {
                VerificationKey::shared_secret(secret.as_slice())
            }
        };

        match codec::decode(token, true, self.algorithm.as_ref(), key_finder).await {
            Ok((payload, headers)) => {
                let result = VerificationResult::builder()
                    .headers(headers)
                    .payload(payload)
                    .runtime(self.options.runtime())
                    .clock(Arc::clone(&self.clock))
                    .maybe_arn_inventory(self.arn_inventory.clone())
                    .build();
                tracing::debug!(valid = result.is_valid(), "token decoded");
                Ok(result)
            },
            Err(err) if err.is_token_rejection() => {
                tracing::error!(error = %err, "token rejected");
                let mut result = VerificationResult::error(
                    err.to_string(),
                    self.options.runtime(),
                    Arc::clone(&self.clock),
                );
                result.set_arn_inventory(self.arn_inventory.clone());
                Ok(result)
            },
            Err(err) => Err(err),
        }
    }
}

fn optional_string(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;
    use sisjwt_kms::testutil::{TEST_SIGNING_ALGORITHM, memory_kms_with_key};

    use super::*;
    use crate::{
        clock::FixedClock,
        runtime::{Runtime, TOKEN_TYPE_DEV, TOKEN_TYPE_V1},
        testutil::{HmacOnly, craft_token},
    };

    const NOW: i64 = 1_700_000_000;

    fn dev_sisjwt(clock: &FixedClock) -> SisJwt {
        let options = SisJwtOptions::builder()
            .runtime(Runtime::development())
            .iss("SISi")
            .aud("SISa")
            .build();
        SisJwt::builder()
            .options(Arc::new(options))
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap()
    }

    fn object(value: Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    fn accept_defaults(result: &mut VerificationResult) {
        result.add_allowed_issuer("SISi");
        result.add_allowed_audience("SISa");
    }

    #[tokio::test]
    async fn dev_round_trip() {
        let clock = FixedClock::new(NOW);
        let sisjwt = dev_sisjwt(&clock);
        let token = sisjwt.encode(object(json!({"sub": "user-1"}))).await.unwrap();

        let mut result = sisjwt.verify(&token).await.unwrap();
        accept_defaults(&mut result);
        assert!(result.is_valid(), "{:?}", result.errors());
        assert_eq!(result.token_type(), Some(TOKEN_TYPE_DEV));
        assert_eq!(result.payload()["sub"], json!("user-1"));
        assert_eq!(result.issued_at(), NOW);
        assert_eq!(result.expires_at(), NOW + 3_600);
        assert!(!result.headers().contains_key("kid"));
    }

    #[tokio::test]
    async fn encode_overrides_iss_and_aud_but_keeps_numeric_times() {
        let clock = FixedClock::new(NOW);
        let sisjwt = dev_sisjwt(&clock);
        let token = sisjwt
            .encode(object(json!({
                "iss": "someone-else",
                "aud": "elsewhere",
                "iat": NOW - 10,
                "exp": "soon",
                "dropped": null
            })))
            .await
            .unwrap();

        let result = sisjwt.verify(&token).await.unwrap();
        let payload = result.payload();
        assert_eq!(payload["iss"], json!("SISi"));
        assert_eq!(payload["aud"], json!("SISa"));
        assert_eq!(payload["iat"], json!(NOW - 10));
        assert_eq!(payload["exp"], json!(NOW + 3_600));
        assert!(!payload.contains_key("dropped"));
    }

    #[tokio::test]
    async fn tampered_token_is_a_rejected_result() {
        let clock = FixedClock::new(NOW);
        let sisjwt = dev_sisjwt(&clock);
        let token = sisjwt.encode(Map::new()).await.unwrap();
        let tampered = format!("{}AA", &token);

        let mut result = sisjwt.verify(&tampered).await.unwrap();
        accept_defaults(&mut result);
        assert!(!result.is_valid());
        assert_eq!(result.errors().on("base"), vec!["Signature verification failed"]);
        assert!(result.payload().is_empty());
    }

    #[tokio::test]
    async fn garbage_is_a_rejected_result() {
        let clock = FixedClock::new(NOW);
        let result = dev_sisjwt(&clock).verify("not a token").await.unwrap();
        assert_eq!(result.errors().on("base"), vec!["Not enough or too many segments"]);
    }

    #[tokio::test]
    async fn different_secret_does_not_verify() {
        let clock = FixedClock::new(NOW);
        let issuer = dev_sisjwt(&clock);
        let token = issuer.encode(Map::new()).await.unwrap();

        let verifier = SisJwt::builder()
            .options(Arc::new(issuer.options().clone()))
            .clock(Arc::new(clock))
            .shared_secret(b"other".to_vec())
            .build()
            .unwrap();
        let result = verifier.verify(&token).await.unwrap();
        assert_eq!(result.decode_error(), Some("Signature verification failed"));
    }

    #[tokio::test]
    async fn kms_round_trip_carries_key_headers() {
        let clock = FixedClock::new(NOW);
        let (kms, key_id) = memory_kms_with_key("us-west-2");
        let options = SisJwtOptions::builder()
            .runtime(Runtime::production())
            .token_type(TOKEN_TYPE_V1)
            .key_id(key_id.clone())
            .key_alg(TEST_SIGNING_ALGORITHM)
            .aws_region("us-west-2")
            .iss("SISi")
            .aud("SISa")
            .build();
        let sisjwt = SisJwt::builder()
            .options(Arc::new(options))
            .kms(kms)
            .clock(Arc::new(clock))
            .build()
            .unwrap();

        let headers = sisjwt.encode_headers();
        assert_eq!(headers["kid"], json!(key_id));
        assert_eq!(headers["AWS_ALG"], json!(TEST_SIGNING_ALGORITHM));

        let token = sisjwt.encode(Map::new()).await.unwrap();
        let mut result = sisjwt.verify(&token).await.unwrap();
        accept_defaults(&mut result);
        assert!(result.is_valid(), "{:?}", result.errors());
        assert_eq!(result.headers().get_str("KID"), Some(key_id.as_str()));
        assert_eq!(result.expires_at() - result.issued_at(), 60);
    }

    #[tokio::test]
    async fn inventory_is_applied_to_verified_tokens() {
        let clock = FixedClock::new(NOW);
        let options = SisJwtOptions::builder()
            .runtime(Runtime::development())
            .iss("SISi")
            .aud("SISa")
            .build();
        let sisjwt = SisJwt::builder()
            .options(Arc::new(options))
            .clock(Arc::new(clock))
            .arn_inventory(Arc::new(ArnInventory::from_issuers([("SISi", vec!["arn:A"])])))
            .build()
            .unwrap();

        let token = sisjwt.encode(Map::new()).await.unwrap();
        let mut result = sisjwt.verify(&token).await.unwrap();
        accept_defaults(&mut result);
        assert_eq!(result.errors().on("kid"), vec!["not registered to issuer 'SISi'"]);
    }

    #[tokio::test]
    async fn forged_algorithm_is_rejected() {
        let clock = FixedClock::new(NOW);
        let payload = json!({"iss": "SISi", "aud": "SISa", "iat": NOW, "exp": NOW + 60});
        let token = craft_token(&json!({"alg": "HS512"}), &payload, DEV_SHARED_SECRET);

        let result = dev_sisjwt(&clock).verify(&token).await.unwrap();
        assert_eq!(result.decode_error(), Some("Expected a different algorithm"));
    }

    #[tokio::test]
    async fn crafted_dev_token_with_shared_secret_verifies() {
        let clock = FixedClock::new(NOW);
        let payload = json!({"iss": "SISi", "aud": "SISa", "iat": NOW, "exp": NOW + 60});
        let token = craft_token(&json!({"alg": TOKEN_TYPE_DEV}), &payload, DEV_SHARED_SECRET);

        let mut result = dev_sisjwt(&clock).verify(&token).await.unwrap();
        accept_defaults(&mut result);
        assert!(result.is_valid(), "{:?}", result.errors());
    }

    #[tokio::test]
    async fn signed_token_with_minimum_iat_is_rejected() {
        let clock = FixedClock::new(NOW);
        let payload = json!({"iss": "SISi", "aud": "SISa", "iat": i64::MIN, "exp": NOW + 60});
        let token = craft_token(&json!({"alg": TOKEN_TYPE_DEV}), &payload, DEV_SHARED_SECRET);

        let mut result = dev_sisjwt(&clock).verify(&token).await.unwrap();
        accept_defaults(&mut result);
        assert!(!result.is_valid());
        assert_eq!(result.errors().on("base"), vec!["Token is longer lived than allowed"]);
    }

    #[tokio::test]
    async fn algorithm_override_is_used_for_both_directions() {
        let clock = FixedClock::new(NOW);
        let sisjwt = SisJwt::builder()
            .options(crate::testutil::dev_options())
            .algorithm(Arc::new(HmacOnly::new("TESTALG")))
            .clock(Arc::new(clock))
            .build()
            .unwrap();

        let token = sisjwt.encode(Map::new()).await.unwrap();
        let mut result = sisjwt.verify(&token).await.unwrap();
        accept_defaults(&mut result);
        assert!(result.is_valid(), "{:?}", result.errors());
        assert_eq!(result.token_type(), Some("TESTALG"));

        let dev = craft_token(&json!({"alg": TOKEN_TYPE_DEV}), &json!({}), DEV_SHARED_SECRET);
        let rejected = sisjwt.verify(&dev).await.unwrap();
        assert_eq!(rejected.decode_error(), Some("Expected a different algorithm"));
    }

    #[test]
    fn invalid_options_fail_construction() {
        let options = SisJwtOptions::builder().runtime(Runtime::development()).build();
        let err = SisJwt::builder().options(Arc::new(options)).build().unwrap_err();
        assert!(err.to_string().contains("iss can't be blank"), "{err}");
    }
}
