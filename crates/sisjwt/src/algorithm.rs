//! The pluggable signing algorithm.
//!
//! The compact token codec never signs anything itself. It hands the signing
//! input to a [`SigningAlgorithm`] and writes the algorithm's
//! [`name`](SigningAlgorithm::name) into the `alg` header. [`SisJwtV1`] is
//! the algorithm this crate issues tokens with; it signs with a key-management
//! service when fully configured and with HMAC-SHA512 over a shared secret
//! otherwise.

use std::{borrow::Cow, fmt, sync::Arc};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use sisjwt_kms::{KmsClient, SignRequest};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    error::{Result, SisJwtError},
    key_resolution::{KeyResolver, KeyStrategy},
    options::SisJwtOptions,
};

type HmacSha512 = Hmac<Sha512>;

/// Key material handed to [`SigningAlgorithm::verify`].
#[derive(Clone, PartialEq, Eq)]
pub enum VerificationKey {
    /// Development shared secret.
    SharedSecret(Zeroizing<Vec<u8>>),
    /// A key held by the key-management service.
    Kms {
        /// Service signing algorithm, e.g. `RSASSA_PKCS1_V1_5_SHA_256`.
        algorithm: String,
        /// Key id carried by the token.
        key_id: String,
    },
}

impl VerificationKey {
    /// Wraps a shared secret.
    #[must_use]
    pub fn shared_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self::SharedSecret(Zeroizing::new(secret.into()))
    }

    /// Parses the packed `algorithm;keyId` form, splitting on the first `;`.
    ///
    /// A value without `;` is taken as an algorithm with an empty key id.
    #[must_use]
    pub fn from_composite(composite: &str) -> Self {
        let (algorithm, key_id) = composite.split_once(';').unwrap_or((composite, ""));
        Self::Kms { algorithm: algorithm.to_owned(), key_id: key_id.to_owned() }
    }

    /// The packed `algorithm;keyId` form of a KMS key.
    #[must_use]
    pub fn composite(&self) -> Option<String> {
        match self {
            Self::SharedSecret(_) => None,
            Self::Kms { algorithm, key_id } => Some(format!("{algorithm};{key_id}")),
        }
    }

    /// Bytes used when this key is fed to HMAC.
    fn hmac_key(&self) -> Cow<'_, [u8]> {
        match self {
            Self::SharedSecret(secret) => Cow::Borrowed(secret.as_slice()),
            Self::Kms { .. } => Cow::Owned(self.composite().unwrap_or_default().into_bytes()),
        }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedSecret(_) => f.write_str("SharedSecret(<redacted>)"),
            Self::Kms { algorithm, key_id } => f
                .debug_struct("Kms")
                .field("algorithm", algorithm)
                .field("key_id", key_id)
                .finish(),
        }
    }
}

/// Contract between the token codec and a signature scheme.
#[async_trait]
pub trait SigningAlgorithm: Send + Sync {
    /// Value written into the `alg` header of issued tokens.
    fn name(&self) -> &str;

    /// Whether a token whose `alg` header is `candidate` may be verified.
    ///
    /// Must reject the development token type whenever development tokens
    /// are not permitted.
    fn is_valid_name(&self, candidate: &str) -> bool;

    /// Signs `data`. `signing_key` is the shared secret; KMS-backed schemes
    /// ignore it.
    async fn sign(&self, data: &[u8], signing_key: &[u8]) -> Result<Vec<u8>>;

    /// Checks `signature` over `data`.
    ///
    /// Returns `Ok(false)` when the signature does not match. Errors are
    /// reserved for configuration problems, infrastructure failures, and
    /// keys that cannot be found.
    async fn verify(&self, data: &[u8], signature: &[u8], key: &VerificationKey) -> Result<bool>;
}

/// Computes HMAC-SHA512 of `data` keyed by `key`.
///
/// # Errors
///
/// Returns [`SisJwtError::Configuration`] if the key is rejected by the MAC.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = new_mac(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn new_mac(key: &[u8]) -> Result<HmacSha512> {
    HmacSha512::new_from_slice(key).map_err(|_| {
        SisJwtError::configuration("Errors:\n\tbase shared secret cannot key HMAC-SHA512")
    })
}

/// The sisjwt v1 algorithm.
pub struct SisJwtV1 {
    options: Arc<SisJwtOptions>,
    kms: Option<Arc<dyn KmsClient>>,
    resolver: Option<KeyResolver>,
}

impl fmt::Debug for SisJwtV1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SisJwtV1")
            .field("token_type", &self.options.token_type())
            .field("kms_configured", &self.options.kms_configured())
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl SisJwtV1 {
    /// Validates `options` and builds the algorithm.
    ///
    /// A key-management client is required exactly when the options are
    /// KMS-configured; it is ignored otherwise.
    ///
    /// No client is built here, and invalid options are reported without
    /// contacting the key-management service.
    ///
    /// # Errors
    ///
    /// Returns [`SisJwtError::Configuration`] with every validation message
    /// if the options are invalid, or if KMS is configured and no client was
    /// supplied.
    pub fn new(options: Arc<SisJwtOptions>, kms: Option<Arc<dyn KmsClient>>) -> Result<Self> {
        if let Some(messages) = options.error_messages() {
            tracing::warn!(
                token_type = options.token_type(),
                mode = %options.mode(),
                "refusing to build algorithm from invalid options"
            );
            return Err(SisJwtError::configuration(messages));
        }

        if !options.kms_configured() {
            return Ok(Self { options, kms: None, resolver: None });
        }

        let Some(kms) = kms else {
            return Err(SisJwtError::configuration(
                "Errors:\n\tbase a KMS client is required when KMS signing is configured",
            ));
        };
        tracing::debug!(
            region = kms.region(),
            key_id = options.configured_key_id(),
            "using KMS-backed signing"
        );
        let strategies = KeyResolver::default_strategies(options.configured_key_id());
        let resolver = KeyResolver::new(Arc::clone(&kms), strategies);
        Ok(Self { options, kms: Some(kms), resolver: Some(resolver) })
    }

    /// Replaces the key resolution strategies used for KMS verification.
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<Arc<dyn KeyStrategy>>) -> Self {
        if let Some(kms) = &self.kms {
            self.resolver = Some(KeyResolver::new(Arc::clone(kms), strategies));
        }
        self
    }

    /// Options this algorithm was built from.
    #[must_use]
    pub fn options(&self) -> &SisJwtOptions {
        &self.options
    }

    fn shared_secret_verify(
        &self,
        data: &[u8],
        signature: &[u8],
        key: &VerificationKey,
    ) -> Result<bool> {
        if !self.options.runtime().allow_dev_token() {
            tracing::warn!("shared-secret verification is disabled in this runtime");
            return Ok(false);
        }
        let expected = hmac_sha512(&key.hmac_key(), data)?;
        Ok(expected.ct_eq(signature).into())
    }
}

#[async_trait]
impl SigningAlgorithm for SisJwtV1 {
    fn name(&self) -> &str {
        self.options.token_type()
    }

    fn is_valid_name(&self, candidate: &str) -> bool {
        self.options.runtime().valid_token_type(candidate)
    }

    #[tracing::instrument(skip_all, fields(alg = %self.options.token_type(), kms = self.kms.is_some()))]
    async fn sign(&self, data: &[u8], signing_key: &[u8]) -> Result<Vec<u8>> {
        let kms_key = self.options.key_id().zip(self.options.key_alg());
        match (&self.kms, kms_key) {
            (Some(kms), Some((key_id, key_alg))) => {
                let response = kms.sign(SignRequest::raw(key_id, key_alg, data)).await?;
                Ok(response.signature)
            },
            _ => hmac_sha512(signing_key, data),
        }
    }

    #[tracing::instrument(skip_all, fields(alg = %self.options.token_type(), kms = self.resolver.is_some()))]
    async fn verify(&self, data: &[u8], signature: &[u8], key: &VerificationKey) -> Result<bool> {
        match (key, &self.resolver) {
            (VerificationKey::Kms { algorithm, key_id }, Some(resolver)) => {
                resolver.verify(data, signature, algorithm, key_id).await
            },
            (VerificationKey::SharedSecret(_), Some(_)) => {
                tracing::warn!("KMS-configured verifier was handed a shared secret");
                Ok(false)
            },
            (_, None) => self.shared_secret_verify(data, signature, key),
        }
    }
}
