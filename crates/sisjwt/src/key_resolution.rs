//! Key resolution for KMS verification.
//!
//! A key id carried by a token is not always one the local key-management
//! region will accept. Multi-region keys share material under ARNs that
//! differ only in their region segment, and a deployment may pin its own key
//! id. [`KeyResolver`] walks an ordered list of [`KeyStrategy`]s, each
//! proposing a candidate key id, until the service gives a definitive answer.
//!
//! # Resolution rules
//!
//! - Strategies run in declared order; the default is [`AsGiven`],
//!   [`SwapRegion`], [`EnvKey`].
//! - A strategy that declines, or proposes a key id already tried, is skipped.
//! - "Key not found" from the service moves on to the next strategy.
//! - The first definitive answer wins: a valid signature returns `true`, an
//!   invalid signature returns `false`. Later strategies never run.
//! - If nothing answers, [`SisJwtError::KeyNotFound`] names the key id the
//!   token carried.

use std::{fmt, sync::Arc};

use fail::fail_point;
use sisjwt_kms::{KmsClient, VerifyRequest};

use crate::error::{Result, SisJwtError};

/// Prefix of key ARNs whose fourth `:`-separated segment is a region.
const KMS_ARN_PREFIX: &str = "arn:aws:kms:";

/// Proposes a key id to try for a verification.
pub trait KeyStrategy: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Key id to try, or `None` if this strategy does not apply.
    ///
    /// `region` is the region of the client that will run the verification.
    fn candidate(&self, key_id: &str, region: &str) -> Option<String>;
}

/// Tries the key id exactly as the token carries it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsGiven;

impl KeyStrategy for AsGiven {
    fn name(&self) -> &'static str {
        "as_given"
    }

    fn candidate(&self, key_id: &str, _region: &str) -> Option<String> {
        Some(key_id.to_owned())
    }
}

/// Rewrites the region segment of a KMS ARN to the client's region.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapRegion;

impl SwapRegion {
    /// `key_id` with its region segment replaced, if it is a KMS ARN.
    #[must_use]
    pub fn swap(key_id: &str, region: &str) -> Option<String> {
        if !key_id.starts_with(KMS_ARN_PREFIX) {
            return None;
        }
        let mut parts: Vec<&str> = key_id.split(':').collect();
        if parts.len() < 6 || parts[3].is_empty() {
            return None;
        }
        parts[3] = region;
        Some(parts.join(":"))
    }
}

impl KeyStrategy for SwapRegion {
    fn name(&self) -> &'static str {
        "swap_region"
    }

    fn candidate(&self, key_id: &str, region: &str) -> Option<String> {
        Self::swap(key_id, region).filter(|swapped| swapped != key_id)
    }
}

/// Tries the deployment's own configured key id.
#[derive(Debug, Clone, Default)]
pub struct EnvKey {
    key_id: Option<String>,
}

impl EnvKey {
    /// Creates the strategy; `None` or a blank id makes it never apply.
    #[must_use]
    pub fn new(key_id: Option<impl Into<String>>) -> Self {
        let key_id = key_id.map(Into::into).filter(|id: &String| !id.trim().is_empty());
        Self { key_id }
    }
}

impl KeyStrategy for EnvKey {
    fn name(&self) -> &'static str {
        "env_key"
    }

    fn candidate(&self, key_id: &str, _region: &str) -> Option<String> {
        self.key_id.as_ref().filter(|configured| configured.as_str() != key_id).cloned()
    }
}

/// Runs key resolution strategies against a key-management client.
#[derive(Clone)]
pub struct KeyResolver {
    kms: Arc<dyn KmsClient>,
    strategies: Vec<Arc<dyn KeyStrategy>>,
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolver")
            .field("region", &self.kms.region())
            .field("strategies", &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl KeyResolver {
    /// Creates a resolver with an explicit strategy order.
    #[must_use]
    pub fn new(kms: Arc<dyn KmsClient>, strategies: Vec<Arc<dyn KeyStrategy>>) -> Self {
        Self { kms, strategies }
    }

    /// The default order: as given, swapped region, then `env_key_id`.
    #[must_use]
    pub fn default_strategies(env_key_id: Option<&str>) -> Vec<Arc<dyn KeyStrategy>> {
        vec![Arc::new(AsGiven), Arc::new(SwapRegion), Arc::new(EnvKey::new(env_key_id))]
    }

    /// Strategy names in the order they run.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Verifies `signature` over `message`, resolving `key_id` as needed.
    ///
    /// # Errors
    ///
    /// - [`SisJwtError::KeyNotFound`] naming `key_id` if no strategy reached a key.
    /// - [`SisJwtError::Kms`] for any other service failure.
    #[tracing::instrument(skip(self, message, signature), fields(region = %self.kms.region()))]
    pub async fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        algorithm: &str,
        key_id: &str,
    ) -> Result<bool> {
        fail_point!("key-resolution-before-verify", |_| {
            Err(SisJwtError::Kms(sisjwt_kms::KmsError::internal("injected failure before key resolution")))
        });

        let region = self.kms.region();
        let request = VerifyRequest::raw(key_id, algorithm, message, signature);
        let mut tried: Vec<String> = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let Some(candidate) = strategy.candidate(key_id, region) else {
                tracing::debug!(strategy = strategy.name(), "strategy does not apply");
                continue;
            };
            if tried.contains(&candidate) {
                tracing::debug!(strategy = strategy.name(), candidate = %candidate, "candidate already tried");
                continue;
            }

            tracing::debug!(strategy = strategy.name(), candidate = %candidate, "verifying with candidate key");
            let outcome = self.kms.verify(request.with_key_id(&candidate)).await;
            tried.push(candidate);

            match outcome {
                Ok(response) => return Ok(response.signature_valid),
                Err(err) if err.is_invalid_signature() => return Ok(false),
                Err(err) if err.is_not_found() => {
                    tracing::debug!(strategy = strategy.name(), "candidate key not found");
                },
                Err(err) => {
                    tracing::warn!(strategy = strategy.name(), error = %err, "KMS verification failed");
                    return Err(err.into());
                },
            }
        }

        tracing::warn!(?tried, "no key resolution strategy found the key");
        Err(SisJwtError::key_not_found(key_id))
    }
}
