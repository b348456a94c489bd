//! In-memory key-management backend.
//!
//! [`MemoryKms`] holds Ed25519 key pairs in a region-scoped map and answers
//! `Sign`/`Verify` the way the real service does: unknown ids are
//! [`KmsError::NotFound`], a signature mismatch is
//! [`KmsError::InvalidSignature`]. Every verify call is recorded so tests can
//! observe which key ids a caller tried and in what order.
//!
//! # Example
//!
//! ```
//! use sisjwt_kms::{KmsClient, MemoryKms, SignRequest, VerifyRequest};
//!
//! # tokio_test_block_on(async {
//! let kms = MemoryKms::new("us-west-2");
//! let key_id = kms.create_key("ECDSA_SHA_256");
//!
//! let signed = kms.sign(SignRequest::raw(&key_id, "ECDSA_SHA_256", b"hello".to_vec())).await?;
//! let checked = kms
//!     .verify(VerifyRequest::raw(&key_id, "ECDSA_SHA_256", b"hello".to_vec(), signed.signature))
//!     .await?;
//! assert!(checked.signature_valid);
//! # Ok::<(), sisjwt_kms::KmsError>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use parking_lot::{Mutex, RwLock};
use rand_core::{OsRng, RngCore};

use crate::{
    client::{KmsClient, MessageType, SignRequest, SignResponse, VerifyRequest, VerifyResponse},
    error::{KmsError, KmsResult},
};

/// Account id used in generated key ARNs.
const MEMORY_ACCOUNT_ID: &str = "000000000000";

#[derive(Clone)]
struct StoredKey {
    signing_algorithm: String,
    signing_key: SigningKey,
    enabled: bool,
}

/// Thread-safe in-memory [`KmsClient`].
///
/// Cloning shares the underlying key map and call log.
#[derive(Clone)]
pub struct MemoryKms {
    region: String,
    keys: Arc<RwLock<HashMap<String, StoredKey>>>,
    verify_calls: Arc<Mutex<Vec<String>>>,
}

impl std::fmt::Debug for MemoryKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKms")
            .field("region", &self.region)
            .field("keys", &self.keys.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryKms {
    /// Creates an empty backend answering for `region`.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            keys: Arc::new(RwLock::new(HashMap::new())),
            verify_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Generates a fresh key for `signing_algorithm` and returns its ARN.
    pub fn create_key(&self, signing_algorithm: impl Into<String>) -> String {
        let mut id = [0u8; 16];
        OsRng.fill_bytes(&mut id);
        let key_id = format!(
            "arn:aws:kms:{}:{MEMORY_ACCOUNT_ID}:key/{}",
            self.region,
            format_key_uuid(&id)
        );
        self.import_key(&key_id, signing_algorithm, SigningKey::generate(&mut OsRng));
        key_id
    }

    /// Registers existing key material under `key_id`.
    ///
    /// Used to model a multi-region key: the same material imported into two
    /// backends under ARNs that differ only in their region segment.
    pub fn import_key(
        &self,
        key_id: impl Into<String>,
        signing_algorithm: impl Into<String>,
        signing_key: SigningKey,
    ) {
        let stored =
            StoredKey { signing_algorithm: signing_algorithm.into(), signing_key, enabled: true };
        self.keys.write().insert(key_id.into(), stored);
    }

    /// Returns the key material and algorithm registered under `key_id`.
    #[must_use]
    pub fn export_key(&self, key_id: &str) -> Option<(String, SigningKey)> {
        self.keys
            .read()
            .get(key_id)
            .map(|stored| (stored.signing_algorithm.clone(), stored.signing_key.clone()))
    }

    /// Disables a key; later operations on it fail with [`KmsError::Disabled`].
    ///
    /// Returns `false` if the key does not exist.
    pub fn disable_key(&self, key_id: &str) -> bool {
        match self.keys.write().get_mut(key_id) {
            Some(stored) => {
                stored.enabled = false;
                true
            },
            None => false,
        }
    }

    /// Key ids passed to [`verify`](KmsClient::verify), in call order.
    #[must_use]
    pub fn verify_calls(&self) -> Vec<String> {
        self.verify_calls.lock().clone()
    }

    /// Forgets recorded verify calls.
    pub fn clear_calls(&self) {
        self.verify_calls.lock().clear();
    }

    fn usable_key(
        &self,
        key_id: &str,
        signing_algorithm: &str,
        message_type: MessageType,
    ) -> KmsResult<StoredKey> {
        let stored = self.keys.read().get(key_id).cloned().ok_or_else(|| {
            tracing::debug!(key_id, region = %self.region, "key not present in memory backend");
            KmsError::not_found(key_id)
        })?;

        if !stored.enabled {
            return Err(KmsError::disabled(key_id));
        }
        if stored.signing_algorithm != signing_algorithm {
            return Err(KmsError::invalid_key_usage(
                key_id,
                format!(
                    "key supports {}, request asked for {signing_algorithm}",
                    stored.signing_algorithm
                ),
            ));
        }
        if message_type != MessageType::Raw {
            return Err(KmsError::invalid_key_usage(
                key_id,
                "the in-memory backend only accepts RAW messages",
            ));
        }
        Ok(stored)
    }
}

#[async_trait]
impl KmsClient for MemoryKms {
    fn region(&self) -> &str {
        &self.region
    }

    #[tracing::instrument(skip(self, request), fields(key_id = %request.key_id))]
    async fn sign(&self, request: SignRequest) -> KmsResult<SignResponse> {
        let stored =
            self.usable_key(&request.key_id, &request.signing_algorithm, request.message_type)?;
        let signature = stored.signing_key.sign(&request.message);

        Ok(SignResponse {
            key_id: request.key_id,
            signing_algorithm: request.signing_algorithm,
            signature: signature.to_bytes().to_vec(),
        })
    }

    #[tracing::instrument(skip(self, request), fields(key_id = %request.key_id))]
    async fn verify(&self, request: VerifyRequest) -> KmsResult<VerifyResponse> {
        self.verify_calls.lock().push(request.key_id.clone());

        let stored =
            self.usable_key(&request.key_id, &request.signing_algorithm, request.message_type)?;
        let signature =
            Signature::from_slice(&request.signature).map_err(|_| KmsError::invalid_signature())?;
        stored
            .signing_key
            .verifying_key()
            .verify(&request.message, &signature)
            .map_err(|_| KmsError::invalid_signature())?;

        Ok(VerifyResponse {
            key_id: request.key_id,
            signing_algorithm: request.signing_algorithm,
            signature_valid: true,
        })
    }
}

fn format_key_uuid(bytes: &[u8; 16]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{}-{}-{}-{}", &hex[0..8], &hex[8..12], &hex[12..16], &hex[16..20], &hex[20..32])
}
