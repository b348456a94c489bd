//! [`KmsClient`] implementation backed by `aws-sdk-kms`.

use std::future::Future;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::{
    config::Region,
    primitives::Blob,
    types::{MessageType as AwsMessageType, SigningAlgorithmSpec},
};
use sisjwt_kms::{
    KmsClient, KmsError, KmsResult, MessageType, SignRequest, SignResponse, VerifyRequest,
    VerifyResponse,
};
use tokio::sync::OnceCell;

use crate::{
    config::AwsKmsConfig,
    error::{AwsKmsError, Result},
};

/// AWS KMS client.
///
/// The SDK client is built on first use. Concurrent first calls share a
/// single initialization; every later call reuses the same handle.
///
/// # Example
///
/// ```no_run
/// use sisjwt_kms::{KmsClient, SignRequest};
/// use sisjwt_kms_aws::{AwsKmsClient, AwsKmsConfig};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let client = AwsKmsClient::new(AwsKmsConfig::builder().region("us-west-2").build()?);
/// let signed = client
///     .sign(SignRequest::raw("alias/sisjwt", "RSASSA_PKCS1_V1_5_SHA_256", b"data".to_vec()))
///     .await?;
/// println!("{} signature bytes", signed.signature.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AwsKmsClient {
    config: AwsKmsConfig,
    client: OnceCell<aws_sdk_kms::Client>,
}

impl AwsKmsClient {
    /// Creates a client that loads AWS configuration lazily.
    #[must_use]
    pub fn new(config: AwsKmsConfig) -> Self {
        Self { config, client: OnceCell::new() }
    }

    /// Wraps an already-built SDK client.
    #[must_use]
    pub fn from_sdk_client(client: aws_sdk_kms::Client, config: AwsKmsConfig) -> Self {
        Self { config, client: OnceCell::new_with(Some(client)) }
    }

    /// Returns the configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &AwsKmsConfig {
        &self.config
    }

    async fn sdk_client(&self) -> &aws_sdk_kms::Client {
        self.client
            .get_or_init(|| async {
                tracing::debug!(
                    region = %self.config.region,
                    profile = ?self.config.profile,
                    "loading AWS configuration for KMS"
                );
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.config.region.clone()));
                if let Some(profile) = &self.config.profile {
                    loader = loader.profile_name(profile);
                }
                if let Some(endpoint_url) = &self.config.endpoint_url {
                    loader = loader.endpoint_url(endpoint_url);
                }
                aws_sdk_kms::Client::new(&loader.load().await)
            })
            .await
    }

    async fn with_timeout<T>(&self, operation: impl Future<Output = Result<T>>) -> KmsResult<T> {
        match tokio::time::timeout(self.config.operation_timeout, operation).await {
            Ok(result) => result.map_err(KmsError::from),
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.config.operation_timeout,
                    "KMS request exceeded operation timeout"
                );
                Err(KmsError::timeout())
            },
        }
    }
}

fn to_aws_message_type(message_type: MessageType) -> AwsMessageType {
    match message_type {
        MessageType::Raw => AwsMessageType::Raw,
        MessageType::Digest => AwsMessageType::Digest,
    }
}

#[async_trait]
impl KmsClient for AwsKmsClient {
    fn region(&self) -> &str {
        &self.config.region
    }

    #[tracing::instrument(skip(self, request), fields(key_id = %request.key_id, region = %self.config.region))]
    async fn sign(&self, request: SignRequest) -> KmsResult<SignResponse> {
        self.with_timeout(async {
            let output = self
                .sdk_client()
                .await
                .sign()
                .key_id(&request.key_id)
                .signing_algorithm(SigningAlgorithmSpec::from(request.signing_algorithm.as_str()))
                .message_type(to_aws_message_type(request.message_type))
                .message(Blob::new(request.message.clone()))
                .send()
                .await
                .map_err(|source| AwsKmsError::Sign { key_id: request.key_id.clone(), source })?;

            let signature = output
                .signature()
                .map(|blob| blob.as_ref().to_vec())
                .ok_or_else(|| AwsKmsError::MalformedResponse("Sign returned no signature".into()))?;

            Ok::<_, AwsKmsError>(SignResponse {
                key_id: output.key_id().unwrap_or(request.key_id.as_str()).to_owned(),
                signing_algorithm: output
                    .signing_algorithm()
                    .map_or_else(|| request.signing_algorithm.clone(), |alg| alg.as_str().to_owned()),
                signature,
            })
        })
        .await
    }

    #[tracing::instrument(skip(self, request), fields(key_id = %request.key_id, region = %self.config.region))]
    async fn verify(&self, request: VerifyRequest) -> KmsResult<VerifyResponse> {
        self.with_timeout(async {
            let output = self
                .sdk_client()
                .await
                .verify()
                .key_id(&request.key_id)
                .signing_algorithm(SigningAlgorithmSpec::from(request.signing_algorithm.as_str()))
                .message_type(to_aws_message_type(request.message_type))
                .message(Blob::new(request.message.clone()))
                .signature(Blob::new(request.signature.clone()))
                .send()
                .await
                .map_err(|source| AwsKmsError::Verify { key_id: request.key_id.clone(), source })?;

            Ok::<_, AwsKmsError>(VerifyResponse {
                key_id: output.key_id().unwrap_or(request.key_id.as_str()).to_owned(),
                signing_algorithm: output
                    .signing_algorithm()
                    .map_or_else(|| request.signing_algorithm.clone(), |alg| alg.as_str().to_owned()),
                signature_valid: output.signature_valid(),
            })
        })
        .await
    }
}
