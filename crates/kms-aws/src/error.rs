//! Error types for the AWS KMS backend.
//!
//! SDK failures are kept in their typed form inside [`AwsKmsError`] and
//! converted to the backend-neutral [`KmsError`] at the trait boundary.

use aws_sdk_kms::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::{sign::SignError, verify::VerifyError},
    types::error::InvalidKeyUsageException,
};
use sisjwt_kms::KmsError;
use thiserror::Error;

/// Result type alias for AWS KMS backend operations.
pub type Result<T> = std::result::Result<T, AwsKmsError>;

/// Errors specific to the AWS KMS backend.
#[derive(Debug, Error)]
pub enum AwsKmsError {
    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// `Sign` call failed.
    #[error("KMS sign failed for {key_id}: {}", DisplayErrorContext(.source))]
    Sign {
        /// Key id the request addressed.
        key_id: String,
        /// SDK failure.
        #[source]
        source: SdkError<SignError>,
    },

    /// `Verify` call failed.
    #[error("KMS verify failed for {key_id}: {}", DisplayErrorContext(.source))]
    Verify {
        /// Key id the request addressed.
        key_id: String,
        /// SDK failure.
        #[source]
        source: SdkError<VerifyError>,
    },

    /// The service answered without a field it always sends.
    #[error("Malformed KMS response: {0}")]
    MalformedResponse(String),
}

impl From<AwsKmsError> for KmsError {
    fn from(err: AwsKmsError) -> Self {
        match err {
            AwsKmsError::Config(message) => KmsError::configuration(message),
            AwsKmsError::Sign { key_id, source } => {
                let classified = source
                    .as_service_error()
                    .and_then(|service| classify_sign_error(service, &key_id));
                match classified {
                    Some(mapped) => mapped,
                    None => sdk_error_to_kms_error(source),
                }
            },
            AwsKmsError::Verify { key_id, source } => {
                let classified = source
                    .as_service_error()
                    .and_then(|service| classify_verify_error(service, &key_id));
                match classified {
                    Some(mapped) => mapped,
                    None => sdk_error_to_kms_error(source),
                }
            },
            AwsKmsError::MalformedResponse(message) => KmsError::internal(message),
        }
    }
}

/// Maps the service exceptions `Sign` can raise onto [`KmsError`].
fn classify_sign_error(err: &SignError, key_id: &str) -> Option<KmsError> {
    if err.is_not_found_exception() {
        Some(KmsError::not_found(key_id))
    } else if err.is_disabled_exception() {
        Some(KmsError::disabled(key_id))
    } else if let SignError::InvalidKeyUsageException(exception) = err {
        Some(KmsError::invalid_key_usage(key_id, key_usage_message(exception, err.message())))
    } else if err.is_dependency_timeout_exception() {
        Some(KmsError::timeout())
    } else {
        None
    }
}

/// Maps the service exceptions `Verify` can raise onto [`KmsError`].
fn classify_verify_error(err: &VerifyError, key_id: &str) -> Option<KmsError> {
    if err.is_kms_invalid_signature_exception() {
        Some(KmsError::invalid_signature())
    } else if err.is_not_found_exception() {
        Some(KmsError::not_found(key_id))
    } else if err.is_disabled_exception() {
        Some(KmsError::disabled(key_id))
    } else if let VerifyError::InvalidKeyUsageException(exception) = err {
        Some(KmsError::invalid_key_usage(key_id, key_usage_message(exception, err.message())))
    } else if err.is_dependency_timeout_exception() {
        Some(KmsError::timeout())
    } else {
        None
    }
}

/// The exception's own message, then the response metadata's.
fn key_usage_message<'a>(
    exception: &'a InvalidKeyUsageException,
    metadata: Option<&'a str>,
) -> &'a str {
    exception.message().or(metadata).unwrap_or("invalid key usage")
}

/// Converts transport-level and unclassified SDK failures.
fn sdk_error_to_kms_error<E>(err: SdkError<E>) -> KmsError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::TimeoutError(_) => {
            tracing::warn!("KMS request timed out in the SDK");
            KmsError::timeout()
        },
        SdkError::DispatchFailure(_) => {
            tracing::warn!(error = %message, "KMS request could not be dispatched");
            KmsError::connection_with_source(message, err)
        },
        SdkError::ConstructionFailure(_) => KmsError::configuration(message),
        _ => KmsError::internal_with_source(message, err),
    }
}
