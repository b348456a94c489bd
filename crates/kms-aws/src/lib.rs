//! AWS KMS backend for sisjwt.
//!
//! Provides [`AwsKmsClient`], the production implementation of
//! [`sisjwt_kms::KmsClient`]. Credentials and region resolution follow the
//! standard AWS configuration chain; [`AwsKmsConfig`] pins the region and
//! optionally a named profile.
//!
//! Service exceptions are mapped onto [`sisjwt_kms::KmsError`]:
//!
//! | AWS exception | `KmsError` |
//! |---------------|------------|
//! | `NotFoundException` | `NotFound` |
//! | `KMSInvalidSignatureException` | `InvalidSignature` |
//! | `InvalidKeyUsageException` | `InvalidKeyUsage` |
//! | `DisabledException` | `Disabled` |
//! | `DependencyTimeoutException`, SDK timeout | `Timeout` |
//! | dispatch failure | `Connection` |
//! | anything else | `Internal` |

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;

pub use client::AwsKmsClient;
pub use config::AwsKmsConfig;
pub use error::AwsKmsError;
