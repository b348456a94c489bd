//! Key-management service boundary for sisjwt.
//!
//! Production tokens are signed by an external key-management service (KMS)
//! that holds the private key. This crate defines the narrow surface the
//! rest of the workspace depends on:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                sisjwt (core)                 │
//! │   SisJwtV1 algorithm, KeyResolver chain      │
//! ├──────────────────────────────────────────────┤
//! │               sisjwt-kms                     │
//! │     KmsClient trait: sign, verify, region    │
//! ├───────────────┬──────────────────────────────┤
//! │   MemoryKms   │        AwsKmsClient          │
//! │  (dev, tests) │  (sisjwt-kms-aws, production)│
//! └───────────────┴──────────────────────────────┘
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: fixtures for building populated [`MemoryKms`] instances and the
//!   [`assert_kms_error!`] macro.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use client::{
    KmsClient, MessageType, SignRequest, SignResponse, VerifyRequest, VerifyResponse,
};
pub use error::{BoxError, KmsError, KmsResult};
pub use memory::MemoryKms;
