//! Short-lived signed tokens for service-to-service calls.
//!
//! Tokens are compact three-segment tokens whose `alg` header names a sisjwt
//! token type:
//!
//! - `SISKMSd`: development tokens, HMAC-SHA512 over a shared secret.
//! - `SISKMS1.0`: production tokens, signed by a key-management service.
//!
//! # Issuing and verifying
//!
//! ```no_run
//! use std::sync::Arc;
//! use sisjwt::{Mode, Runtime, SisJwt, SisJwtOptions};
//!
//! # async fn example() -> sisjwt::Result<()> {
//! let options = SisJwtOptions::from_env(Mode::Sign, Runtime::from_env());
//! let sisjwt = SisJwt::builder().options(Arc::new(options)).build()?;
//!
//! let token = sisjwt.encode(serde_json::Map::new()).await?;
//!
//! let mut result = sisjwt.verify(&token).await?;
//! result.add_allowed_issuer("SISi");
//! result.add_allowed_audience("SISa");
//! if !result.is_valid() {
//!     eprintln!("{:?}", result.errors().full_messages());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Key resolution
//!
//! A production token names its signing key in the `kid` header. Keys may be
//! replicated across regions, so verification tries, in order: the key as
//! given, the same key id in the verifier's region, and the verifier's own
//! configured key. See [`key_resolution`].
//!
//! # Feature Flags
//!
//! - **`testutil`**: option fixtures, a token forger and [`assert_sisjwt_error!`].
//! - **`failpoints`**: enables the `key-resolution-before-verify` fail point.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod arn_inventory;
pub mod clock;
pub mod codec;
pub mod error;
pub mod headers;
pub mod key_resolution;
pub mod options;
pub mod runtime;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod token;
pub mod validation;
pub mod verification;

pub use algorithm::{SigningAlgorithm, SisJwtV1, VerificationKey, hmac_sha512};
pub use arn_inventory::ArnInventory;
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{Claims, DecodeError};
pub use error::{Result, SisJwtError};
pub use headers::Headers;
pub use key_resolution::{AsGiven, EnvKey, KeyResolver, KeyStrategy, SwapRegion};
pub use options::{Mode, SisJwtOptions};
pub use runtime::{Runtime, TOKEN_TYPE_DEV, TOKEN_TYPE_V1};
pub use token::{DEV_SHARED_SECRET, SisJwt};
pub use validation::{FieldError, ValidationErrors};
pub use verification::{MAX_ALLOWED_AGE, VerificationResult};
