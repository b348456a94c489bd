//! Shared test helpers for code that talks to a [`KmsClient`](crate::KmsClient).
//!
//! Feature-gated behind `testutil`. Enable it from dependent crates'
//! `[dev-dependencies]`:
//!
//! ```toml
//! [dev-dependencies]
//! sisjwt-kms = { path = "../kms", features = ["testutil"] }
//! ```

use std::sync::Arc;

use crate::memory::MemoryKms;

/// Signing algorithm used by fixtures.
pub const TEST_SIGNING_ALGORITHM: &str = "RSASSA_PKCS1_V1_5_SHA_256";

/// Creates a backend for `region` holding one freshly generated key.
///
/// Returns the backend and the key's ARN.
pub fn memory_kms_with_key(region: &str) -> (Arc<MemoryKms>, String) {
    let kms = MemoryKms::new(region);
    let key_id = kms.create_key(TEST_SIGNING_ALGORITHM);
    (Arc::new(kms), key_id)
}

/// Copies `key_id` from `source` into `target`, rewriting the ARN's region
/// segment to the target's region. Returns the new ARN.
///
/// # Panics
///
/// Panics if `key_id` is not present in `source`.
pub fn replicate_key(source: &MemoryKms, target: &MemoryKms, key_id: &str) -> String {
    use crate::KmsClient;

    let (algorithm, material) = source.export_key(key_id).expect("key must exist in source");
    let mut parts: Vec<&str> = key_id.split(':').collect();
    let target_region = target.region().to_owned();
    if parts.len() > 3 {
        parts[3] = &target_region;
    }
    let replicated = parts.join(":");
    target.import_key(&replicated, algorithm, material);
    replicated
}

/// Asserts that a result is an error of the given [`KmsError`](crate::KmsError) variant.
///
/// # Examples
///
/// ```ignore
/// // Requires the `testutil` feature to be enabled.
/// use sisjwt_kms::{KmsError, assert_kms_error};
///
/// let result: Result<(), KmsError> = Err(KmsError::not_found("k"));
/// assert_kms_error!(result, NotFound);
/// ```
#[macro_export]
macro_rules! assert_kms_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::KmsError::$variant { .. })),
            "expected KmsError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::KmsError::$variant { .. })),
            "{}: expected KmsError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}
