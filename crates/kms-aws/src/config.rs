//! Configuration for the AWS KMS client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AwsKmsError, Result};

/// Default per-request time limit (10 seconds).
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`AwsKmsClient`](crate::AwsKmsClient).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use sisjwt_kms_aws::AwsKmsConfig;
///
/// let config = AwsKmsConfig::builder()
///     .region("us-west-2")
///     .profile("dev")
///     .operation_timeout(Duration::from_secs(3))
///     .build()?;
/// assert_eq!(config.region(), "us-west-2");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsKmsConfig {
    /// Region every request is sent to.
    pub(crate) region: String,

    /// Named profile from the shared AWS config files.
    #[serde(default)]
    pub(crate) profile: Option<String>,

    /// Endpoint override, e.g. a local KMS emulator.
    #[serde(default)]
    pub(crate) endpoint_url: Option<String>,

    /// Time limit applied to each sign/verify request.
    #[serde(with = "humantime_serde", default = "default_operation_timeout")]
    pub(crate) operation_timeout: Duration,
}

fn default_operation_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

#[bon::bon]
impl AwsKmsConfig {
    /// Creates a new configuration.
    ///
    /// A blank `profile` is treated as "use the default credential chain".
    ///
    /// # Errors
    ///
    /// Returns [`AwsKmsError::Config`] if the region is blank or the
    /// operation timeout is zero.
    #[builder]
    pub fn new(
        #[builder(into)] region: String,
        #[builder(into)] profile: Option<String>,
        #[builder(into)] endpoint_url: Option<String>,
        #[builder(default = DEFAULT_OPERATION_TIMEOUT)] operation_timeout: Duration,
    ) -> Result<Self> {
        let config = Self {
            region: region.trim().to_owned(),
            profile: profile.filter(|p| !p.trim().is_empty()),
            endpoint_url,
            operation_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

impl AwsKmsConfig {
    /// Checks invariants; deserialized configs should be validated before use.
    ///
    /// # Errors
    ///
    /// Returns [`AwsKmsError::Config`] describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(AwsKmsError::Config("region must not be blank".into()));
        }
        if self.operation_timeout.is_zero() {
            return Err(AwsKmsError::Config("operation_timeout must be greater than zero".into()));
        }
        Ok(())
    }

    /// Region every request is sent to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Named credentials profile, if any.
    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Endpoint override, if any.
    #[must_use]
    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint_url.as_deref()
    }

    /// Time limit applied to each request.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let config = AwsKmsConfig::builder().region("us-west-2").build().unwrap();
        assert_eq!(config.region(), "us-west-2");
        assert_eq!(config.profile(), None);
        assert_eq!(config.endpoint_url(), None);
        assert_eq!(config.operation_timeout(), DEFAULT_OPERATION_TIMEOUT);
    }

    #[test]
    fn blank_region_is_rejected() {
        let err = AwsKmsConfig::builder().region("   ").build().unwrap_err();
        assert!(matches!(err, AwsKmsError::Config(ref m) if m.contains("region")), "got {err:?}");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = AwsKmsConfig::builder()
            .region("us-west-2")
            .operation_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, AwsKmsError::Config(_)));
    }

    #[test]
    fn blank_profile_means_default_chain() {
        let config = AwsKmsConfig::builder().region("us-west-2").profile("").build().unwrap();
        assert_eq!(config.profile(), None);
    }

    #[test]
    fn deserializes_humantime_timeout() {
        let config: AwsKmsConfig = serde_json::from_str(
            r#"{"region":"eu-west-1","profile":"prod","operation_timeout":"750ms"}"#,
        )
        .unwrap();
        assert_eq!(config.operation_timeout(), Duration::from_millis(750));
        assert_eq!(config.profile(), Some("prod"));
        config.validate().unwrap();
    }

    #[test]
    fn deserialize_defaults_timeout() {
        let config: AwsKmsConfig = serde_json::from_str(r#"{"region":"eu-west-1"}"#).unwrap();
        assert_eq!(config.operation_timeout(), DEFAULT_OPERATION_TIMEOUT);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: std::result::Result<AwsKmsConfig, _> =
            serde_json::from_str(r#"{"region":"eu-west-1","retries":3}"#);
        assert!(result.is_err());
    }
}
