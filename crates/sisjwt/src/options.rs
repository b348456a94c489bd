//! Token options: what to sign with, for whom, and for how long.
//!
//! [`SisJwtOptions`] is built once per process (or per request), either
//! explicitly through its builder or from environment variables with
//! [`SisJwtOptions::from_env`]. It may be adjusted with the `set_*` methods
//! and is validated before any signing happens.
//!
//! # Environment
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `AWS_REGION` | `aws_region` | `us-west-2` |
//! | `AWS_PROFILE` | `aws_profile` | `""` in production, `dev` otherwise |
//! | `SISJWT_KEY_ID` | `key_id` | unset |
//! | `SISJWT_KEY_ALG` | `key_alg` | `RSASSA_PKCS1_V1_5_SHA_256` |
//! | `SISJWT_ISS` | `iss` | `SISi` |
//! | `SISJWT_AUD` | `aud` | `SISa` |

use std::{fmt, str::FromStr, sync::OnceLock};

use serde::Serialize;

use crate::{
    error::SisJwtError,
    runtime::{Runtime, TOKEN_TYPE_PREFIX, TOKEN_TYPE_V1},
    validation::ValidationErrors,
};

/// Default region for the key-management service.
pub const DEFAULT_AWS_REGION: &str = "us-west-2";

/// Default issuer claim.
pub const DEFAULT_ISSUER: &str = "SISi";

/// Default audience claim.
pub const DEFAULT_AUDIENCE: &str = "SISa";

/// Default key-management signing algorithm.
pub const DEFAULT_KEY_ALG: &str = "RSASSA_PKCS1_V1_5_SHA_256";

/// Environment variable holding the signing key id. Also consulted as the
/// last key resolution candidate during verification.
pub const KEY_ID_ENV: &str = "SISJWT_KEY_ID";

static CURRENT: OnceLock<SisJwtOptions> = OnceLock::new();

/// Whether options are used to issue tokens or only to check them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Issue tokens; every rule applies.
    #[default]
    Sign,
    /// Check tokens; signing-only rules are skipped.
    Verify,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sign => f.write_str("sign"),
            Self::Verify => f.write_str("verify"),
        }
    }
}

impl FromStr for Mode {
    type Err = SisJwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sign" => Ok(Self::Sign),
            "verify" => Ok(Self::Verify),
            _ => Err(SisJwtError::InvalidMode(s.to_owned())),
        }
    }
}

/// Configuration for issuing and verifying tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SisJwtOptions {
    mode: Mode,
    token_type: String,
    key_alg: Option<String>,
    key_id: Option<String>,
    aws_region: Option<String>,
    aws_profile: Option<String>,
    token_lifetime: Option<u64>,
    iss: Option<String>,
    aud: Option<String>,
    iat: Option<i64>,
    exp: Option<i64>,
    #[serde(skip)]
    runtime: Runtime,
}

#[bon::bon]
impl SisJwtOptions {
    /// Creates options, filling unset values from `runtime`.
    ///
    /// `token_type` and `token_lifetime` default to the runtime's defaults.
    /// Every other field is left unset unless given.
    ///
    /// # Example
    ///
    /// ```
    /// use sisjwt::{Mode, Runtime, SisJwtOptions, TOKEN_TYPE_DEV};
    ///
    /// let options = SisJwtOptions::builder()
    ///     .mode(Mode::Sign)
    ///     .runtime(Runtime::development())
    ///     .iss("SISi")
    ///     .aud("SISa")
    ///     .build();
    ///
    /// assert_eq!(options.token_type(), TOKEN_TYPE_DEV);
    /// assert!(options.is_valid());
    /// assert!(!options.kms_configured());
    /// ```
    #[builder]
    pub fn new(
        #[builder(default)] mode: Mode,
        runtime: Option<Runtime>,
        #[builder(into)] token_type: Option<String>,
        #[builder(into)] key_alg: Option<String>,
        #[builder(into)] key_id: Option<String>,
        #[builder(into)] aws_region: Option<String>,
        #[builder(into)] aws_profile: Option<String>,
        token_lifetime: Option<u64>,
        #[builder(into)] iss: Option<String>,
        #[builder(into)] aud: Option<String>,
        iat: Option<i64>,
        exp: Option<i64>,
    ) -> Self {
        let runtime = runtime.unwrap_or_else(Runtime::current);
        Self {
            mode,
            token_type: token_type.unwrap_or_else(|| runtime.default_token_type().to_owned()),
            key_alg,
            key_id,
            aws_region,
            aws_profile,
            token_lifetime: token_lifetime.or(Some(runtime.default_token_lifetime())),
            iss,
            aud,
            iat,
            exp,
            runtime,
        }
    }
}

impl SisJwtOptions {
    /// Loads options from the process environment.
    #[must_use]
    pub fn from_env(mode: Mode, runtime: Runtime) -> Self {
        Self::from_lookup(mode, runtime, |name| std::env::var(name).ok())
    }

    /// Loads options from an arbitrary variable lookup.
    ///
    /// Sign-mode options are validated on load and problems are logged; they
    /// still have to pass [`validate`](Self::validate) before signing.
    pub fn from_lookup(
        mode: Mode,
        runtime: Runtime,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let options = Self::builder()
            .mode(mode)
            .runtime(runtime)
            .aws_region(lookup("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_owned()))
            .aws_profile(
                lookup("AWS_PROFILE").unwrap_or_else(|| runtime.default_aws_profile().to_owned()),
            )
            .maybe_key_id(lookup(KEY_ID_ENV))
            .key_alg(lookup("SISJWT_KEY_ALG").unwrap_or_else(|| DEFAULT_KEY_ALG.to_owned()))
            .iss(lookup("SISJWT_ISS").unwrap_or_else(|| DEFAULT_ISSUER.to_owned()))
            .aud(lookup("SISJWT_AUD").unwrap_or_else(|| DEFAULT_AUDIENCE.to_owned()))
            .build();

        if mode == Mode::Sign {
            let errors = options.validate();
            if !errors.is_empty() {
                tracing::warn!(errors = ?errors.full_messages(), "sign options loaded from environment are invalid");
            }
        }
        options
    }

    /// Process-wide sign-mode options from the environment, loaded on first use.
    pub fn current() -> &'static SisJwtOptions {
        CURRENT.get_or_init(|| Self::from_env(Mode::Sign, Runtime::current()))
    }

    /// Checks every rule that applies to this mode and runtime.
    #[must_use]
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if !self.runtime.valid_token_type(&self.token_type) {
            errors.add("token_type", "is invalid");
        }

        if self.mode != Mode::Sign {
            return errors;
        }

        let kms_configured = self.kms_configured();
        for (field, value) in [
            ("key_alg", &self.key_alg),
            ("key_id", &self.key_id),
            ("aws_region", &self.aws_region),
        ] {
            if kms_configured && is_blank(value.as_deref()) {
                errors.add(field, "can't be blank");
            }
        }
        if self.token_lifetime.is_none() {
            errors.add("token_lifetime", "can't be blank");
        }
        if is_blank(self.iss.as_deref()) {
            errors.add("iss", "can't be blank");
        }
        if is_blank(self.aud.as_deref()) {
            errors.add("aud", "can't be blank");
        }

        if self.iss == self.aud {
            errors.add("iss", "Can not be equal to AUDience!");
        }

        if let Some(exp) = self.exp
            && let Some(iat) = self.iat
            && exp < iat
        {
            errors.add("exp", "can not be before the token was issued (iat)");
        }

        if !self.token_type.starts_with(TOKEN_TYPE_PREFIX) {
            errors.add("token_type", format!("({}) is not a valid token type!", self.token_type));
        }

        if self.runtime.is_production() {
            if !self.production_token_type() {
                errors.add_base("Can not issue non-production tokens in a production environment");
            }
            if !kms_configured {
                errors.add_base("AWS KMS is not properly configured");
            }
        }

        errors
    }

    /// Returns `true` if [`validate`](Self::validate) finds nothing.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Validation problems formatted one per line, or `None` when valid.
    #[must_use]
    pub fn error_messages(&self) -> Option<String> {
        let errors = self.validate();
        if errors.is_empty() {
            return None;
        }
        let mut lines = vec!["Errors:".to_owned()];
        lines.extend(errors.iter().map(|e| format!("\t{} {}", e.field, e.message)));
        Some(lines.join("\n"))
    }

    /// Are all values needed for a key-management call present?
    ///
    /// True only for the production token type with region, key id and key
    /// algorithm all non-blank.
    #[must_use]
    pub fn kms_configured(&self) -> bool {
        self.production_token_type()
            && !is_blank(self.aws_region.as_deref())
            && !is_blank(self.key_id.as_deref())
            && !is_blank(self.key_alg.as_deref())
    }

    /// Is the token type the production variant?
    #[must_use]
    pub fn production_token_type(&self) -> bool {
        self.token_type == TOKEN_TYPE_V1
    }

    /// `iat` to stamp on a token issued at `now`.
    #[must_use]
    pub fn issued_at(&self, now: i64) -> i64 {
        self.iat.unwrap_or(now)
    }

    /// `exp` to stamp on a token issued at `now`.
    #[must_use]
    pub fn expires_at(&self, now: i64) -> i64 {
        let lifetime = i64::try_from(self.token_lifetime.unwrap_or_default()).unwrap_or(i64::MAX);
        self.exp.unwrap_or_else(|| self.issued_at(now).saturating_add(lifetime))
    }

    /// Key id for signing; `None` unless KMS is configured.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.kms_configured().then(|| self.key_id.as_deref()).flatten()
    }

    /// Key algorithm for signing; `None` unless KMS is configured.
    #[must_use]
    pub fn key_alg(&self) -> Option<&str> {
        self.kms_configured().then(|| self.key_alg.as_deref()).flatten()
    }

    /// Key id exactly as configured, whether or not KMS is configured.
    #[must_use]
    pub fn configured_key_id(&self) -> Option<&str> {
        self.key_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Options mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Runtime these options are validated against.
    #[must_use]
    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    /// Token type written into the `alg` header.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Key-management region.
    #[must_use]
    pub fn aws_region(&self) -> Option<&str> {
        self.aws_region.as_deref()
    }

    /// Named credentials profile.
    #[must_use]
    pub fn aws_profile(&self) -> Option<&str> {
        self.aws_profile.as_deref()
    }

    /// Token lifetime in seconds.
    #[must_use]
    pub fn token_lifetime(&self) -> Option<u64> {
        self.token_lifetime
    }

    /// Issuer claim.
    #[must_use]
    pub fn iss(&self) -> Option<&str> {
        self.iss.as_deref()
    }

    /// Audience claim.
    #[must_use]
    pub fn aud(&self) -> Option<&str> {
        self.aud.as_deref()
    }

    /// Explicit issued-at, if pinned.
    #[must_use]
    pub fn iat(&self) -> Option<i64> {
        self.iat
    }

    /// Explicit expiry, if pinned.
    #[must_use]
    pub fn exp(&self) -> Option<i64> {
        self.exp
    }

    /// Sets the token type.
    pub fn set_token_type(&mut self, token_type: impl Into<String>) -> &mut Self {
        self.token_type = token_type.into();
        self
    }

    /// Sets the key algorithm.
    pub fn set_key_alg(&mut self, key_alg: impl Into<String>) -> &mut Self {
        self.key_alg = Some(key_alg.into());
        self
    }

    /// Sets the key id.
    pub fn set_key_id(&mut self, key_id: impl Into<String>) -> &mut Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Sets the region.
    pub fn set_aws_region(&mut self, aws_region: impl Into<String>) -> &mut Self {
        self.aws_region = Some(aws_region.into());
        self
    }

    /// Sets the credentials profile.
    pub fn set_aws_profile(&mut self, aws_profile: impl Into<String>) -> &mut Self {
        self.aws_profile = Some(aws_profile.into());
        self
    }

    /// Sets the token lifetime in seconds.
    pub fn set_token_lifetime(&mut self, seconds: u64) -> &mut Self {
        self.token_lifetime = Some(seconds);
        self
    }

    /// Sets the issuer.
    pub fn set_iss(&mut self, iss: impl Into<String>) -> &mut Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the audience.
    pub fn set_aud(&mut self, aud: impl Into<String>) -> &mut Self {
        self.aud = Some(aud.into());
        self
    }

    /// Pins the issued-at timestamp.
    pub fn set_iat(&mut self, iat: Option<i64>) -> &mut Self {
        self.iat = iat;
        self
    }

    /// Pins the expiry timestamp.
    pub fn set_exp(&mut self, exp: Option<i64>) -> &mut Self {
        self.exp = exp;
        self
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
