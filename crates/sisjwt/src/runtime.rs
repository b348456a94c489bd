//! Runtime environment probe.
//!
//! [`Runtime`] answers the questions whose answers depend on where the process
//! runs: is this production, which token type and lifetime are the defaults,
//! and may the weak development token type be accepted here. It is a plain
//! value so policy code receives it by injection and tests can pin it.

use std::sync::OnceLock;

/// Token type of production tokens, signed by a key-management service.
pub const TOKEN_TYPE_V1: &str = "SISKMS1.0";

/// Token type of development tokens, signed with a shared secret.
pub const TOKEN_TYPE_DEV: &str = "SISKMSd";

/// Every token type issued by this crate starts with this prefix.
pub const TOKEN_TYPE_PREFIX: &str = "SISKMS";

/// Names the deployment environment. Takes precedence over [`RAILS_ENV`].
pub const SISJWT_ENV: &str = "SISJWT_ENV";

/// Fallback deployment environment variable.
pub const RAILS_ENV: &str = "RAILS_ENV";

/// When truthy, production accepts development tokens. Never set this in a
/// real deployment.
pub const UNSAFE_ALLOW_DEV_TOKEN_ENV: &str = "SISJWT_UNSAFE_ALLOW_DEV_TOKEN_IN_PROD";

/// Default token lifetime in production, in seconds.
pub const PRODUCTION_TOKEN_LIFETIME: u64 = 60;

/// Default token lifetime outside production, in seconds.
pub const DEVELOPMENT_TOKEN_LIFETIME: u64 = 3_600;

static CURRENT: OnceLock<Runtime> = OnceLock::new();

/// Snapshot of the deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runtime {
    production: bool,
    unsafe_allow_dev_token: bool,
}

impl Runtime {
    /// Creates a runtime from explicit flags.
    #[must_use]
    pub const fn new(production: bool, unsafe_allow_dev_token: bool) -> Self {
        Self { production, unsafe_allow_dev_token }
    }

    /// A production runtime without the development-token override.
    #[must_use]
    pub const fn production() -> Self {
        Self::new(true, false)
    }

    /// A non-production runtime.
    #[must_use]
    pub const fn development() -> Self {
        Self::new(false, false)
    }

    /// Reads the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a runtime from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = lookup(SISJWT_ENV)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| lookup(RAILS_ENV))
            .unwrap_or_default();
        let production = environment.trim().eq_ignore_ascii_case("production");
        let unsafe_allow_dev_token =
            lookup(UNSAFE_ALLOW_DEV_TOKEN_ENV).is_some_and(|value| is_truthy(&value));

        Self { production, unsafe_allow_dev_token }
    }

    /// The process-wide runtime, read from the environment on first use.
    pub fn current() -> Runtime {
        *CURRENT.get_or_init(|| {
            let runtime = Self::from_env();
            tracing::debug!(
                production = runtime.production,
                allow_dev_token = runtime.allow_dev_token(),
                "detected runtime"
            );
            runtime
        })
    }

    /// Are we running in production?
    #[must_use]
    pub const fn is_production(&self) -> bool {
        self.production
    }

    /// May development tokens be issued or accepted here?
    #[must_use]
    pub const fn allow_dev_token(&self) -> bool {
        !self.production || self.unsafe_allow_dev_token
    }

    /// Whether `token_type` is acceptable in this runtime.
    #[must_use]
    pub fn valid_token_type(&self, token_type: &str) -> bool {
        token_type == TOKEN_TYPE_V1 || (self.allow_dev_token() && token_type == TOKEN_TYPE_DEV)
    }

    /// Token type issued when none is configured.
    #[must_use]
    pub const fn default_token_type(&self) -> &'static str {
        if self.production { TOKEN_TYPE_V1 } else { TOKEN_TYPE_DEV }
    }

    /// Token lifetime in seconds when none is configured.
    #[must_use]
    pub const fn default_token_lifetime(&self) -> u64 {
        if self.production { PRODUCTION_TOKEN_LIFETIME } else { DEVELOPMENT_TOKEN_LIFETIME }
    }

    /// Credentials profile used when `AWS_PROFILE` is unset.
    #[must_use]
    pub const fn default_aws_profile(&self) -> &'static str {
        if self.production { "" } else { "dev" }
    }
}

/// Matches `y`, `yes`, `t`, `true` or `1`, ignoring case and surrounding whitespace.
fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "t" | "true" | "1")
}
