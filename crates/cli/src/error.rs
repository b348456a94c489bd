//! CLI errors and exit codes.

use std::process::ExitCode;

use sisjwt::SisJwtError;
use sisjwt_kms_aws::AwsKmsError;
use thiserror::Error;

/// Exit code for a valid token or a successfully issued one.
pub const EXIT_OK: u8 = 0;

/// Exit code for a token that was decoded but rejected.
pub const EXIT_REJECTED: u8 = 1;

/// Exit code for configuration and infrastructure failures.
pub const EXIT_ERROR: u8 = 2;

/// Anything that stops a command from producing output.
#[derive(Debug, Error)]
pub enum CliError {
    /// Options, inventory or key-management failure.
    #[error(transparent)]
    SisJwt(#[from] SisJwtError),

    /// The AWS client could not be configured.
    #[error("AWS KMS client: {0}")]
    AwsConfig(#[from] AwsKmsError),

    /// No token was given on the command line or stdin.
    #[error("no token given")]
    EmptyToken,

    /// Reading stdin or writing stdout failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The result could not be rendered.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(EXIT_ERROR)
    }
}
