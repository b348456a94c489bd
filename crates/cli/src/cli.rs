//! Argument parsing and command execution.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::Value;
use sisjwt::{ArnInventory, Claims, Mode, Runtime, SisJwt, SisJwtOptions};
use sisjwt_kms::KmsClient;
use sisjwt_kms_aws::{AwsKmsClient, AwsKmsConfig};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::{CliError, EXIT_OK, EXIT_REJECTED},
    logging,
};

/// sisjwt - sign and verify short-lived service tokens
///
/// Options are read from the environment (`SISJWT_*`, `AWS_REGION`,
/// `AWS_PROFILE`) and may be overridden with flags.
#[derive(Parser, Debug)]
#[command(name = "sisjwt", version, author)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity; repeatable
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Set verbosity, 0 (silent) to 5 (debug)
    #[arg(
        long = "verbose",
        value_name = "LEVEL",
        global = true,
        value_parser = clap::value_parser!(u8).range(0..=5)
    )]
    pub verbose_level: Option<u8>,

    /// Log nothing; only data is written
    #[arg(short, long, global = true)]
    pub silent: bool,

    #[command(flatten)]
    pub token: TokenArgs,
}

/// Token option overrides.
#[derive(Args, Debug, Default, Clone)]
pub struct TokenArgs {
    /// Token type to issue or accept
    #[arg(short = 't', long = "type", global = true)]
    pub token_type: Option<String>,

    /// KMS signing algorithm
    #[arg(short = 'a', long = "alg", global = true)]
    pub key_alg: Option<String>,

    /// KMS key id or ARN
    #[arg(long, global = true)]
    pub key_id: Option<String>,

    /// KMS region
    #[arg(short = 'r', long = "region", global = true)]
    pub aws_region: Option<String>,

    /// AWS profile
    #[arg(long = "profile", global = true)]
    pub aws_profile: Option<String>,

    /// Token lifetime in seconds
    #[arg(short = 'e', long, visible_alias = "expires", global = true)]
    pub ttl: Option<u64>,

    /// Issued-at, unix time
    #[arg(long, global = true)]
    pub iat: Option<i64>,

    /// Expiry, unix time
    #[arg(long, global = true)]
    pub exp: Option<i64>,

    /// Issuer
    #[arg(long, global = true)]
    pub iss: Option<String>,

    /// Audience
    #[arg(long, global = true)]
    pub aud: Option<String>,

    /// KMS endpoint override
    #[arg(long, env = "SISJWT_KMS_ENDPOINT", global = true)]
    pub kms_endpoint: Option<String>,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Issue a token and print it
    Sign {
        /// Claims as `key=value`; a bare `key` is dropped
        claims: Vec<String>,
    },
    /// Verify a token and print the result as JSON
    Verify {
        /// The token, or `-` to read it from stdin
        #[arg(default_value = "-")]
        token: String,

        /// ARN inventory file
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Inventory section to load; defaults to `RAILS_ENV`, then `development`
        #[arg(long, requires = "inventory")]
        inventory_env: Option<String>,
    },
}

/// What a successful command amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A token was issued.
    Signed,
    /// The token passed verification.
    Valid,
    /// The token was decoded but rejected.
    Rejected,
}

impl Outcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Numeric exit code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Signed | Self::Valid => EXIT_OK,
            Self::Rejected => EXIT_REJECTED,
        }
    }
}

impl TokenArgs {
    /// Writes every given flag over `options`.
    pub fn apply(&self, options: &mut SisJwtOptions) {
        if let Some(token_type) = &self.token_type {
            options.set_token_type(token_type);
        }
        if let Some(key_alg) = &self.key_alg {
            options.set_key_alg(key_alg);
        }
        if let Some(key_id) = &self.key_id {
            options.set_key_id(key_id);
        }
        if let Some(region) = &self.aws_region {
            options.set_aws_region(region);
        }
        if let Some(profile) = &self.aws_profile {
            options.set_aws_profile(profile);
        }
        if let Some(ttl) = self.ttl {
            options.set_token_lifetime(ttl);
        }
        if self.iat.is_some() {
            options.set_iat(self.iat);
        }
        if self.exp.is_some() {
            options.set_exp(self.exp);
        }
        if let Some(iss) = &self.iss {
            options.set_iss(iss);
        }
        if let Some(aud) = &self.aud {
            options.set_aud(aud);
        }
    }
}

impl Cli {
    /// Effective verbosity from flags and `SISJWT_VERBOSE`.
    #[must_use]
    pub fn verbosity(&self, env_default: Option<&str>) -> u8 {
        logging::verbosity(self.silent, self.verbose_level, self.verbose, env_default)
    }

    /// Options for this command: environment first, then flags.
    pub fn options(&self, runtime: Runtime, lookup: impl Fn(&str) -> Option<String>) -> SisJwtOptions {
        let mode = match self.command {
            Command::Sign { .. } => Mode::Sign,
            Command::Verify { .. } => Mode::Verify,
        };
        let mut options = SisJwtOptions::from_lookup(mode, runtime, lookup);
        self.token.apply(&mut options);
        options
    }

    /// An AWS client when `options` call for KMS.
    ///
    /// # Errors
    ///
    /// [`CliError::AwsConfig`] if the client configuration is invalid.
    pub fn kms_client(
        &self,
        options: &SisJwtOptions,
    ) -> Result<Option<Arc<dyn KmsClient>>, CliError> {
        if !options.kms_configured() {
            return Ok(None);
        }
        let config = AwsKmsConfig::builder()
            .region(options.aws_region().unwrap_or_default())
            .maybe_profile(options.aws_profile())
            .maybe_endpoint_url(self.token.kms_endpoint.clone())
            .build()?;
        tracing::debug!(region = config.region(), profile = ?config.profile(), "using AWS KMS");
        Ok(Some(Arc::new(AwsKmsClient::new(config))))
    }

    /// Runs the command, reading a `-` token from `stdin` and writing data to
    /// `stdout`.
    ///
    /// # Errors
    ///
    /// Configuration, key-management and I/O failures. A rejected token is an
    /// [`Outcome`], not an error.
    pub async fn execute<R, W>(
        &self,
        options: SisJwtOptions,
        kms: Option<Arc<dyn KmsClient>>,
        mut stdin: R,
        stdout: &mut W,
    ) -> Result<Outcome, CliError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::debug!(?options, "resolved options");
        match &self.command {
            Command::Sign { claims } => {
                let sisjwt = SisJwt::builder().options(Arc::new(options)).maybe_kms(kms).build()?;
                let token = sisjwt.encode(parse_claims(claims)).await?;
                stdout.write_all(token.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
                Ok(Outcome::Signed)
            },
            Command::Verify { token, inventory, inventory_env } => {
                let token = if token == "-" {
                    tracing::debug!("reading token from stdin");
                    let mut buffer = String::new();
                    stdin.read_to_string(&mut buffer).await?;
                    buffer
                } else {
                    token.clone()
                };
                let token = token.trim();
                if token.is_empty() {
                    return Err(CliError::EmptyToken);
                }

                let arn_inventory = match inventory {
                    Some(path) => {
                        let env = inventory_env.clone().unwrap_or_else(|| {
                            ArnInventory::default_environment(|name| std::env::var(name).ok())
                        });
                        Some(Arc::new(ArnInventory::from_path(path, &env)?))
                    },
                    None => None,
                };

                let issuer = options.iss().map(str::to_owned);
                let audience = options.aud().map(str::to_owned);
                let sisjwt = SisJwt::builder()
                    .options(Arc::new(options))
                    .maybe_kms(kms)
                    .maybe_arn_inventory(arn_inventory)
                    .build()?;

                let mut result = sisjwt.verify(token).await?;
                if let Some(issuer) = issuer {
                    result.add_allowed_issuer(issuer);
                }
                if let Some(audience) = audience {
                    result.add_allowed_audience(audience);
                }

                let rendered = serde_json::to_string(&result)?;
                stdout.write_all(rendered.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;

                if result.is_valid() {
                    Ok(Outcome::Valid)
                } else {
                    tracing::warn!(errors = ?result.errors().full_messages(), "token rejected");
                    Ok(Outcome::Rejected)
                }
            },
        }
    }
}

/// Turns `key=value` arguments into claims.
///
/// Integer values become JSON numbers so `iat=` and `exp=` overrides are kept.
/// A bare `key` maps to null, which encoding drops.
#[must_use]
pub fn parse_claims(pairs: &[String]) -> Claims {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.trim().to_owned(), claim_value(value.trim())),
            None => (pair.trim().to_owned(), Value::Null),
        })
        .collect()
}

fn claim_value(raw: &str) -> Value {
    raw.parse::<i64>().map_or_else(|_| Value::String(raw.to_owned()), Value::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;
    use sisjwt_kms::testutil::{TEST_SIGNING_ALGORITHM, memory_kms_with_key};

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    async fn run(cli: &Cli, options: SisJwtOptions, kms: Option<Arc<dyn KmsClient>>, stdin: &[u8]) -> (Outcome, String) {
        let mut stdout = Vec::new();
        let outcome = cli.execute(options, kms, stdin, &mut stdout).await.unwrap();
        (outcome, String::from_utf8(stdout).unwrap())
    }

    #[test]
    fn parses_sign_with_claims_and_flags() {
        let cli = Cli::try_parse_from([
            "sisjwt", "-vv", "sign", "sub=user-1", "admin", "--iss", "SIE", "--ttl", "30",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.token.iss.as_deref(), Some("SIE"));
        assert_eq!(cli.token.ttl, Some(30));
        match &cli.command {
            Command::Sign { claims } => assert_eq!(claims, &["sub=user-1", "admin"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verify_defaults_to_stdin() {
        let cli = Cli::try_parse_from(["sisjwt", "verify"]).unwrap();
        assert!(matches!(cli.command, Command::Verify { ref token, .. } if token == "-"));
    }

    #[test]
    fn inventory_env_requires_inventory() {
        assert!(Cli::try_parse_from(["sisjwt", "verify", "tok", "--inventory-env", "test"]).is_err());
    }

    #[test]
    fn verbose_level_is_bounded() {
        assert!(Cli::try_parse_from(["sisjwt", "--verbose", "6", "verify"]).is_err());
        let cli = Cli::try_parse_from(["sisjwt", "--verbose", "1", "-s", "verify"]).unwrap();
        assert_eq!(cli.verbosity(None), 0);
    }

    #[test]
    fn claims_parse_integers_and_bare_keys() {
        let claims = parse_claims(&["sub=user-1".into(), "exp=1700000060".into(), "flag".into(), "note=a=b".into()]);
        assert_eq!(claims["sub"], json!("user-1"));
        assert_eq!(claims["exp"], json!(1_700_000_060));
        assert_eq!(claims["flag"], Value::Null);
        assert_eq!(claims["note"], json!("a=b"));
    }

    #[test]
    fn flags_override_environment() {
        let cli = Cli::try_parse_from(["sisjwt", "sign", "--iss", "SIE", "--region", "eu-west-1"]).unwrap();
        let options = cli.options(Runtime::development(), |name| {
            (name == "SISJWT_ISS").then(|| "SIC".to_owned())
        });
        assert_eq!(options.iss(), Some("SIE"));
        assert_eq!(options.aws_region(), Some("eu-west-1"));
        assert_eq!(options.aud(), Some("SISa"));
        assert_eq!(options.mode(), Mode::Sign);
    }

    #[test]
    fn dev_options_need_no_kms_client() {
        let cli = Cli::try_parse_from(["sisjwt", "sign"]).unwrap();
        let options = cli.options(Runtime::development(), no_env);
        assert!(cli.kms_client(&options).unwrap().is_none());
    }

    #[tokio::test]
    async fn dev_sign_then_verify_from_stdin() {
        let sign = Cli::try_parse_from(["sisjwt", "sign", "sub=user-1"]).unwrap();
        let (outcome, token) =
            run(&sign, sign.options(Runtime::development(), no_env), None, b"").await;
        assert_eq!(outcome, Outcome::Signed);
        assert_eq!(outcome.code(), EXIT_OK);
        assert_eq!(token.trim().split('.').count(), 3);

        let verify = Cli::try_parse_from(["sisjwt", "verify", "-"]).unwrap();
        let (outcome, output) =
            run(&verify, verify.options(Runtime::development(), no_env), None, token.as_bytes()).await;
        assert_eq!(outcome, Outcome::Valid);

        let report: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["valid"], json!(true));
        assert_eq!(report["payload"]["sub"], json!("user-1"));
        assert_eq!(report["allowed"]["iss"], json!(["SISi"]));
        assert!(report.get("lifetime").is_some());
    }

    #[tokio::test]
    async fn garbage_token_is_rejected_with_exit_code_one() {
        let verify = Cli::try_parse_from(["sisjwt", "verify", "garbage"]).unwrap();
        let (outcome, output) =
            run(&verify, verify.options(Runtime::development(), no_env), None, b"").await;
        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(outcome.code(), EXIT_REJECTED);
        let report: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["errors"]["base"], json!(["Not enough or too many segments"]));
    }

    #[tokio::test]
    async fn empty_stdin_is_an_error() {
        let verify = Cli::try_parse_from(["sisjwt", "verify"]).unwrap();
        let mut stdout = Vec::new();
        let err = verify
            .execute(verify.options(Runtime::development(), no_env), None, &b"  \n"[..], &mut stdout)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::EmptyToken));
    }

    #[tokio::test]
    async fn missing_inventory_file_is_an_error() {
        let verify =
            Cli::try_parse_from(["sisjwt", "verify", "a.b.c", "--inventory", "/no/such/file.yaml"]).unwrap();
        let mut stdout = Vec::new();
        let err = verify
            .execute(verify.options(Runtime::development(), no_env), None, &b""[..], &mut stdout)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::SisJwt(sisjwt::SisJwtError::FileNotFound(_))), "{err:?}");
    }

    #[tokio::test]
    async fn kms_sign_then_verify() {
        let (memory, key_id) = memory_kms_with_key("us-west-2");
        let kms: Arc<dyn KmsClient> = memory;
        let env = move |name: &str| match name {
            "SISJWT_KEY_ID" => Some(key_id.clone()),
            "SISJWT_KEY_ALG" => Some(TEST_SIGNING_ALGORITHM.to_owned()),
            _ => None,
        };

        let sign = Cli::try_parse_from(["sisjwt", "sign", "--type", "SISKMS1.0"]).unwrap();
        let options = sign.options(Runtime::production(), &env);
        assert!(options.kms_configured());
        let (_, token) = run(&sign, options, Some(Arc::clone(&kms)), b"").await;

        let verify = Cli::try_parse_from(["sisjwt", "verify", token.trim()]).unwrap();
        let (outcome, output) =
            run(&verify, verify.options(Runtime::production(), &env), Some(kms), b"").await;
        assert_eq!(outcome, Outcome::Valid, "{output}");
        let report: Value = serde_json::from_str(&output).unwrap();
        assert!(report.get("lifetime").is_none());
        assert_eq!(report["headers"]["AWS_ALG"], json!(TEST_SIGNING_ALGORITHM));
    }

    #[test]
    fn kms_options_build_an_aws_client() {
        let cli = Cli::try_parse_from(["sisjwt", "sign", "--kms-endpoint", "http://localhost:4566"]).unwrap();
        let options = cli.options(Runtime::production(), |name| match name {
            "SISJWT_KEY_ID" => Some("alias/sisjwt".to_owned()),
            _ => None,
        });
        assert!(cli.kms_client(&options).unwrap().is_some());
    }
}
