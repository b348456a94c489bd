//! `sisjwt` command line entry point.

mod cli;
mod error;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use sisjwt::Runtime;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbosity(std::env::var(logging::VERBOSITY_ENV).ok().as_deref()));

    let runtime = Runtime::from_env();
    let options = cli.options(runtime, |name| std::env::var(name).ok());
    tracing::debug!(production = runtime.is_production(), "starting");

    let outcome = match cli.kms_client(&options) {
        Ok(kms) => cli.execute(options, kms, tokio::io::stdin(), &mut tokio::io::stdout()).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            err.exit_code()
        },
    }
}
