//! stderr logging for the CLI.
//!
//! Verbosity levels follow the tool's historical scale: 0 is silent, 1 and 2
//! log errors, 3 adds warnings (the default), 4 info, 5 debug. `RUST_LOG`
//! overrides the level when set.

use tracing_subscriber::{EnvFilter, fmt};

/// Verbosity used when neither flags nor `SISJWT_VERBOSE` say otherwise.
pub const DEFAULT_VERBOSITY: u8 = 3;

/// Highest meaningful verbosity.
pub const MAX_VERBOSITY: u8 = 5;

/// Environment variable holding the default verbosity.
pub const VERBOSITY_ENV: &str = "SISJWT_VERBOSE";

/// Filter directive for a verbosity level.
#[must_use]
pub fn directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "off",
        1 | 2 => "error",
        3 => "warn",
        4 => "info",
        _ => "debug",
    }
}

/// Resolves the effective verbosity.
///
/// `silent` wins, then an explicit `level`, then the environment default
/// raised by one per `-v`.
#[must_use]
pub fn verbosity(silent: bool, level: Option<u8>, increments: u8, env_default: Option<&str>) -> u8 {
    if silent {
        return 0;
    }
    if let Some(level) = level {
        return level.min(MAX_VERBOSITY);
    }
    let base = env_default.and_then(|v| v.trim().parse::<u8>().ok()).unwrap_or(DEFAULT_VERBOSITY);
    base.saturating_add(increments).min(MAX_VERBOSITY)
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(verbosity)));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
