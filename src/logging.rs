//! Tracing setup for the CLI.
//!
//! Diagnostics go to stderr so they never mix with forwarded stage output on
//! stdout. `SOLCOVER_LOG` takes a standard `EnvFilter` directive; without it
//! the level is `info`, or `debug` with `--verbose`. Every forwarded stage
//! line is also traced at `trace` under the `solcover::output` target.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV_VAR: &str = "SOLCOVER_LOG";

pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "solcover=debug" } else { "solcover=info" }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
