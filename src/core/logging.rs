//! `tracing` subscriber setup keyed off the configured verbosity.

use tracing_subscriber::EnvFilter;

/// Filter directive used when `RUST_LOG` is not set.
#[must_use]
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "rotwatch=error",
        1 => "rotwatch=warn",
        _ => "rotwatch=info",
    }
}

/// Install a stderr fmt subscriber. `RUST_LOG` takes precedence over
/// `verbosity`. Returns `false` if a global subscriber was already installed.
pub fn init(verbosity: u8) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
