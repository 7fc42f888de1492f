//! Diagnostic logging to stderr.
//!
//! The filter comes from `BUCK_LAUNCHER_LOG`, then `RUST_LOG`, then defaults
//! to `warn` so a normal run prints nothing but problems. Stdout is left to
//! the engine.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable with the launcher's own log filter.
pub const LOG_ENV: &str = "BUCK_LAUNCHER_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber. Only the first call takes effect.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init()
        .ok();
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
