//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays reserved for command output. The
//! filter comes from `RUST_LOG` when set, otherwise `info` (or `debug`
//! with `--verbose`).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    // Ignore the error if a subscriber is already installed (tests, embedding).
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
