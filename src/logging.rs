//! Logging setup for the `rowrange` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the application. The binary calls [`init_logging`], which writes to stderr
//! so stdout stays clean for row output.
//!
//! ## Level priority
//!
//! 1. Explicit level (the `--log-level` flag)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `warn`

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init_logging(level: Option<&str>) {
    LOGGING_INITIALIZED.get_or_init(|| {
        if level.is_some_and(|l| l.eq_ignore_ascii_case("off")) {
            return;
        }

        let filter = match level {
            Some(level) => EnvFilter::new(format!("rowrange={}", level.to_lowercase())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rowrange=warn")),
        };

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init();
    });
}
