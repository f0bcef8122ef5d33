//! Log output for programs driving sandboxes.
//!
//! Session events (sandbox started, stopped, leaked, each orchestrator
//! request) are emitted through `tracing`; nothing is printed unless the host
//! installs a subscriber. [`init_tracing`] is the setup `msb` uses. It writes
//! to stderr because stdout carries the sandboxed program's own output, and
//! `msb --output json` must stay parseable when logging is on.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a stderr subscriber filtered by `RUST_LOG`, or by `level` when
/// it is unset. `json` switches to one JSON object per event. Later calls
/// are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
