//! Logging subsystem init.
//!
//! The teacher wraps `tracing`'s macros in its own `error!`/`warn!`/`info!`
//! so project code never names the `tracing` crate directly. That wrapper
//! carries no behavior of its own here, so this workspace calls `tracing`'s
//! macros directly and keeps only the subscriber setup, which is the part
//! that actually varies by deployment.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a global `tracing` subscriber reading `RUST_LOG` (default `info`).
/// Idempotent-ish: safe to call once at process startup; a second call is a
/// caller bug, not handled specially here.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    // Ignore the error: tests may install a subscriber once per process and
    // a second attempt should not panic the test binary.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
