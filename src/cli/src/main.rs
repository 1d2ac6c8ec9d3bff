//! `spalloc` CLI entry point (spec.md §6): `gather`, `download`, `dse`,
//! `dse_sys`, `dse_app`, `dse_app_mon`, `iobuf`, `listen_for_unbooted`,
//! `version`.

mod args;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use spalloc_core::Config;

use args::{Args, Command};

/// `0` success, `3` misbuilt (missing static version property), `nonzero`
/// generic failure (spec.md §6).
fn main() -> ExitCode {
    let args = Args::parse();
    spalloc_core::log::init();

    if matches!(args.command, Command::Version) {
        return match build_version() {
            Some(version) => {
                println!("spalloc {version}");
                ExitCode::SUCCESS
            },
            None => {
                tracing::error!("binary is missing its static version property");
                ExitCode::from(3)
            },
        };
    }

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            return ExitCode::FAILURE;
        },
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(%err, "failed to start async runtime");
            return ExitCode::FAILURE;
        },
    };

    match runtime.block_on(commands::dispatch(args.command, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "command failed");
            ExitCode::FAILURE
        },
    }
}

/// Guards against a binary built without its version metadata embedded,
/// which spec.md §6 calls out as exit code 3's specific "misbuilt" case.
fn build_version() -> Option<&'static str> {
    option_env!("CARGO_PKG_VERSION")
}
