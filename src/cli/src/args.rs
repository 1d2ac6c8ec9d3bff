//! Commandline arguments (spec.md §6).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(about, long_about = None, name = "spalloc")]
pub struct Args {
    /// Path to the config TOML file (optional; falls back to built-in
    /// defaults and `SPALLOC_*` environment overrides).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch recorded data for every region named in a gather descriptor.
    Gather {
        /// JSON gather descriptor (`List<Gather>`, spec.md §6).
        #[arg(long)]
        gather_file: PathBuf,
        /// JSON machine descriptor.
        #[arg(long)]
        machine_file: PathBuf,
        /// JSON placements descriptor.
        #[arg(long)]
        placements_file: PathBuf,
        /// Gatherer UDP endpoint to talk to.
        #[arg(long)]
        host: SocketAddr,
    },

    /// Download a single contiguous region over FDSU.
    Download {
        #[arg(long)]
        host: SocketAddr,
        #[arg(long)]
        transaction_id: u32,
        #[arg(long)]
        start_address: u32,
        #[arg(long)]
        size_bytes: usize,
    },

    /// Execute a data specification (core-local memory layout).
    Dse {
        #[arg(long)]
        ds_file: PathBuf,
    },

    /// Execute system-application data specifications.
    DseSys {
        #[arg(long)]
        ds_file: PathBuf,
    },

    /// Execute user-application data specifications.
    DseApp {
        #[arg(long)]
        ds_file: PathBuf,
    },

    /// Execute user-application data specifications with monitor cores.
    DseAppMon {
        #[arg(long)]
        ds_file: PathBuf,
    },

    /// Dump a core's IOBUF output.
    Iobuf {
        #[arg(long)]
        host: SocketAddr,
        #[arg(long)]
        core: u32,
    },

    /// Listen for boot requests from unbooted boards.
    ListenForUnbooted {
        #[arg(long, default_value_t = 54321)]
        port: u16,
    },

    /// Print the build version.
    Version,
}
