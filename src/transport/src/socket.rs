//! Drives [`crate::fdsu_download::DownloadState`] from a real UDP socket:
//! one task per board, each owning its own socket, buffer and bitset
//! (spec.md §4.7 "Parallelism").

use std::net::SocketAddr;
use std::time::Duration;

use spalloc_core::{Result, TransportConfig};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::fdsu_download::{DownloadState, NackOutcome};
use crate::sdp;

/// Runs one FDSU download to completion against `peer`, returning the
/// assembled buffer and the aggregated `miss_count` (spec.md §4.7
/// "Termination").
pub async fn download(
    socket: &UdpSocket,
    peer: SocketAddr,
    config: &TransportConfig,
    transaction_id: u32,
    start_address: u32,
    size: usize,
) -> Result<(Vec<u8>, u64)> {
    let mut state = DownloadState::new(transaction_id, size);
    rate_limited_send(socket, peer, &state.start_frame(start_address), config.inter_send_interval()).await?;

    let mut buf = vec![0u8; sdp::SDP_PAYLOAD_WORDS * 4];
    loop {
        match timeout(config.timeout_per_receive(), socket.recv_from(&mut buf)).await {
            Err(_elapsed) => {
                if let NackOutcome::Continue { frames } = state.on_timeout()? {
                    send_nack_burst(socket, peer, frames, config).await?;
                }
            },
            Ok(Err(err)) => return Err(io_err(err)),
            Ok(Ok((n, _from))) => {
                let packet = sdp::decode_data(&buf[..n])?;
                if let Some(outcome) = state.on_packet(packet)? {
                    match outcome {
                        NackOutcome::Complete { clear_frame, buffer } => {
                            rate_limited_send(socket, peer, &clear_frame, config.inter_send_interval()).await?;
                            return Ok((buffer, state.miss_count()));
                        },
                        NackOutcome::Continue { frames } => {
                            send_nack_burst(socket, peer, frames, config).await?;
                        },
                    }
                }
            },
        }
    }
}

/// Sends each frame in a NACK burst no closer together than
/// `max(DELAY_PER_SEND, INTER_SEND_INTERVAL_NS)` (spec.md §4.7).
async fn send_nack_burst(
    socket: &UdpSocket,
    peer: SocketAddr,
    frames: Vec<Vec<u8>>,
    config: &TransportConfig,
) -> Result<()> {
    let spacing = config.delay_per_send().max(config.inter_send_interval());
    for frame in frames {
        rate_limited_send(socket, peer, &frame, spacing).await?;
    }
    Ok(())
}

/// Enforces a minimum spacing after sending a host->gatherer frame so the
/// gatherer can't be overrun (spec.md §4.7's `INTER_SEND_INTERVAL_NS`).
pub async fn rate_limited_send(socket: &UdpSocket, peer: SocketAddr, frame: &[u8], min_interval: Duration) -> Result<()> {
    socket.send_to(frame, peer).await.map_err(io_err)?;
    tokio::time::sleep(min_interval).await;
    Ok(())
}

fn io_err(err: std::io::Error) -> spalloc_core::Error {
    spalloc_core::TransportError::InterruptedIo(err.to_string()).into()
}
