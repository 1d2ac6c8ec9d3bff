//! `FdsuUploader` (spec.md §4.8). Symmetric to the downloader but with no
//! host-side retransmission: the monitor core NACKs gaps over SDP and the
//! uploader turns those into targeted resends.

use crate::sdp::{
    self, DATA_IN_FULL_PACKET_WITHOUT_ADDRESS, DATA_IN_FULL_PACKET_WITH_ADDRESS,
};

/// Breaks `data` into the START + SEND_SEQ_DATA* + LAST frame sequence
/// (spec.md §4.8). Total packet count
/// `= ceil(max(size - first_chunk, 0) / next_chunk) + 1`.
pub fn build_upload_frames(
    base_address: u32,
    board_local_x: u8,
    board_local_y: u8,
    data: &[u8],
) -> Vec<Vec<u8>> {
    let first_chunk = data.len().min(DATA_IN_FULL_PACKET_WITH_ADDRESS);
    let (first, rest) = data.split_at(first_chunk);
    let next_chunk = DATA_IN_FULL_PACKET_WITHOUT_ADDRESS;
    let num_rest_packets = rest.len().div_ceil(next_chunk.max(1));
    let num_packets = num_rest_packets + 1;

    let mut frames = Vec::with_capacity(num_packets + 1);
    frames.push(sdp::encode_send_data_to_location(
        base_address,
        board_local_x,
        board_local_y,
        num_packets as u32,
        first,
    ));

    let mut seq = 0u32;
    for chunk in rest.chunks(next_chunk) {
        frames.push(sdp::encode_send_seq_data(seq, chunk));
        seq += 1;
    }
    frames.push(sdp::encode_send_last_data_in(seq));
    frames
}

/// Converts a monitor-reported NACK list into targeted `SEND_SEQ_DATA`
/// resends, re-slicing `data` the same way [`build_upload_frames`] did.
pub fn build_retransmit_frames(data: &[u8], missing_seqs: &[u32]) -> Vec<Vec<u8>> {
    let first_chunk = data.len().min(DATA_IN_FULL_PACKET_WITH_ADDRESS);
    let rest = &data[first_chunk..];
    let next_chunk = DATA_IN_FULL_PACKET_WITHOUT_ADDRESS;

    missing_seqs
        .iter()
        .filter_map(|&seq| {
            let start = seq as usize * next_chunk;
            let end = (start + next_chunk).min(rest.len());
            (start < rest.len()).then(|| sdp::encode_send_seq_data(seq, &rest[start..end]))
        })
        .collect()
}
