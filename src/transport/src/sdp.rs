//! `SdpFramer`: wire layout for FDSU messages (spec.md §4.6).
//!
//! All multi-byte fields are little-endian, as required everywhere on this
//! wire (spec.md §6).

use bytes::{BufMut, BytesMut};
use spalloc_core::{Result, TransportError};

/// Fixed per spec.md §4.6: "SDP payload body is at most `SDP_PAYLOAD_WORDS`
/// 32-bit words (fixed constant, ~68 words ~ 272 bytes)".
pub const SDP_PAYLOAD_WORDS: usize = 68;
pub const DATA_WORDS_PER_PACKET: usize = SDP_PAYLOAD_WORDS - 2;
pub const MAX_FIRST_SIZE: usize = SDP_PAYLOAD_WORDS - 3;
pub const MAX_NEXT_SIZE: usize = SDP_PAYLOAD_WORDS - 2;
/// How many `MISSING_NEXT` packets may follow one `MISSING_FIRST` burst.
pub const NEXT_MESSAGES_COUNT: usize = 7;
pub const MAX_REQ_LOAD: usize = MAX_FIRST_SIZE + NEXT_MESSAGES_COUNT * MAX_NEXT_SIZE;

pub const LAST_FLAG: u32 = 0x8000_0000;

pub const CMD_START_SENDING_DATA: u32 = 100;
pub const CMD_START_MISSING_SEQS: u32 = 1000;
pub const CMD_NEXT_MISSING_SEQS: u32 = 1001;
pub const CMD_CLEAR_TRANSMISSIONS: u32 = 2000;
pub const CMD_SEND_DATA_TO_LOCATION: u32 = 200;
pub const CMD_SEND_SEQ_DATA: u32 = 201;
pub const CMD_SEND_LAST_DATA_IN: u32 = 202;

/// `(base_address, board_local_x, board_local_y, num_packets)` header,
/// leaving `SDP_PAYLOAD_WORDS - 5` words for the first chunk of payload
/// (cmd word + 4 header words).
pub const DATA_IN_FULL_PACKET_WITH_ADDRESS: usize = (SDP_PAYLOAD_WORDS - 5) * 4;
/// `seq_num` header only (cmd word + seq word).
pub const DATA_IN_FULL_PACKET_WITHOUT_ADDRESS: usize = (SDP_PAYLOAD_WORDS - 2) * 4;

/// The 8 bytes the SDP spec nominally reserves for flags/dest core/port
/// ahead of the command word; not modelled field-by-field since this
/// protocol only ever runs `REPLY_NOT_EXPECTED` host<->gatherer traffic.
pub const SDP_HEADER_BYTES: usize = 8;

fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| TransportError::InterruptedIo(format!("short packet, wanted u32 at {at}")).into())
}

/// Encodes the SDP header + command id prefix common to every frame.
pub fn encode_header(cmd: u32) -> BytesMut {
    let mut out = BytesMut::with_capacity(SDP_HEADER_BYTES + 4);
    out.put_bytes(0, SDP_HEADER_BYTES);
    out.put_u32_le(cmd);
    out
}

pub fn decode_cmd(bytes: &[u8]) -> Result<u32> {
    read_u32(bytes, SDP_HEADER_BYTES)
}

/// START (host -> gatherer): `cmd, transaction_id, start_address, size_bytes`.
pub fn encode_start(transaction_id: u32, start_address: u32, size_bytes: u32) -> Vec<u8> {
    let mut out = encode_header(CMD_START_SENDING_DATA);
    out.put_u32_le(transaction_id);
    out.put_u32_le(start_address);
    out.put_u32_le(size_bytes);
    out.to_vec()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub seq_num: u32,
    pub last: bool,
    pub transaction_id: u32,
    pub payload: Vec<u8>,
}

/// DATA (monitor -> host): `seq_num | LAST_FLAG, transaction_id, payload`.
/// There is no command word on this frame; the monitor distinguishes it
/// from host->gatherer traffic by source core (spec.md §4.7).
pub fn decode_data(bytes: &[u8]) -> Result<DataPacket> {
    let raw_seq = read_u32(bytes, 0)?;
    let transaction_id = read_u32(bytes, 4)?;
    let payload = bytes.get(8..).unwrap_or_default().to_vec();
    Ok(DataPacket {
        seq_num: raw_seq & !LAST_FLAG,
        last: raw_seq & LAST_FLAG != 0,
        transaction_id,
        payload,
    })
}

pub fn encode_data(seq_num: u32, last: bool, transaction_id: u32, payload: &[u8]) -> Vec<u8> {
    let raw_seq = if last { seq_num | LAST_FLAG } else { seq_num };
    let mut out = BytesMut::with_capacity(8 + payload.len());
    out.put_u32_le(raw_seq);
    out.put_u32_le(transaction_id);
    out.put_slice(payload);
    out.to_vec()
}

/// MISSING_FIRST (host -> gatherer). `num_packets_in_this_burst` is the
/// total requested count across the whole NACK burst, not just the seqs
/// that fit in this frame (spec.md §4.7).
pub fn encode_missing_first(transaction_id: u32, num_packets_in_this_burst: u32, missing: &[u32]) -> Vec<u8> {
    let take = missing.len().min(MAX_FIRST_SIZE);
    let mut out = encode_header(CMD_START_MISSING_SEQS);
    out.put_u32_le(transaction_id);
    out.put_u32_le(num_packets_in_this_burst);
    for &seq in &missing[..take] {
        out.put_u32_le(seq);
    }
    out.to_vec()
}

/// MISSING_NEXT (host -> gatherer).
pub fn encode_missing_next(transaction_id: u32, missing: &[u32]) -> Vec<u8> {
    let take = missing.len().min(MAX_NEXT_SIZE);
    let mut out = encode_header(CMD_NEXT_MISSING_SEQS);
    out.put_u32_le(transaction_id);
    for &seq in &missing[..take] {
        out.put_u32_le(seq);
    }
    out.to_vec()
}

pub fn encode_clear(transaction_id: u32) -> Vec<u8> {
    let mut out = encode_header(CMD_CLEAR_TRANSMISSIONS);
    out.put_u32_le(transaction_id);
    out.to_vec()
}

/// Splits `missing`, capped at [`MAX_REQ_LOAD`], into one `MISSING_FIRST`
/// frame followed by zero or more `MISSING_NEXT` frames (spec.md §4.7 NACK
/// packetization).
pub fn encode_nack_burst(transaction_id: u32, missing: &[u32]) -> Vec<Vec<u8>> {
    let capped = &missing[..missing.len().min(MAX_REQ_LOAD)];
    let mut frames = Vec::new();
    let (first, rest) = capped.split_at(capped.len().min(MAX_FIRST_SIZE));
    frames.push(encode_missing_first(transaction_id, capped.len() as u32, first));
    for chunk in rest.chunks(MAX_NEXT_SIZE) {
        frames.push(encode_missing_next(transaction_id, chunk));
    }
    frames
}

/// SEND_DATA_TO_LOCATION (host -> monitor, upload start).
pub fn encode_send_data_to_location(
    base_address: u32,
    board_local_x: u8,
    board_local_y: u8,
    num_packets: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = encode_header(CMD_SEND_DATA_TO_LOCATION);
    out.put_u32_le(base_address);
    out.put_u8(board_local_x);
    out.put_u8(board_local_y);
    out.put_bytes(0, 2);
    out.put_u32_le(num_packets);
    out.put_slice(payload);
    out.to_vec()
}

pub fn encode_send_seq_data(seq_num: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = encode_header(CMD_SEND_SEQ_DATA);
    out.put_u32_le(seq_num);
    out.put_slice(payload);
    out.to_vec()
}

pub fn encode_send_last_data_in(seq_num: u32) -> Vec<u8> {
    let mut out = encode_header(CMD_SEND_LAST_DATA_IN);
    out.put_u32_le(seq_num);
    out.to_vec()
}
