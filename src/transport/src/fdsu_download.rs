//! `FdsuDownloader` per-stream state machine (spec.md §4.7).
//!
//! This module is the pure, synchronous core: given packets and timeouts
//! as plain function calls, it decides what to copy, what to NACK, and
//! when to give up. [`crate::socket`] drives it from a real UDP socket.

use spalloc_core::{Result, TransportError};

use crate::sdp::{self, DataPacket, DATA_WORDS_PER_PACKET};

pub const TIMEOUT_RETRY_LIMIT: u32 = 15;

/// Outcome of one NACK cycle.
pub enum NackOutcome {
    /// `expected` is fully cleared; stream is done. Carries the CLEAR frame
    /// to send and the assembled buffer.
    Complete { clear_frame: Vec<u8>, buffer: Vec<u8> },
    /// Still missing sequence numbers; carries the NACK burst to send.
    Continue { frames: Vec<Vec<u8>> },
}

/// Per-stream download state (spec.md §4.7 "Per-stream state").
pub struct DownloadState {
    transaction_id: u32,
    max_seq: u32,
    expected: Vec<bool>,
    buffer: Vec<u8>,
    received: bool,
    timeout_count: u32,
    last_requested: Vec<u32>,
    miss_count: u64,
}

impl DownloadState {
    pub fn new(transaction_id: u32, size: usize) -> Self {
        let chunk = DATA_WORDS_PER_PACKET * 4;
        let max_seq = size.div_ceil(chunk.max(1)) as u32;
        Self {
            transaction_id,
            max_seq,
            expected: vec![true; max_seq as usize],
            buffer: vec![0u8; size],
            received: false,
            timeout_count: 0,
            last_requested: Vec::new(),
            miss_count: 0,
        }
    }

    pub fn start_frame(&self, start_address: u32) -> Vec<u8> {
        sdp::encode_start(self.transaction_id, start_address, self.buffer.len() as u32)
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count
    }

    /// spec.md §4.7 step 2's timeout branch.
    pub fn on_timeout(&mut self) -> Result<NackOutcome> {
        self.timeout_count += 1;
        if self.timeout_count > TIMEOUT_RETRY_LIMIT {
            return Err(TransportError::Timeout.into());
        }
        self.retransmit_missing()
    }

    /// spec.md §4.7 step 2's packet branch. Returns `Ok(None)` for a stale
    /// (wrong-transaction) packet, which callers simply discard.
    pub fn on_packet(&mut self, packet: DataPacket) -> Result<Option<NackOutcome>> {
        if packet.transaction_id != self.transaction_id {
            return Ok(None);
        }

        let seq = packet.seq_num;
        if seq > self.max_seq {
            return Err(TransportError::InsaneSequence { max: self.max_seq, got: seq }.into());
        }

        // spec.md §4.7's "sequencing subtlety": an exact-multiple-size
        // stream gets one extra zero-payload terminal packet at
        // seq == max_seq - 1, which must be accepted as LAST with no write.
        if !packet.payload.is_empty() {
            let offset = seq as usize * DATA_WORDS_PER_PACKET * 4;
            let end = (offset + packet.payload.len()).min(self.buffer.len());
            if offset < self.buffer.len() {
                self.buffer[offset..end].copy_from_slice(&packet.payload[..end - offset]);
            }
        }
        if (seq as usize) < self.expected.len() {
            self.expected[seq as usize] = false;
        }

        self.timeout_count = 0;
        self.received = true;

        if packet.last {
            return Ok(Some(self.retransmit_missing()?));
        }
        Ok(None)
    }

    /// spec.md §4.7 step 3 ("NACK").
    fn retransmit_missing(&mut self) -> Result<NackOutcome> {
        let missing: Vec<u32> = self
            .expected
            .iter()
            .enumerate()
            .filter(|(_, &still_missing)| still_missing)
            .map(|(i, _)| i as u32)
            .collect();

        if missing.is_empty() {
            return Ok(NackOutcome::Complete {
                clear_frame: sdp::encode_clear(self.transaction_id),
                buffer: std::mem::take(&mut self.buffer),
            });
        }

        if missing.len() == self.last_requested.len() && missing == self.last_requested && self.received {
            return Err(TransportError::Timeout.into());
        }
        if missing.len() > self.last_requested.len() {
            tracing::warn!(
                transaction_id = self.transaction_id,
                prev = self.last_requested.len(),
                now = missing.len(),
                "monitor's missing set grew between NACK cycles"
            );
        }

        self.miss_count += missing.len() as u64;
        let frames = sdp::encode_nack_burst(self.transaction_id, &missing);
        self.last_requested = missing;
        Ok(NackOutcome::Continue { frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: u32, last: bool, txn: u32, payload: &[u8]) -> DataPacket {
        DataPacket { seq_num: seq, last, transaction_id: txn, payload: payload.to_vec() }
    }

    #[test]
    fn happy_path_completes_with_full_buffer() {
        let chunk = DATA_WORDS_PER_PACKET * 4;
        let size = chunk + 100;
        let mut state = DownloadState::new(1, size);
        assert_eq!(state.max_seq, 2);

        let first_payload = vec![0xABu8; chunk];
        state.on_packet(packet(0, false, 1, &first_payload)).unwrap();
        let outcome = state.on_packet(packet(1, true, 1, &vec![0xCDu8; 100])).unwrap().unwrap();
        match outcome {
            NackOutcome::Complete { buffer, .. } => {
                assert_eq!(buffer.len(), size);
                assert_eq!(&buffer[..chunk], &first_payload[..]);
                assert_eq!(buffer[chunk], 0xCD);
            },
            NackOutcome::Continue { .. } => panic!("expected completion"),
        }
        assert_eq!(state.miss_count(), 0);
    }

    #[test]
    fn stale_transaction_packet_is_dropped() {
        let mut state = DownloadState::new(5, 10);
        let result = state.on_packet(packet(0, true, 4, &[1, 2, 3]));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn out_of_range_sequence_is_insane() {
        let mut state = DownloadState::new(1, 10);
        let err = state.on_packet(packet(99, false, 1, &[1])).unwrap_err();
        assert!(matches!(err, spalloc_core::Error::Transport(TransportError::InsaneSequence { .. })));
    }

    #[test]
    fn dropped_packet_triggers_one_retransmit_then_completes() {
        let chunk = DATA_WORDS_PER_PACKET * 4;
        let size = chunk * 2;
        let mut state = DownloadState::new(9, size);

        // seq 1 arrives first (seq 0 "dropped"), not last.
        let payload1 = vec![0x11u8; chunk];
        state.on_packet(packet(1, false, 9, &payload1)).unwrap();

        // Host times out waiting for more, issues NACK for seq 0.
        let outcome = state.on_timeout().unwrap();
        let NackOutcome::Continue { frames } = outcome else { panic!("still missing seq 0") };
        assert!(!frames.is_empty());

        let payload0 = vec![0x22u8; chunk];
        let outcome = state.on_packet(packet(0, true, 9, &payload0)).unwrap().unwrap();
        match outcome {
            NackOutcome::Complete { buffer, .. } => {
                assert_eq!(&buffer[..chunk], &payload0[..]);
                assert_eq!(&buffer[chunk..], &payload1[..]);
            },
            NackOutcome::Continue { .. } => panic!("expected completion after resend"),
        }
        assert_eq!(state.miss_count(), 1);
    }

    #[test]
    fn exact_multiple_size_accepts_zero_payload_last_packet() {
        let chunk = DATA_WORDS_PER_PACKET * 4;
        let size = chunk * 2;
        let mut state = DownloadState::new(3, size);
        state.on_packet(packet(0, false, 3, &vec![7u8; chunk])).unwrap();
        state.on_packet(packet(1, false, 3, &vec![8u8; chunk])).unwrap();
        // telemetry packet: zero payload, LAST flag, seq == max_seq - 1
        let outcome = state.on_packet(packet(1, true, 3, &[])).unwrap().unwrap();
        assert!(matches!(outcome, NackOutcome::Complete { .. }));
    }

    #[test]
    fn two_identical_nack_cycles_raise_timeout() {
        let mut state = DownloadState::new(1, 2000);
        state.on_packet(packet(0, false, 1, &[1, 2, 3])).unwrap();
        let outcome = state.on_timeout().unwrap();
        assert!(matches!(outcome, NackOutcome::Continue { .. }));
        let err = state.on_timeout().unwrap_err();
        assert!(matches!(err, spalloc_core::Error::Transport(TransportError::Timeout)));
    }

    #[test]
    fn too_many_timeouts_without_any_packet_is_fatal() {
        let mut state = DownloadState::new(1, 10);
        for _ in 0..TIMEOUT_RETRY_LIMIT {
            state.on_timeout().unwrap();
        }
        let err = state.on_timeout().unwrap_err();
        assert!(matches!(err, spalloc_core::Error::Transport(TransportError::Timeout)));
    }
}
