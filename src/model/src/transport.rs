//! Transport-facing model types: `Vertex`, `Placement`, `Gather`,
//! `Monitor`, `Region`, `RecordingRegion` (spec.md §3, §6).

use serde::{Deserialize, Serialize};
use spalloc_core::{Error, Result};

/// An APLX vertex as seen by the downloader: which recording regions it
/// owns (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub label: String,
    pub base: u32,
    pub recorded_region_ids: Vec<u16>,
}

/// A core on a chip, `(x, y, p)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Core {
    pub x: u8,
    pub y: u8,
    pub p: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub core: Core,
    pub vertex: Vertex,
}

/// An extra-monitor core that streams recorded data off one board
/// (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub core: Core,
    pub placements: Vec<Placement>,
    /// Refreshed before each download session, incremented per stream, so
    /// stale replies from a prior session can be discarded (spec.md §3).
    pub transaction_id: u32,
}

/// One board's worth of gather wiring: the `Gather` core plus its IPTag and
/// the monitors it fans in from (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gather {
    pub core: Core,
    pub iptag: u16,
    pub monitors: Vec<Monitor>,
    pub transaction_id: u32,
}

/// A concrete byte range to fetch from SDRAM (spec.md §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Region {
    pub core: Core,
    pub region_index: u16,
    pub start_address: u32,
    pub size_bytes: u32,
}

/// The on-chip circular-buffer descriptor the downloader reads before
/// fetching region contents (spec.md §6): 12 bytes little-endian,
/// `u32 space; u32 missing_and_size; u32 data_addr`, where the top bit of
/// the second word is the `missing` flag and the remaining 31 bits are
/// `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingRegion {
    pub space: u32,
    pub missing: bool,
    pub size: u32,
    pub data_addr: u32,
}

const MISSING_BIT: u32 = 1 << 31;
const SIZE_MASK: u32 = !MISSING_BIT;

impl RecordingRegion {
    /// Decodes the 12-byte little-endian descriptor (spec.md §6).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 12 {
            return Err(Error::Unexpected(format!(
                "recording region descriptor must be 12 bytes, got {}",
                bytes.len()
            )));
        }
        let space = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let missing_and_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let data_addr = u32::from_le_bytes(bytes[8..12].try_into().unwrap());

        Ok(Self {
            space,
            missing: missing_and_size & MISSING_BIT != 0,
            size: missing_and_size & SIZE_MASK,
            data_addr,
        })
    }

    /// Re-encodes, for round-trip tests and for constructing fixtures.
    pub fn encode(&self) -> [u8; 12] {
        let mut missing_and_size = self.size & SIZE_MASK;
        if self.missing {
            missing_and_size |= MISSING_BIT;
        }
        let mut out = [0u8; 12];
        out[0..4].copy_from_slice(&self.space.to_le_bytes());
        out[4..8].copy_from_slice(&missing_and_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.data_addr.to_le_bytes());
        out
    }
}

/// JSON gather descriptor file consumed by transport (spec.md §6):
/// `List<Gather>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatherDescriptor(pub Vec<Gather>);

/// JSON machine descriptor file consumed by transport (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth: u8,
}

/// JSON placements descriptor file consumed by transport (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementsDescriptor(pub Vec<Placement>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_region_round_trips() {
        let region = RecordingRegion {
            space: 4096,
            missing: true,
            size: 0x7FFF_FFFF,
            data_addr: 0x7000_0000,
        };
        let bytes = region.encode();
        assert_eq!(RecordingRegion::decode(&bytes).unwrap(), region);
    }

    #[test]
    fn missing_bit_does_not_leak_into_size() {
        let bytes = [0u8, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];
        let region = RecordingRegion::decode(&bytes).unwrap();
        assert!(region.missing);
        assert_eq!(region.size, 0x7FFF_FFFF);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(RecordingRegion::decode(&[0u8; 11]).is_err());
    }
}
