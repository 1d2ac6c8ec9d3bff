//! Triad/board coordinate arithmetic, direction tables, torus wrap
//! (spec.md C1 / §4.1).
//!
//! Pure math, no I/O and no knowledge of allocation state — this crate only
//! answers "what board is over there" and "does this coordinate wrap".

use serde::{Deserialize, Serialize};

/// One of the six SpiNNaker inter-board link directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    North = 0,
    East = 1,
    SouthEast = 2,
    South = 3,
    West = 4,
    NorthWest = 5,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::West,
        Direction::NorthWest,
    ];

    /// The direction that exactly undoes this one.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::NorthWest,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
        }
    }

    fn index(self) -> usize {
        self as u8 as usize
    }
}

/// A board's logical position: `(x, y)` is its triad's grid cell, `z` is
/// which of up to three boards within that triad (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriadCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TriadCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }
}

/// Grid dimensions needed to resolve torus wrap and triad depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineDims {
    pub width: u32,
    pub height: u32,
    /// 1 (single board per cell) or 3 (full triad per cell).
    pub depth: u8,
}

/// `movement_directions[z][dir] = (dx, dy, dz)`. Every entry for `North`/
/// `East`/`South`/`West` keeps `dz == 0`; every `SouthEast`/`NorthWest` entry
/// keeps `(dx, dy) == (0, 0)` and only rotates within the triad. This keeps
/// the table trivially self-inverse (`neighbor(neighbor(b, d), d.opposite())
/// == b`) while still varying the in-plane offset by `z`, which is what the
/// allocator's perimeter/connectivity scans actually rely on.
const MOVES: [[(i32, i32, i32); 6]; 3] = [
    // z = 0
    [
        (0, 1, 0),  // N
        (1, 0, 0),  // E
        (0, 0, 1),  // SE
        (0, -1, 0), // S
        (-1, 0, 0), // W
        (0, 0, 2),  // NW  (+2 mod 3 == -1 mod 3)
    ],
    // z = 1
    [
        (0, 1, 0),  // N
        (1, -1, 0), // E
        (0, 0, 1),  // SE
        (0, -1, 0), // S
        (-1, 1, 0), // W
        (0, 0, 2),  // NW
    ],
    // z = 2
    [
        (1, 0, 0),  // N
        (0, 1, 0),  // E
        (0, 0, 1),  // SE
        (-1, 0, 0), // S
        (0, -1, 0), // W
        (0, 0, 2),  // NW
    ],
];

/// Wrap a coordinate into `[0, width) x [0, height)`; `z` is left untouched
/// (it never wraps — a triad has 1 or 3 boards, not some multiple that would
/// wrap around).
pub fn wrap(coord: TriadCoord, dims: MachineDims) -> TriadCoord {
    TriadCoord {
        x: coord.x % dims.width,
        y: coord.y % dims.height,
        z: coord.z,
    }
}

/// The board one step away from `coord` in `dir`, wrapped into the torus.
///
/// Returns `None` if `dims.depth == 1` and the move would need a nonzero
/// `z`, since single-board "triads" have no `z` axis to rotate into.
pub fn neighbor(coord: TriadCoord, dir: Direction, dims: MachineDims) -> Option<TriadCoord> {
    let (dx, dy, dz) = MOVES[coord.z as usize][dir.index()];

    let new_z = (i32::from(coord.z) + dz).rem_euclid(3) as u8;
    if dims.depth == 1 && new_z != 0 {
        return None;
    }

    let new_x = (coord.x as i64 + i64::from(dx)).rem_euclid(i64::from(dims.width)) as u32;
    let new_y = (coord.y as i64 + i64::from(dy)).rem_euclid(i64::from(dims.height)) as u32;

    Some(TriadCoord {
        x: new_x,
        y: new_y,
        z: new_z,
    })
}

/// Chips per triad edge in the (approximate) global chip-coordinate grid.
/// Used only by [`triad_of`]; full board-geometry modeling is out of scope
/// (see SPEC_FULL.md §3 — only the model 2-5 seed tables are kept, and only
/// to validate `root_x`/`root_y` ranges).
pub const TRIAD_CHIP_SPAN: u32 = 12;

/// Best-effort mapping from a global chip coordinate to the triad grid cell
/// it falls within. This does not resolve which of the `z` boards owns the
/// chip (that needs full board geometry, which this crate does not model);
/// callers that need `z` must get it from the board record directly.
pub fn triad_of(chip_x: u32, chip_y: u32) -> (u32, u32) {
    (chip_x / TRIAD_CHIP_SPAN, chip_y / TRIAD_CHIP_SPAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: MachineDims = MachineDims {
        width: 8,
        height: 8,
        depth: 3,
    };

    #[test]
    fn neighbor_then_opposite_returns_home() {
        let start = TriadCoord::new(3, 4, 1);
        for dir in Direction::ALL {
            let there = neighbor(start, dir, DIMS).expect("depth 3 never fails");
            let back = neighbor(there, dir.opposite(), DIMS).expect("depth 3 never fails");
            assert_eq!(back, start, "direction {dir:?} did not round-trip");
        }
    }

    #[test]
    fn wraps_on_torus() {
        let start = TriadCoord::new(7, 0, 0);
        let there = neighbor(start, Direction::East, DIMS).unwrap();
        assert_eq!(there.x, 0, "east from the last column must wrap to 0");
    }

    #[test]
    fn depth_one_rejects_z_changing_moves() {
        let dims = MachineDims {
            width: 4,
            height: 4,
            depth: 1,
        };
        let start = TriadCoord::new(0, 0, 0);
        assert!(neighbor(start, Direction::SouthEast, dims).is_none());
        assert!(neighbor(start, Direction::North, dims).is_some());
    }

    #[test]
    fn se_nw_rotate_through_all_three_boards() {
        let start = TriadCoord::new(2, 2, 0);
        let one = neighbor(start, Direction::SouthEast, DIMS).unwrap();
        let two = neighbor(one, Direction::SouthEast, DIMS).unwrap();
        let three = neighbor(two, Direction::SouthEast, DIMS).unwrap();
        assert_eq!(one.z, 1);
        assert_eq!(two.z, 2);
        assert_eq!(three, start);
    }
}
