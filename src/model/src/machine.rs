//! `Machine`, `Board`, `Link` (spec.md §3).

use serde::{Deserialize, Serialize};
use spalloc_topology::Direction;

use crate::ids::{BoardId, JobId, LinkId, MachineId};

/// A torus of boards (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// 1 or 3.
    pub depth: u8,
    pub board_model: u8,
    pub default_quota: Option<u64>,
    pub in_service: bool,
}

impl Machine {
    /// spec.md §3: `width>0 ∧ height>0`; names forbid `{}`.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("machine width and height must be positive".into());
        }
        if self.depth != 1 && self.depth != 3 {
            return Err("machine depth must be 1 or 3".into());
        }
        if self.name.contains('{') || self.name.contains('}') {
            return Err("machine name may not contain '{' or '}'".into());
        }
        Ok(())
    }

    pub fn dims(&self) -> spalloc_topology::MachineDims {
        spalloc_topology::MachineDims {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }
}

/// Tri-state functioning flag: a board can be known-good, known-bad, or
/// simply not yet tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Functioning {
    Working,
    Dead,
    Unknown,
}

impl Functioning {
    fn is_false(self) -> bool {
        matches!(self, Functioning::Dead)
    }
}

/// Why a board was blacklisted — attached metadata rather than a bare
/// string, so the allocator can log *why* a board was skipped (SPEC_FULL.md
/// §3 supplement).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub reason: String,
    pub set_at: i64,
}

/// `(machine, x, y, z)` unique (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub machine: MachineId,
    pub x: u32,
    pub y: u32,
    pub z: u8,
    pub root_x: u32,
    pub root_y: u32,
    pub bmp_address: Option<String>,
    pub board_num: Option<u32>,
    pub allocated_job: Option<JobId>,
    pub functioning: Functioning,
    pub power_off_timestamp: Option<i64>,
    pub power_on_timestamp: Option<i64>,
    pub blacklist: Vec<BlacklistEntry>,
}

impl Board {
    /// spec.md §3: `may_be_allocated = (board_num≠null) ∧ (allocated_job=null)
    /// ∧ (functioning≠false)`.
    pub fn may_be_allocated(&self) -> bool {
        self.board_num.is_some() && self.allocated_job.is_none() && !self.functioning.is_false()
    }

    /// spec.md §4.5: a board is busy while either its last power-on or
    /// power-off settle window has not yet elapsed.
    pub fn is_busy(&self, now: i64, on_delay_secs: i64, off_delay_secs: i64) -> bool {
        let on_ready = self.power_on_timestamp.map(|t| t + on_delay_secs);
        let off_ready = self.power_off_timestamp.map(|t| t + off_delay_secs);
        let busy_until = on_ready.into_iter().chain(off_ready).max();
        busy_until.is_some_and(|t| now < t)
    }
}

/// Directed link `(board_1, dir_1) ↔ (board_2, dir_2)` (spec.md §3).
/// Enforced ordering `board_1 ≤ board_2`; unique on `(board, dir)` for each
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub board_1: BoardId,
    pub dir_1: Direction,
    pub board_2: BoardId,
    pub dir_2: Direction,
    pub live: bool,
}

impl Link {
    /// Constructs a link, enforcing `board_1 <= board_2` by swapping ends if
    /// needed (spec.md §3 invariant).
    pub fn new(id: LinkId, a: (BoardId, Direction), b: (BoardId, Direction), live: bool) -> Self {
        if a.0 <= b.0 {
            Self {
                id,
                board_1: a.0,
                dir_1: a.1,
                board_2: b.0,
                dir_2: b.1,
                live,
            }
        } else {
            Self {
                id,
                board_1: b.0,
                dir_1: b.1,
                board_2: a.0,
                dir_2: a.1,
                live,
            }
        }
    }

    /// The endpoint (board, direction) pair that is not `board`, if `board`
    /// is one of this link's endpoints.
    pub fn other_end(&self, board: BoardId) -> Option<(BoardId, Direction)> {
        if board == self.board_1 {
            Some((self.board_2, self.dir_2))
        } else if board == self.board_2 {
            Some((self.board_1, self.dir_1))
        } else {
            None
        }
    }

    /// The (board, direction) pair on `board`'s own side of the link.
    pub fn this_end(&self, board: BoardId) -> Option<(BoardId, Direction)> {
        if board == self.board_1 {
            Some((self.board_1, self.dir_1))
        } else if board == self.board_2 {
            Some((self.board_2, self.dir_2))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_orders_its_endpoints() {
        let link = Link::new(
            LinkId::new(0),
            (BoardId::new(5), Direction::North),
            (BoardId::new(1), Direction::South),
            true,
        );
        assert!(link.board_1 <= link.board_2);
        assert_eq!(link.board_1, BoardId::new(1));
        assert_eq!(link.dir_1, Direction::South);
    }

    #[test]
    fn may_be_allocated_requires_all_three_conditions() {
        let mut board = Board {
            id: BoardId::new(0),
            machine: MachineId::new(0),
            x: 0,
            y: 0,
            z: 0,
            root_x: 0,
            root_y: 0,
            bmp_address: None,
            board_num: Some(1),
            allocated_job: None,
            functioning: Functioning::Working,
            power_off_timestamp: None,
            power_on_timestamp: None,
            blacklist: vec![],
        };
        assert!(board.may_be_allocated());

        board.allocated_job = Some(JobId::new(1));
        assert!(!board.may_be_allocated());

        board.allocated_job = None;
        board.functioning = Functioning::Dead;
        assert!(!board.may_be_allocated());

        board.functioning = Functioning::Working;
        board.board_num = None;
        assert!(!board.may_be_allocated());
    }
}
