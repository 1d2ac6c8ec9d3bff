//! In-memory projection of `PersistentStore` (spec.md §4.2): `Map<machine_id,
//! MachineView>` with boards, `(x,y,z)` indexes, and an adjacency list of
//! live links. Rebuilt lazily and invalidated whenever an allocator
//! transaction commits (spec.md §5: "`BoardGraph` is read-mostly; writes
//! happen only inside an allocator transaction").

use std::collections::{HashMap, HashSet, VecDeque};

use spalloc_core::{AllocError, Result};
use spalloc_model::{Board, BoardId, Link, LinkId, Machine, MachineId, MachineSnapshot};
use spalloc_topology::Direction;

/// One machine's boards and live-link adjacency, projected for fast
/// allocation queries.
#[derive(Debug, Clone)]
pub struct MachineView {
    pub machine: Machine,
    boards: HashMap<BoardId, Board>,
    coord_to_board: HashMap<(u32, u32, u8), BoardId>,
    /// Live links only; dead links never participate in connectivity or
    /// perimeter computation (spec.md §4.3's "live links").
    adjacency: HashMap<BoardId, Vec<(LinkId, Direction, BoardId)>>,
}

impl MachineView {
    pub fn from_snapshot(snapshot: &MachineSnapshot) -> Self {
        let mut boards = HashMap::new();
        let mut coord_to_board = HashMap::new();
        for board in &snapshot.boards {
            coord_to_board.insert((board.x, board.y, board.z), board.id);
            boards.insert(board.id, board.clone());
        }

        let mut adjacency: HashMap<BoardId, Vec<(LinkId, Direction, BoardId)>> = HashMap::new();
        for link in &snapshot.links {
            if !link.live {
                continue;
            }
            adjacency
                .entry(link.board_1)
                .or_default()
                .push((link.id, link.dir_1, link.board_2));
            adjacency
                .entry(link.board_2)
                .or_default()
                .push((link.id, link.dir_2, link.board_1));
        }

        Self { machine: snapshot.machine.clone(), boards, coord_to_board, adjacency }
    }

    pub fn board(&self, id: BoardId) -> Option<&Board> {
        self.boards.get(&id)
    }

    pub fn board_at(&self, x: u32, y: u32, z: u8) -> Option<&Board> {
        self.coord_to_board.get(&(x, y, z)).and_then(|id| self.boards.get(id))
    }

    /// Every board with `may_be_allocated() == true`.
    pub fn allocatable_boards(&self) -> Vec<BoardId> {
        self.boards
            .values()
            .filter(|b| b.may_be_allocated())
            .map(|b| b.id)
            .collect()
    }

    /// Live links whose endpoints are exactly `{b1, b2}`.
    pub fn links_between(&self, b1: BoardId, b2: BoardId) -> Vec<&(LinkId, Direction, BoardId)> {
        self.adjacency
            .get(&b1)
            .into_iter()
            .flatten()
            .filter(|(_, _, other)| *other == b2)
            .collect()
    }

    /// Breadth-first closure of `start` over live links, restricted to
    /// `within` (spec.md §4.3's connected-size check operates over a
    /// candidate set).
    pub fn connected_component(&self, start: BoardId, within: &HashSet<BoardId>) -> HashSet<BoardId> {
        let mut seen = HashSet::new();
        if !within.contains(&start) {
            return seen;
        }
        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some(board) = queue.pop_front() {
            for (_, _, neighbor) in self.adjacency.get(&board).into_iter().flatten() {
                if within.contains(neighbor) && seen.insert(*neighbor) {
                    queue.push_back(*neighbor);
                }
            }
        }
        seen
    }

    /// All `(board, direction)` pairs inside `allocation` whose live link
    /// crosses out of it (spec.md §4.3's perimeter computation).
    pub fn perimeter(&self, allocation: &HashSet<BoardId>) -> Vec<(BoardId, Direction)> {
        let mut out = Vec::new();
        for &board in allocation {
            for (_, dir, other) in self.adjacency.get(&board).into_iter().flatten() {
                if !allocation.contains(other) {
                    out.push((board, *dir));
                }
            }
        }
        out
    }
}

/// `Map<machine_id, MachineView>` (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct BoardGraph {
    machines: HashMap<MachineId, MachineView>,
}

impl BoardGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cached view for one machine. Called after a committed
    /// allocator transaction invalidates the previous projection.
    pub fn rebuild(&mut self, snapshot: &MachineSnapshot) {
        self.machines.insert(snapshot.machine.id, MachineView::from_snapshot(snapshot));
    }

    pub fn view(&self, machine: MachineId) -> Result<&MachineView> {
        self.machines.get(&machine).ok_or_else(|| AllocError::MachineUnknown.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spalloc_model::Functioning;

    fn board(id: u32, x: u32, y: u32, z: u8) -> Board {
        Board {
            id: BoardId::new(id),
            machine: MachineId::new(0),
            x,
            y,
            z,
            root_x: 0,
            root_y: 0,
            bmp_address: None,
            board_num: Some(id),
            allocated_job: None,
            functioning: Functioning::Working,
            power_off_timestamp: None,
            power_on_timestamp: None,
            blacklist: vec![],
        }
    }

    fn snapshot_of(boards: Vec<Board>, links: Vec<Link>) -> MachineSnapshot {
        MachineSnapshot {
            machine: Machine {
                id: MachineId::new(0),
                name: "m".into(),
                width: 2,
                height: 2,
                depth: 3,
                board_model: 5,
                default_quota: None,
                in_service: true,
            },
            boards,
            links,
        }
    }

    #[test]
    fn allocatable_boards_excludes_allocated_and_dead() {
        let mut b0 = board(0, 0, 0, 0);
        let mut b1 = board(1, 0, 0, 1);
        b0.allocated_job = Some(spalloc_model::JobId::new(7));
        b1.functioning = Functioning::Dead;
        let b2 = board(2, 0, 0, 2);

        let view = MachineView::from_snapshot(&snapshot_of(vec![b0, b1, b2], vec![]));
        let allocatable = view.allocatable_boards();
        assert_eq!(allocatable, vec![BoardId::new(2)]);
    }

    #[test]
    fn connected_component_follows_only_live_links() {
        let boards = vec![board(0, 0, 0, 0), board(1, 0, 0, 1), board(2, 0, 0, 2)];
        let links = vec![
            Link::new(LinkId::new(0), (BoardId::new(0), Direction::SouthEast), (BoardId::new(1), Direction::NorthWest), true),
            Link::new(LinkId::new(1), (BoardId::new(1), Direction::SouthEast), (BoardId::new(2), Direction::NorthWest), false),
        ];
        let view = MachineView::from_snapshot(&snapshot_of(boards, links));
        let within: HashSet<_> = [BoardId::new(0), BoardId::new(1), BoardId::new(2)].into_iter().collect();
        let component = view.connected_component(BoardId::new(0), &within);
        assert_eq!(component.len(), 2);
        assert!(!component.contains(&BoardId::new(2)), "link 1 is dead, must not connect board 2");
    }

    #[test]
    fn perimeter_only_reports_boundary_crossing_links() {
        let boards = vec![board(0, 0, 0, 0), board(1, 0, 0, 1), board(2, 1, 0, 0)];
        let links = vec![
            Link::new(LinkId::new(0), (BoardId::new(0), Direction::SouthEast), (BoardId::new(1), Direction::NorthWest), true),
            Link::new(LinkId::new(1), (BoardId::new(0), Direction::East), (BoardId::new(2), Direction::West), true),
        ];
        let view = MachineView::from_snapshot(&snapshot_of(boards, links));
        let allocation: HashSet<_> = [BoardId::new(0), BoardId::new(1)].into_iter().collect();
        let perimeter = view.perimeter(&allocation);
        assert_eq!(perimeter, vec![(BoardId::new(0), Direction::East)]);
    }
}
