//! `allocate(request) -> AllocationResult | AllocFail` (spec.md §4.3).
//!
//! Pure function over a [`MachineView`] snapshot: callers are responsible
//! for running this inside the writer-exclusive `PersistentStore`
//! transaction (spec.md §5) so the view can't go stale mid-computation.
//! Every path here is read-only; callers commit the returned
//! [`AllocationResult`] themselves, which is what makes the "partial
//! candidate never mutates state" rule (spec.md §4.3) trivially true.

use std::collections::HashSet;

use spalloc_boardgraph::MachineView;
use spalloc_core::AllocError;
use spalloc_model::{Board, BoardId, JobId, JobRequest, JobState, PendingChange};
use spalloc_topology::Direction;

pub type AllocFail = AllocError;

#[derive(Debug, Clone)]
pub struct AllocationResult {
    pub boards: Vec<BoardId>,
    pub anchor: (u32, u32),
    pub pending_changes: Vec<PendingChange>,
}

/// Evaluates `request` against `view` and, on success, returns the board
/// set and power plan to commit. `quota_ok` is called with the candidate
/// allocation size before anything else succeeds or fails on it, so a
/// quota rejection still mutates nothing (spec.md §4.3).
pub fn allocate(
    view: &MachineView,
    job: JobId,
    request: &JobRequest,
    quota_ok: impl Fn(u32) -> bool,
) -> Result<AllocationResult, AllocFail> {
    let (boards, anchor) = match request {
        JobRequest::ByRectangle { width, height, max_dead, .. } => {
            by_rectangle(view, *width, *height, *max_dead)?
        },
        JobRequest::ByCount { num_boards, max_dead, .. } => by_count(view, *num_boards, *max_dead)?,
        JobRequest::BySpecificBoard { board, .. } => by_specific_board(view, *board)?,
    };

    if !quota_ok(boards.len() as u32) {
        return Err(AllocError::QuotaExceeded);
    }

    let allocation: HashSet<BoardId> = boards.iter().copied().collect();
    let perimeter = view.perimeter(&allocation);
    let pending_changes = power_plan(job, &boards, &perimeter);

    Ok(AllocationResult { boards, anchor, pending_changes })
}

/// spec.md §4.3 algorithm 1: scan anchors in `(y asc, x asc)` order; accept
/// the first with enough allocatable boards in its `W x H x 3` candidate
/// set, then take the coolest `W*H*3 - max_dead` of them.
fn by_rectangle(
    view: &MachineView,
    width: u32,
    height: u32,
    max_dead: u32,
) -> Result<(Vec<BoardId>, (u32, u32)), AllocFail> {
    let machine = &view.machine;
    let needed = (width * height * 3).saturating_sub(max_dead);

    for gy in 0..machine.height {
        for gx in 0..machine.width {
            let mut candidates: Vec<&Board> = Vec::with_capacity((width * height * 3) as usize);
            for cy in 0..height {
                for cx in 0..width {
                    let x = (gx + cx) % machine.width;
                    let y = (gy + cy) % machine.height;
                    for z in 0..3u8 {
                        if let Some(board) = view.board_at(x, y, z) {
                            if board.may_be_allocated() {
                                candidates.push(board);
                            }
                        }
                    }
                }
            }

            if (candidates.len() as u32) < needed {
                continue;
            }

            // Tie-break: earlier power_off_timestamp wins (favors recently
            // cooled boards for thermal mixing). Boards never powered off
            // sort last: nothing is known about their thermal history.
            candidates.sort_by_key(|b| b.power_off_timestamp.unwrap_or(i64::MAX));
            let chosen: Vec<BoardId> = candidates.into_iter().take(needed as usize).map(|b| b.id).collect();

            check_connected(view, &chosen, needed)?;
            return Ok((chosen, (gx, gy)));
        }
    }

    Err(AllocError::NoCapacity)
}

/// spec.md §4.3 algorithm 2: smallest `(W,H)` with `W*H*3 >= N`, then
/// `by_rectangle` with the leftover slack folded into `max_dead`.
fn by_count(view: &MachineView, num_boards: u32, max_dead: u32) -> Result<(Vec<BoardId>, (u32, u32)), AllocFail> {
    let machine = &view.machine;
    let mut best: Option<(u32, u32)> = None;

    for h in 1..=machine.height {
        for w in 1..=machine.width {
            if w * h * 3 < num_boards {
                continue;
            }
            let better = match best {
                None => true,
                Some((bw, bh)) => (w * h, h, w) < (bw * bh, bh, bw),
            };
            if better {
                best = Some((w, h));
            }
        }
    }

    let (width, height) = best.ok_or(AllocError::NoCapacity)?;
    let slack = width * height * 3 - num_boards;
    by_rectangle(view, width, height, max_dead + slack)
}

/// spec.md §4.3 algorithm 3: a single named board.
fn by_specific_board(view: &MachineView, board_id: BoardId) -> Result<(Vec<BoardId>, (u32, u32)), AllocFail> {
    let board = view.board(board_id).ok_or(AllocError::BoardUnallocatable)?;
    if !board.may_be_allocated() {
        return Err(AllocError::BoardUnallocatable);
    }
    Ok((vec![board_id], (board.x, board.y)))
}

/// spec.md §4.3 step 4: reject if the candidate's own live-link component
/// is smaller than `needed`.
fn check_connected(view: &MachineView, chosen: &[BoardId], needed: u32) -> Result<(), AllocFail> {
    let Some(&root) = chosen.first() else {
        return Ok(());
    };
    let within: HashSet<BoardId> = chosen.iter().copied().collect();
    let component = view.connected_component(root, &within);
    if (component.len() as u32) < needed {
        return Err(AllocError::NotConnected);
    }
    Ok(())
}

/// spec.md §4.3 step 6: one `PendingChange` per allocated board, FPGA bit
/// set iff that direction's link crosses the perimeter.
fn power_plan(job: JobId, boards: &[BoardId], perimeter: &[(BoardId, Direction)]) -> Vec<PendingChange> {
    boards
        .iter()
        .map(|&board| {
            let mut link_enable = [false; 6];
            for (i, dir) in Direction::ALL.iter().enumerate() {
                link_enable[i] = perimeter.iter().any(|(b, d)| *b == board && d == dir);
            }
            PendingChange {
                job,
                board,
                power_on: true,
                link_enable,
                to_state: JobState::Power,
            }
        })
        .collect()
}
