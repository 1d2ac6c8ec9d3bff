//! Static board-model chip-coordinate seed tables (spec.md §6).
//!
//! These exist only so the allocator/validation layer can check a board's
//! `root_x`/`root_y` fall within the chip inventory its `board_model`
//! claims to have. Full board geometry (which chip belongs to which link)
//! is out of scope (see `spalloc_topology::triad_of`).

/// Model 3: the 2x2 four-chip board.
pub const MODEL_3_CHIPS: [(u8, u8); 4] = [(0, 0), (0, 1), (1, 0), (1, 1)];

/// Model 5: the 48-chip hexagon.
pub const MODEL_5_CHIPS: [(u8, u8); 48] = [
    (0, 0), (0, 1), (0, 2), (0, 3),
    (1, 0), (1, 1), (1, 2), (1, 3), (1, 4),
    (2, 0), (2, 1), (2, 2), (2, 3), (2, 4), (2, 5),
    (3, 0), (3, 1), (3, 2), (3, 3), (3, 4), (3, 5), (3, 6),
    (4, 0), (4, 1), (4, 2), (4, 3), (4, 4), (4, 5), (4, 6), (4, 7),
    (5, 1), (5, 2), (5, 3), (5, 4), (5, 5), (5, 6), (5, 7),
    (6, 2), (6, 3), (6, 4), (6, 5), (6, 6), (6, 7),
    (7, 3), (7, 4), (7, 5), (7, 6), (7, 7),
];

/// Model 2 mirrors model 3's inventory (spec.md §6).
pub fn chips_for_model(board_model: u8) -> Option<&'static [(u8, u8)]> {
    match board_model {
        2 | 3 => Some(&MODEL_3_CHIPS),
        4 | 5 => Some(&MODEL_5_CHIPS),
        _ => None,
    }
}

/// Whether `(root_x, root_y)` falls within `board_model`'s chip inventory.
/// Unknown models are treated permissively (`true`): this table is a sanity
/// check, not the source of truth for board existence.
pub fn root_in_range(board_model: u8, root_x: u32, root_y: u32) -> bool {
    match chips_for_model(board_model) {
        Some(chips) => {
            let (Ok(x), Ok(y)) = (u8::try_from(root_x), u8::try_from(root_y)) else {
                return false;
            };
            chips.contains(&(x, y))
        },
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_3_is_a_2x2() {
        assert_eq!(MODEL_3_CHIPS.len(), 4);
        assert!(root_in_range(3, 1, 1));
        assert!(!root_in_range(3, 2, 0));
    }

    #[test]
    fn model_5_has_forty_eight_chips() {
        assert_eq!(MODEL_5_CHIPS.len(), 48);
        assert!(root_in_range(5, 7, 7));
        assert!(!root_in_range(5, 0, 7));
    }

    #[test]
    fn model_2_mirrors_model_3() {
        assert_eq!(chips_for_model(2), chips_for_model(3));
    }

    #[test]
    fn unknown_model_is_permissive() {
        assert!(root_in_range(9, 100, 100));
    }
}
