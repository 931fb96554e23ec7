use std::sync::LazyLock;

pub const BOARD_SIZE: usize = 8;

/// Knight steps allowed in the take-away knight games. Every step strictly
/// increases row + col, so the move graph is acyclic.
pub const DIRECTIONS: [(i32, i32); 4] = [(2, -1), (2, 1), (1, 2), (-1, 2)];

/// The cell reached by one step in `direction`, or `None` when the step
/// leaves the board or the direction index is out of range.
pub fn step(row: usize, col: usize, direction: usize) -> Option<(usize, usize)> {
    let (dr, dc) = DIRECTIONS.get(direction).copied()?;
    let new_row = row as i32 + dr;
    let new_col = col as i32 + dc;
    if new_row < 0 || new_row >= BOARD_SIZE as i32 || new_col < 0 || new_col >= BOARD_SIZE as i32 {
        return None;
    }
    Some((new_row as usize, new_col as usize))
}

/// All direction indices with a legal step from the given cell.
pub fn valid_directions(row: usize, col: usize) -> Vec<usize> {
    (0..DIRECTIONS.len())
        .filter(|&d| step(row, col, d).is_some())
        .collect()
}

struct Tables {
    grundy: [[u32; BOARD_SIZE]; BOARD_SIZE],
    distance: [[u32; BOARD_SIZE]; BOARD_SIZE],
}

static TABLES: LazyLock<Tables> = LazyLock::new(build_tables);

/// Builds the per-cell Grundy numbers and shortest distances to a terminal
/// cell. Cells are processed in decreasing order of row + col, which is a
/// valid topological order of the move graph.
fn build_tables() -> Tables {
    let mut grundy = [[0u32; BOARD_SIZE]; BOARD_SIZE];
    let mut distance = [[0u32; BOARD_SIZE]; BOARD_SIZE];

    for diagonal in (0..=2 * (BOARD_SIZE - 1)).rev() {
        for col in 0..BOARD_SIZE {
            let Some(row) = diagonal.checked_sub(col) else {
                continue;
            };
            if row >= BOARD_SIZE {
                continue;
            }

            let mut successors = Vec::new();
            let mut min_distance: Option<u32> = None;
            for direction in 0..DIRECTIONS.len() {
                if let Some((r, c)) = step(row, col, direction) {
                    successors.push(grundy[r][c]);
                    let through = distance[r][c] + 1;
                    min_distance = Some(min_distance.map_or(through, |m| m.min(through)));
                }
            }

            let mut mex = 0;
            while successors.contains(&mex) {
                mex += 1;
            }
            grundy[row][col] = mex;
            distance[row][col] = min_distance.unwrap_or(0);
        }
    }

    Tables { grundy, distance }
}

/// The Grundy number of a single knight on the given cell.
pub fn grundy_at(row: usize, col: usize) -> u32 {
    TABLES.grundy[row][col]
}

/// Number of steps from the given cell to the nearest terminal cell
/// (0 for cells with no legal step).
pub fn distance_at(row: usize, col: usize) -> u32 {
    TABLES.distance[row][col]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_step_increases_diagonal() {
        for (dr, dc) in DIRECTIONS {
            assert!(dr + dc > 0);
        }
    }

    #[test]
    fn terminal_cells_have_zero_grundy_and_distance() {
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                if valid_directions(row, col).is_empty() {
                    assert_eq!(grundy_at(row, col), 0, "cell ({row},{col})");
                    assert_eq!(distance_at(row, col), 0, "cell ({row},{col})");
                }
            }
        }
        // The far corner can never move.
        assert!(valid_directions(BOARD_SIZE - 1, BOARD_SIZE - 1).is_empty());
    }

    #[test]
    fn grundy_is_mex_of_successors() {
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                let successors: Vec<u32> = valid_directions(row, col)
                    .into_iter()
                    .map(|d| {
                        let (r, c) = step(row, col, d).unwrap();
                        grundy_at(r, c)
                    })
                    .collect();
                let g = grundy_at(row, col);
                assert!(!successors.contains(&g), "cell ({row},{col})");
                for smaller in 0..g {
                    assert!(successors.contains(&smaller), "cell ({row},{col})");
                }
            }
        }
    }

    #[test]
    fn distance_is_one_more_than_closest_successor() {
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                let dirs = valid_directions(row, col);
                if dirs.is_empty() {
                    continue;
                }
                let closest = dirs
                    .into_iter()
                    .map(|d| {
                        let (r, c) = step(row, col, d).unwrap();
                        distance_at(r, c)
                    })
                    .min()
                    .unwrap();
                assert_eq!(distance_at(row, col), closest + 1, "cell ({row},{col})");
            }
        }
    }
}
