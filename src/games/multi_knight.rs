use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::games::knight::{self, BOARD_SIZE};
use crate::games::Move;

/// Several knights on one 8x8 board, moving like the lone-knight game.
/// Knights may stack on a cell; whoever has no legal step with any knight
/// loses. Each occupied cell is an independent sub-game, so the position's
/// Grundy value is the XOR over cells holding an odd number of knights
/// (even stacks cancel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiKnightState {
    pub grid: [[u8; BOARD_SIZE]; BOARD_SIZE],
    pub turn: bool,
    pub moves: Vec<Move>,
}

impl MultiKnightState {
    /// Random starting position: 3 to 7 knights, each at least two steps away
    /// from every terminal cell.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut grid = [[0u8; BOARD_SIZE]; BOARD_SIZE];
        let knights = rng.random_range(3..=7);
        for _ in 0..knights {
            loop {
                let row = rng.random_range(0..BOARD_SIZE);
                let col = rng.random_range(0..BOARD_SIZE);
                if knight::distance_at(row, col) > 1 {
                    grid[row][col] += 1;
                    break;
                }
            }
        }
        Self {
            grid,
            turn: true,
            moves: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                if self.grid[row][col] > 0 && !knight::valid_directions(row, col).is_empty() {
                    return false;
                }
            }
        }
        true
    }

    pub fn apply_move(&mut self, mv: &Move) -> bool {
        let Move::MultiKnight { row, col, direction } = *mv else {
            return false;
        };
        if row >= BOARD_SIZE || col >= BOARD_SIZE || self.grid[row][col] == 0 {
            return false;
        }
        let Some((new_row, new_col)) = knight::step(row, col, direction) else {
            return false;
        };
        self.grid[row][col] -= 1;
        self.grid[new_row][new_col] += 1;
        self.turn = !self.turn;
        self.moves.push(*mv);
        true
    }

    pub fn undo_move(&mut self) {
        if let Some(Move::MultiKnight { row, col, direction }) = self.moves.pop() {
            let (new_row, new_col) = knight::step(row, col, direction)
                .expect("recorded move was legal when applied");
            self.grid[new_row][new_col] -= 1;
            self.grid[row][col] += 1;
            self.turn = !self.turn;
        }
    }

    pub fn grundy_value(&self) -> u32 {
        let mut grundy = 0;
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                if self.grid[row][col] % 2 == 1 {
                    grundy ^= knight::grundy_at(row, col);
                }
            }
        }
        grundy
    }

    fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::new();
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                if self.grid[row][col] == 0 {
                    continue;
                }
                for direction in knight::valid_directions(row, col) {
                    moves.push(Move::MultiKnight { row, col, direction });
                }
            }
        }
        moves
    }

    /// Best move under perfect play. Must not be called on a terminal state.
    pub fn optimal_move(&self) -> Move {
        let grundy = self.grundy_value();
        let moves = self.legal_moves();

        if grundy == 0 {
            // Every move loses equally.
            let mut rng = rand::rng();
            return moves[rng.random_range(0..moves.len())];
        }

        for mv in moves {
            let Move::MultiKnight { row, col, direction } = mv else {
                unreachable!();
            };
            let (new_row, new_col) = knight::step(row, col, direction).unwrap();
            let delta = knight::grundy_at(row, col) ^ knight::grundy_at(new_row, new_col);
            if grundy ^ delta == 0 {
                return mv;
            }
        }

        panic!("multi-knight position with grundy {grundy} has no zeroing move");
    }
}
