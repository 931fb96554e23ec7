use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::games::knight::{self, BOARD_SIZE, DIRECTIONS};
use crate::games::Move;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

/// A single knight on an 8x8 board; each move must increase row + col, and
/// whoever has no legal step loses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoneKnightState {
    pub knight: Cell,
    pub turn: bool,
    pub moves: Vec<Move>,
}

impl LoneKnightState {
    /// Random starting cell, resampled until it is at least two steps away
    /// from every terminal cell.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let knight = loop {
            let row = rng.random_range(0..BOARD_SIZE);
            let col = rng.random_range(0..BOARD_SIZE);
            if knight::distance_at(row, col) > 1 {
                break Cell { row, col };
            }
        };
        Self {
            knight,
            turn: true,
            moves: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        knight::valid_directions(self.knight.row, self.knight.col).is_empty()
    }

    pub fn apply_move(&mut self, mv: &Move) -> bool {
        let Move::LoneKnight { direction } = *mv else {
            return false;
        };
        let Some((row, col)) = knight::step(self.knight.row, self.knight.col, direction) else {
            return false;
        };
        self.knight = Cell { row, col };
        self.turn = !self.turn;
        self.moves.push(*mv);
        true
    }

    pub fn undo_move(&mut self) {
        if let Some(Move::LoneKnight { direction }) = self.moves.pop() {
            let (dr, dc) = DIRECTIONS[direction];
            self.knight.row = (self.knight.row as i32 - dr) as usize;
            self.knight.col = (self.knight.col as i32 - dc) as usize;
            self.turn = !self.turn;
        }
    }

    pub fn grundy_value(&self) -> u32 {
        knight::grundy_at(self.knight.row, self.knight.col)
    }

    /// Best move under perfect play. Must not be called on a terminal state.
    pub fn optimal_move(&self) -> Move {
        let directions = knight::valid_directions(self.knight.row, self.knight.col);
        if self.grundy_value() == 0 {
            // Every move loses equally.
            let mut rng = rand::rng();
            let direction = directions[rng.random_range(0..directions.len())];
            return Move::LoneKnight { direction };
        }

        for direction in directions {
            let (row, col) = knight::step(self.knight.row, self.knight.col, direction).unwrap();
            if knight::grundy_at(row, col) == 0 {
                return Move::LoneKnight { direction };
            }
        }

        panic!(
            "knight at ({},{}) with grundy {} has no zeroing move",
            self.knight.row,
            self.knight.col,
            self.grundy_value()
        );
    }
}
