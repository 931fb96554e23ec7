use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::games::Move;

/// Take-away-stones: players alternate removing stones from one pile;
/// whoever cannot move (all piles empty) loses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NimState {
    pub piles: Vec<u32>,
    pub turn: bool,
    pub moves: Vec<Move>,
}

impl NimState {
    /// Random starting position: 3 to 5 piles of 1 to 6 stones each.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let num_piles = rng.random_range(3..=5);
        let piles = (0..num_piles).map(|_| rng.random_range(1..=6)).collect();
        Self {
            piles,
            turn: true,
            moves: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.piles.iter().all(|&pile| pile == 0)
    }

    /// Applies a move if legal: the pile must exist and hold at least
    /// `amount` stones, and at least one stone must be taken.
    pub fn apply_move(&mut self, mv: &Move) -> bool {
        let Move::Nim { pile, amount } = *mv else {
            return false;
        };
        if pile >= self.piles.len() || amount == 0 || self.piles[pile] < amount {
            return false;
        }
        self.piles[pile] -= amount;
        self.turn = !self.turn;
        self.moves.push(*mv);
        true
    }

    pub fn undo_move(&mut self) {
        if let Some(Move::Nim { pile, amount }) = self.moves.pop() {
            self.piles[pile] += amount;
            self.turn = !self.turn;
        }
    }

    pub fn grundy_value(&self) -> u32 {
        self.piles.iter().fold(0, |acc, &pile| acc ^ pile)
    }

    /// Best move under perfect play. Must not be called on a terminal state.
    pub fn optimal_move(&self) -> Move {
        let grundy = self.grundy_value();
        let mut rng = rand::rng();

        if grundy == 0 {
            // Every move loses equally, take a random amount from a random pile.
            let non_empty: Vec<usize> = (0..self.piles.len())
                .filter(|&i| self.piles[i] > 0)
                .collect();
            let pile = non_empty[rng.random_range(0..non_empty.len())];
            return Move::Nim {
                pile,
                amount: rng.random_range(1..=self.piles[pile]),
            };
        }

        for (pile, &size) in self.piles.iter().enumerate() {
            if size == 0 {
                continue;
            }
            let target = size ^ grundy;
            if target < size {
                return Move::Nim {
                    pile,
                    amount: size - target,
                };
            }
        }

        panic!("nim position {:?} with grundy {grundy} has no zeroing move", self.piles);
    }
}
