use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::games::Move;

/// Bounded take-away: players alternate removing 1 to `max_per_turn` marbles
/// from a single heap; whoever cannot move (heap empty) loses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarblesState {
    pub marbles: u32,
    pub max_per_turn: u32,
    pub turn: bool,
    pub moves: Vec<Move>,
}

impl MarblesState {
    pub const DEFAULT_MAX_PER_TURN: u32 = 3;

    /// Random starting position: 10 to 20 marbles, take cap 3.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        Self {
            marbles: rng.random_range(10..=20),
            max_per_turn: Self::DEFAULT_MAX_PER_TURN,
            turn: true,
            moves: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.marbles == 0
    }

    pub fn apply_move(&mut self, mv: &Move) -> bool {
        let Move::Marbles { amount } = *mv else {
            return false;
        };
        if amount == 0 || amount > self.max_per_turn || self.marbles < amount {
            return false;
        }
        self.marbles -= amount;
        self.turn = !self.turn;
        self.moves.push(*mv);
        true
    }

    pub fn undo_move(&mut self) {
        if let Some(Move::Marbles { amount }) = self.moves.pop() {
            self.marbles += amount;
            self.turn = !self.turn;
        }
    }

    pub fn grundy_value(&self) -> u32 {
        self.marbles % (self.max_per_turn + 1)
    }

    /// Best move under perfect play. Must not be called on a terminal state.
    pub fn optimal_move(&self) -> Move {
        let grundy = self.grundy_value();
        if grundy == 0 {
            // Every move loses equally.
            return Move::Marbles { amount: 1 };
        }
        Move::Marbles { amount: grundy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(marbles: u32) -> MarblesState {
        MarblesState {
            marbles,
            max_per_turn: MarblesState::DEFAULT_MAX_PER_TURN,
            turn: true,
            moves: Vec::new(),
        }
    }

    #[test]
    fn grundy_is_remainder() {
        assert_eq!(state(10).grundy_value(), 2);
        assert_eq!(state(8).grundy_value(), 0);
        assert_eq!(state(0).grundy_value(), 0);
    }

    #[test]
    fn optimal_move_on_worked_example() {
        // 10 marbles, cap 3: remove 2 to leave a multiple of 4.
        let mut s = state(10);
        assert_eq!(s.optimal_move(), Move::Marbles { amount: 2 });
        assert!(s.apply_move(&Move::Marbles { amount: 2 }));
        assert_eq!(s.marbles, 8);
        assert_eq!(s.grundy_value(), 0);
    }

    #[test]
    fn losing_state_has_no_winning_move() {
        for marbles in 1..=20u32 {
            let s = state(marbles);
            let losing = s.grundy_value() == 0;
            let mut any_zero_successor = false;
            for amount in 1..=s.max_per_turn.min(s.marbles) {
                let mut next = s.clone();
                assert!(next.apply_move(&Move::Marbles { amount }));
                if next.grundy_value() == 0 {
                    any_zero_successor = true;
                }
            }
            assert_eq!(losing, !any_zero_successor, "{marbles} marbles");
        }
    }

    #[test]
    fn apply_then_undo_restores_state() {
        let mut s = state(13);
        let before = s.clone();
        assert!(s.apply_move(&Move::Marbles { amount: 3 }));
        s.undo_move();
        assert_eq!(s, before);
    }

    #[test]
    fn rejects_illegal_moves() {
        let mut s = state(2);
        let before = s.clone();
        assert!(!s.apply_move(&Move::Marbles { amount: 0 }));
        assert!(!s.apply_move(&Move::Marbles { amount: 4 }));
        assert!(!s.apply_move(&Move::Marbles { amount: 3 }));
        assert!(!s.apply_move(&Move::Nim { pile: 0, amount: 1 }));
        assert_eq!(s, before);
    }

    #[test]
    fn generated_positions_have_a_move() {
        for _ in 0..50 {
            let s = MarblesState::generate();
            assert!((10..=20).contains(&s.marbles));
            assert!(!s.is_terminal());
        }
    }
}
