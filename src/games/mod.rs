pub mod knight;
pub mod lone_knight;
pub mod marbles;
pub mod multi_knight;
pub mod nim;

use serde::{Deserialize, Serialize};

use crate::types::GameType;
pub use lone_knight::LoneKnightState;
pub use marbles::MarblesState;
pub use multi_knight::MultiKnightState;
pub use nim::NimState;

/// A move in any game variant. Immutable once constructed; each engine
/// rejects moves of the wrong variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Move {
    Nim { pile: usize, amount: u32 },
    Marbles { amount: u32 },
    LoneKnight { direction: usize },
    MultiKnight { row: usize, col: usize, direction: usize },
}

/// The canonical state of a match, one variant per game type.
///
/// All variants carry `turn` (true = first-stored player to move in the
/// canonical orientation) and an append-only `moves` history used only for
/// reversal. `apply_move` is the single rule-enforcement choke point: it
/// validates, then mutates and flips `turn`, or leaves the state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GameState {
    Nim(NimState),
    Marbles(MarblesState),
    LoneKnight(LoneKnightState),
    MultiKnight(MultiKnightState),
}

impl GameState {
    /// Builds a randomized starting position for the given variant,
    /// guaranteed to have at least one legal move for the side to move.
    pub fn generate(game_type: GameType) -> Self {
        match game_type {
            GameType::Nim => Self::Nim(NimState::generate()),
            GameType::Marbles => Self::Marbles(MarblesState::generate()),
            GameType::LoneKnight => Self::LoneKnight(LoneKnightState::generate()),
            GameType::MultiKnight => Self::MultiKnight(MultiKnightState::generate()),
        }
    }

    pub fn game_type(&self) -> GameType {
        match self {
            Self::Nim(_) => GameType::Nim,
            Self::Marbles(_) => GameType::Marbles,
            Self::LoneKnight(_) => GameType::LoneKnight,
            Self::MultiKnight(_) => GameType::MultiKnight,
        }
    }

    pub fn turn(&self) -> bool {
        match self {
            Self::Nim(s) => s.turn,
            Self::Marbles(s) => s.turn,
            Self::LoneKnight(s) => s.turn,
            Self::MultiKnight(s) => s.turn,
        }
    }

    pub fn set_turn(&mut self, turn: bool) {
        match self {
            Self::Nim(s) => s.turn = turn,
            Self::Marbles(s) => s.turn = turn,
            Self::LoneKnight(s) => s.turn = turn,
            Self::MultiKnight(s) => s.turn = turn,
        }
    }

    /// True iff the side to move has no legal move.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Nim(s) => s.is_terminal(),
            Self::Marbles(s) => s.is_terminal(),
            Self::LoneKnight(s) => s.is_terminal(),
            Self::MultiKnight(s) => s.is_terminal(),
        }
    }

    pub fn apply_move(&mut self, mv: &Move) -> bool {
        match self {
            Self::Nim(s) => s.apply_move(mv),
            Self::Marbles(s) => s.apply_move(mv),
            Self::LoneKnight(s) => s.apply_move(mv),
            Self::MultiKnight(s) => s.apply_move(mv),
        }
    }

    /// Exactly inverts the last applied move; a no-op on an empty history.
    pub fn undo_move(&mut self) {
        match self {
            Self::Nim(s) => s.undo_move(),
            Self::Marbles(s) => s.undo_move(),
            Self::LoneKnight(s) => s.undo_move(),
            Self::MultiKnight(s) => s.undo_move(),
        }
    }

    /// The Sprague-Grundy number of the position: 0 means the side to move
    /// loses under perfect play.
    pub fn grundy_value(&self) -> u32 {
        match self {
            Self::Nim(s) => s.grundy_value(),
            Self::Marbles(s) => s.grundy_value(),
            Self::LoneKnight(s) => s.grundy_value(),
            Self::MultiKnight(s) => s.grundy_value(),
        }
    }

    /// An exact optimal move. Must not be called on a terminal state; panics
    /// if the Grundy math guarantees a zeroing move and none is found.
    pub fn optimal_move(&self) -> Move {
        match self {
            Self::Nim(s) => s.optimal_move(),
            Self::Marbles(s) => s.optimal_move(),
            Self::LoneKnight(s) => s.optimal_move(),
            Self::MultiKnight(s) => s.optimal_move(),
        }
    }
}
