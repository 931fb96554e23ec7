use tokio::sync::mpsc;

use crate::types::{GameType, TimeControl};

/// One per-player record emitted when a room ends; exactly two per room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub user_id: i64,
    pub game_type: GameType,
    pub time_control: TimeControl,
    pub won: bool,
}

/// Spawns the match-result consumer and returns the sender the world fires
/// records into. The world never blocks on or retries delivery; replacing
/// this consumer is the persistence integration point.
pub fn spawn_sink() -> mpsc::UnboundedSender<MatchResult> {
    let (tx, mut rx) = mpsc::unbounded_channel::<MatchResult>();
    tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            tracing::info!(
                "Match result: user {} game {} {} won: {}",
                result.user_id,
                result.game_type,
                result.time_control,
                result.won
            );
        }
    });
    tx
}
