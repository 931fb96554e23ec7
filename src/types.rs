use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::games::{GameState, Move};

/// A game variant playable in a live match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Nim,
    Marbles,
    LoneKnight,
    MultiKnight,
}

impl GameType {
    pub const ALL: [GameType; 4] = [
        GameType::Nim,
        GameType::Marbles,
        GameType::LoneKnight,
        GameType::MultiKnight,
    ];
}

impl FromStr for GameType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nim" => Ok(Self::Nim),
            "marbles" => Ok(Self::Marbles),
            "loneknight" => Ok(Self::LoneKnight),
            "multiknight" => Ok(Self::MultiKnight),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nim => write!(f, "nim"),
            Self::Marbles => write!(f, "marbles"),
            Self::LoneKnight => write!(f, "loneknight"),
            Self::MultiKnight => write!(f, "multiknight"),
        }
    }
}

/// A fixed per-player time budget, consumed only on that player's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeControl {
    #[serde(rename = "15s")]
    Sec15,
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
}

impl TimeControl {
    pub const ALL: [TimeControl; 3] = [TimeControl::Sec15, TimeControl::Min1, TimeControl::Min5];

    /// The full budget in milliseconds.
    pub fn budget_ms(&self) -> i64 {
        match self {
            Self::Sec15 => 15_000,
            Self::Min1 => 60_000,
            Self::Min5 => 300_000,
        }
    }
}

impl FromStr for TimeControl {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15s" => Ok(Self::Sec15),
            "1m" => Ok(Self::Min1),
            "5m" => Ok(Self::Min5),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TimeControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sec15 => write!(f, "15s"),
            Self::Min1 => write!(f, "1m"),
            Self::Min5 => write!(f, "5m"),
        }
    }
}

/// The pair a matchmaking bucket is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameConfig {
    pub game_type: GameType,
    pub time_control: TimeControl,
}

/// A verified identity handed to the core by the auth boundary.
///
/// `stable_key` is the registry key and must never reach a client.
#[derive(Debug, Clone)]
pub struct Identity {
    pub numeric_id: i64,
    pub display_name: String,
    pub stable_key: String,
}

/// Derives the registry key from a unique handle.
pub fn stable_key(handle: &str) -> String {
    format!("ws:{}", handle.to_lowercase())
}

/// The client-visible part of an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub numeric_id: i64,
    pub display_name: String,
}

impl PublicPlayer {
    pub fn of(identity: &Identity) -> Self {
        Self {
            numeric_id: identity.numeric_id,
            display_name: identity.display_name.clone(),
        }
    }
}

/// Lobby state as sent to its creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyData {
    pub lobby_code: String,
    pub game_config: GameConfig,
    pub player: PublicPlayer,
}

/// A room re-oriented for one recipient: that player is always index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedRoom {
    pub code: String,
    pub game_config: GameConfig,
    pub players: [PublicPlayer; 2],
    pub game_state: GameState,
    pub first_player: usize,
    pub winner: Option<usize>,
    pub player_times_ms: [i64; 2],
    /// Wall-clock stamp of the last clock sync, for client-side countdowns.
    pub synced_at_ms: u64,
}

/// Messages sent from clients to the server via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    Enqueue {
        game_type: String,
        time_control: String,
    },
    CreateLobby {
        game_type: String,
        time_control: String,
    },
    CancelQueueLobby,
    JoinLobby {
        lobby_code: String,
    },
    RequestLobbyInfo {
        lobby_code: String,
    },
    RequestRoomInfo {
        room_code: String,
    },
    SubmitMove {
        room_code: String,
        #[serde(rename = "move")]
        mv: Move,
    },
}

/// Messages sent from the server to clients via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    QueueOk { message: String },
    QueueLobbyError { message: String },
    LobbyInfo { lobby: LobbyData },
    LobbyInfoError { message: String },
    RoomInfo { room: ProjectedRoom },
    RoomInfoError { message: String },
    MoveRejected { message: String },
    ConnectionError { message: String },
}
