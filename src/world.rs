use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;

use crate::games::Move;
use crate::queue;
use crate::registry::Registry;
use crate::room::{self, Room};
use crate::stats::MatchResult;
use crate::types::{
    GameConfig, GameType, Identity, LobbyData, PublicPlayer, ServerMsg, TimeControl,
};

/// Commands sent into the single control thread by the transport gateway
/// and by room deadline timers.
#[derive(Debug, Clone)]
pub enum Command {
    Connected {
        identity: Identity,
    },
    Enqueue {
        stable_key: String,
        game_type: String,
        time_control: String,
    },
    CreateLobby {
        stable_key: String,
        game_type: String,
        time_control: String,
    },
    CancelQueueLobby {
        stable_key: String,
    },
    JoinLobby {
        stable_key: String,
        lobby_code: String,
    },
    RequestLobbyInfo {
        stable_key: String,
        lobby_code: String,
    },
    RequestRoomInfo {
        stable_key: String,
        room_code: String,
    },
    SubmitMove {
        stable_key: String,
        room_code: String,
        mv: Move,
    },
    RoomDeadline {
        room_code: String,
    },
}

/// An identity's long-lived session. Survives reconnects; holds at most one
/// of the three intent pointers at a time.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub current_queue: Option<GameConfig>,
    pub current_lobby: Option<String>,
    pub current_room: Option<String>,
}

impl Session {
    fn new(identity: Identity) -> Self {
        Self {
            identity,
            current_queue: None,
            current_lobby: None,
            current_room: None,
        }
    }

    /// True when the identity is queued, lobbying, or in a match.
    pub fn is_committed(&self) -> bool {
        self.current_queue.is_some() || self.current_lobby.is_some() || self.current_room.is_some()
    }
}

/// A private invite lobby waiting for a second player.
#[derive(Debug, Clone)]
pub struct Lobby {
    pub code: String,
    pub config: GameConfig,
    pub creator_key: String,
    pub creator: PublicPlayer,
}

impl Lobby {
    pub fn data(&self) -> LobbyData {
        LobbyData {
            lobby_code: self.code.clone(),
            game_config: self.config,
            player: self.creator.clone(),
        }
    }
}

/// All mutable match state, owned by the world task. Every inbound command
/// runs to completion against this aggregate before the next is dequeued,
/// so no per-room locking exists anywhere.
pub struct World {
    pub registry: Arc<Registry>,
    pub sessions: HashMap<String, Session>,
    pub queues: HashMap<GameConfig, VecDeque<String>>,
    pub lobbies: HashMap<String, Lobby>,
    pub rooms: HashMap<String, Room>,
    /// Handle deadline timers use to re-enter the command loop.
    pub cmd_tx: mpsc::Sender<Command>,
    pub results_tx: mpsc::UnboundedSender<MatchResult>,
}

impl World {
    pub fn new(
        registry: Arc<Registry>,
        cmd_tx: mpsc::Sender<Command>,
        results_tx: mpsc::UnboundedSender<MatchResult>,
    ) -> Self {
        let mut queues = HashMap::new();
        for game_type in GameType::ALL {
            for time_control in TimeControl::ALL {
                queues.insert(
                    GameConfig {
                        game_type,
                        time_control,
                    },
                    VecDeque::new(),
                );
            }
        }
        Self {
            registry,
            sessions: HashMap::new(),
            queues,
            lobbies: HashMap::new(),
            rooms: HashMap::new(),
            cmd_tx,
            results_tx,
        }
    }
}

/// Allocates a 6-letter code not already taken. Collisions are retried a
/// bounded number of times; exhausting the budget is an internal defect,
/// never expected with a 26^6 code space.
pub fn unique_code(taken: impl Fn(&str) -> bool) -> Option<String> {
    const ATTEMPTS: usize = 64;
    let mut rng = rand::rng();
    for _ in 0..ATTEMPTS {
        let code: String = (0..6)
            .map(|_| char::from(b'A' + rng.random_range(0..26)))
            .collect();
        if !taken(&code) {
            return Some(code);
        }
    }
    tracing::error!("Code allocation failed after {} attempts", ATTEMPTS);
    None
}

/// Runs the single control thread.
pub async fn world_task(mut world: World, mut cmd_rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Connected { identity } => handle_connected(&mut world, identity),
            Command::Enqueue {
                stable_key,
                game_type,
                time_control,
            } => queue::handle_enqueue(&mut world, &stable_key, &game_type, &time_control),
            Command::CreateLobby {
                stable_key,
                game_type,
                time_control,
            } => queue::handle_create_lobby(&mut world, &stable_key, &game_type, &time_control),
            Command::CancelQueueLobby { stable_key } => {
                queue::handle_cancel(&mut world, &stable_key)
            }
            Command::JoinLobby {
                stable_key,
                lobby_code,
            } => queue::handle_join_lobby(&mut world, &stable_key, &lobby_code),
            Command::RequestLobbyInfo {
                stable_key,
                lobby_code,
            } => queue::handle_lobby_info(&mut world, &stable_key, &lobby_code),
            Command::RequestRoomInfo {
                stable_key,
                room_code,
            } => room::handle_room_info(&mut world, &stable_key, &room_code),
            Command::SubmitMove {
                stable_key,
                room_code,
                mv,
            } => room::handle_move(&mut world, &stable_key, &room_code, &mv),
            Command::RoomDeadline { room_code } => room::handle_deadline(&mut world, &room_code),
        }
    }
    tracing::info!("World task ended");
}

/// A transport came up for this identity. Ensures the session exists and
/// pushes the current room or lobby snapshot when one is pending, so a
/// reconnecting player lands straight back in its match.
pub fn handle_connected(world: &mut World, identity: Identity) {
    let key = identity.stable_key.clone();
    let (room_ptr, lobby_ptr) = {
        let session = world
            .sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(identity.clone()));
        session.identity = identity;
        (session.current_room.clone(), session.current_lobby.clone())
    };

    if let Some(room_code) = room_ptr {
        match world.rooms.get_mut(&room_code) {
            Some(room) => {
                room.synchronize();
                if let Some(index) = room.player_index(&key) {
                    world.registry.send_to(
                        &key,
                        ServerMsg::RoomInfo {
                            room: room.project(index),
                        },
                    );
                }
            }
            None => {
                tracing::warn!("Session {} points at missing room {}", key, room_code);
                if let Some(session) = world.sessions.get_mut(&key) {
                    session.current_room = None;
                }
            }
        }
    } else if let Some(lobby_code) = lobby_ptr {
        match world.lobbies.get(&lobby_code) {
            Some(lobby) if lobby.creator_key == key => {
                world
                    .registry
                    .send_to(&key, ServerMsg::LobbyInfo { lobby: lobby.data() });
            }
            _ => {
                tracing::warn!("Session {} points at missing lobby {}", key, lobby_code);
                if let Some(session) = world.sessions.get_mut(&key) {
                    session.current_lobby = None;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::types::stable_key;
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    pub struct TestHarness {
        pub world: World,
        pub cmd_rx: mpsc::Receiver<Command>,
        pub results_rx: UnboundedReceiver<MatchResult>,
    }

    pub fn harness() -> TestHarness {
        let registry = Registry::new();
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        TestHarness {
            world: World::new(registry, cmd_tx, results_tx),
            cmd_rx,
            results_rx,
        }
    }

    pub struct TestConn {
        pub key: String,
        pub conn_id: Uuid,
        pub rx: UnboundedReceiver<ServerMsg>,
    }

    /// Binds a transport for `handle` and runs the Connected handler.
    pub fn connect(world: &mut World, handle: &str, numeric_id: i64) -> TestConn {
        let key = stable_key(handle);
        let identity = Identity {
            numeric_id,
            display_name: handle.to_string(),
            stable_key: key.clone(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        assert!(world.registry.bind(identity.clone(), conn_id, tx));
        handle_connected(world, identity);
        TestConn { key, conn_id, rx }
    }

    pub fn drain(rx: &mut UnboundedReceiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }
}
