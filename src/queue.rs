use crate::room;
use crate::types::{GameConfig, PublicPlayer, ServerMsg};
use crate::world::{unique_code, Lobby, World};

fn parse_config(game_type: &str, time_control: &str) -> Option<GameConfig> {
    Some(GameConfig {
        game_type: game_type.parse().ok()?,
        time_control: time_control.parse().ok()?,
    })
}

/// Adds the identity to the FIFO bucket for its game config and immediately
/// tries to pair. One active intent at a time: a committed identity is
/// rejected, never silently re-homed.
pub fn handle_enqueue(world: &mut World, stable_key: &str, game_type: &str, time_control: &str) {
    let Some(config) = parse_config(game_type, time_control) else {
        world.registry.send_to(
            stable_key,
            ServerMsg::QueueLobbyError {
                message: "Game is not supported".to_string(),
            },
        );
        return;
    };

    match world.sessions.get_mut(stable_key) {
        None => {
            tracing::warn!("Enqueue from unknown session {}", stable_key);
            return;
        }
        Some(session) if session.is_committed() => {
            world.registry.send_to(
                stable_key,
                ServerMsg::QueueLobbyError {
                    message: "Already in a queue, lobby, or game".to_string(),
                },
            );
            return;
        }
        Some(session) => session.current_queue = Some(config),
    }

    if let Some(bucket) = world.queues.get_mut(&config) {
        bucket.push_back(stable_key.to_string());
    }
    tracing::info!(
        "User {} queued for {} {}",
        stable_key,
        config.game_type,
        config.time_control
    );
    world.registry.send_to(
        stable_key,
        ServerMsg::QueueOk {
            message: format!("Queued for {} {}", config.game_type, config.time_control),
        },
    );

    pairing_pass(world, config);
}

/// Pops pairs of the two oldest waiters from the bucket until fewer than two
/// remain, creating a room per pair.
pub fn pairing_pass(world: &mut World, config: GameConfig) {
    loop {
        let (first, second) = {
            let Some(bucket) = world.queues.get_mut(&config) else {
                return;
            };
            if bucket.len() < 2 {
                return;
            }
            let (Some(first), Some(second)) = (bucket.pop_front(), bucket.pop_front()) else {
                return;
            };
            (first, second)
        };
        for key in [&first, &second] {
            if let Some(session) = world.sessions.get_mut(key.as_str()) {
                session.current_queue = None;
            }
        }
        tracing::info!(
            "Paired {} and {} for {} {}",
            first,
            second,
            config.game_type,
            config.time_control
        );
        room::create_room(world, config, &first, &second);
    }
}

/// Creates a private invite lobby and sends its code to the creator.
pub fn handle_create_lobby(
    world: &mut World,
    stable_key: &str,
    game_type: &str,
    time_control: &str,
) {
    let Some(config) = parse_config(game_type, time_control) else {
        world.registry.send_to(
            stable_key,
            ServerMsg::QueueLobbyError {
                message: "Game is not supported".to_string(),
            },
        );
        return;
    };

    let creator = match world.sessions.get(stable_key) {
        None => {
            tracing::warn!("Lobby request from unknown session {}", stable_key);
            return;
        }
        Some(session) if session.is_committed() => {
            world.registry.send_to(
                stable_key,
                ServerMsg::QueueLobbyError {
                    message: "Already in a queue, lobby, or game".to_string(),
                },
            );
            return;
        }
        Some(session) => PublicPlayer::of(&session.identity),
    };

    let Some(code) = unique_code(|c| world.lobbies.contains_key(c)) else {
        world.registry.send_to(
            stable_key,
            ServerMsg::QueueLobbyError {
                message: "Could not allocate a lobby code".to_string(),
            },
        );
        return;
    };

    let lobby = Lobby {
        code: code.clone(),
        config,
        creator_key: stable_key.to_string(),
        creator,
    };
    let data = lobby.data();
    world.lobbies.insert(code.clone(), lobby);
    if let Some(session) = world.sessions.get_mut(stable_key) {
        session.current_lobby = Some(code.clone());
    }
    tracing::info!("Lobby {} created by {}", code, stable_key);
    world
        .registry
        .send_to(stable_key, ServerMsg::LobbyInfo { lobby: data });
}

/// A second identity joins a lobby by code, promoting it directly into a
/// room (the creator keeps the first seat).
pub fn handle_join_lobby(world: &mut World, stable_key: &str, lobby_code: &str) {
    let Some(lobby) = world.lobbies.get(lobby_code) else {
        world.registry.send_to(
            stable_key,
            ServerMsg::QueueLobbyError {
                message: "Lobby not found".to_string(),
            },
        );
        return;
    };
    let creator_key = lobby.creator_key.clone();
    let config = lobby.config;

    if creator_key == stable_key {
        world.registry.send_to(
            stable_key,
            ServerMsg::QueueLobbyError {
                message: "Cannot join your own lobby".to_string(),
            },
        );
        return;
    }
    match world.sessions.get(stable_key) {
        None => {
            tracing::warn!("Join lobby from unknown session {}", stable_key);
            return;
        }
        Some(session) if session.is_committed() => {
            world.registry.send_to(
                stable_key,
                ServerMsg::QueueLobbyError {
                    message: "Already in a queue, lobby, or game".to_string(),
                },
            );
            return;
        }
        Some(_) => {}
    }
    if !world.registry.is_connected(&creator_key) {
        world.registry.send_to(
            stable_key,
            ServerMsg::QueueLobbyError {
                message: "Lobby creator is not connected".to_string(),
            },
        );
        return;
    }

    world.lobbies.remove(lobby_code);
    if let Some(session) = world.sessions.get_mut(&creator_key) {
        session.current_lobby = None;
    }
    tracing::info!("Lobby {} promoted into a room", lobby_code);
    room::create_room(world, config, &creator_key, stable_key);
}

/// Removes the identity from whichever of queue or lobby it occupies.
/// Signals an error when it occupies neither; never touches a running match.
pub fn handle_cancel(world: &mut World, stable_key: &str) {
    let Some(session) = world.sessions.get_mut(stable_key) else {
        tracing::warn!("Cancel from unknown session {}", stable_key);
        return;
    };

    if let Some(code) = session.current_lobby.take() {
        world.lobbies.remove(&code);
        tracing::info!("User {} left lobby {}", stable_key, code);
        world.registry.send_to(
            stable_key,
            ServerMsg::QueueOk {
                message: format!("Removed from lobby {}", code),
            },
        );
        return;
    }

    if let Some(config) = session.current_queue.take() {
        if let Some(bucket) = world.queues.get_mut(&config) {
            bucket.retain(|key| key != stable_key);
        }
        tracing::info!(
            "User {} left the queue for {} {}",
            stable_key,
            config.game_type,
            config.time_control
        );
        world.registry.send_to(
            stable_key,
            ServerMsg::QueueOk {
                message: format!(
                    "Removed from queue for {} {}",
                    config.game_type, config.time_control
                ),
            },
        );
        return;
    }

    world.registry.send_to(
        stable_key,
        ServerMsg::QueueLobbyError {
            message: "Not in a queue or lobby".to_string(),
        },
    );
}

/// Creator-only, side-effect-free lobby snapshot.
pub fn handle_lobby_info(world: &mut World, stable_key: &str, lobby_code: &str) {
    match world.lobbies.get(lobby_code) {
        Some(lobby) if lobby.creator_key == stable_key => {
            world
                .registry
                .send_to(stable_key, ServerMsg::LobbyInfo { lobby: lobby.data() });
        }
        Some(_) => {
            world.registry.send_to(
                stable_key,
                ServerMsg::LobbyInfoError {
                    message: "You are not in this lobby".to_string(),
                },
            );
        }
        None => {
            world.registry.send_to(
                stable_key,
                ServerMsg::LobbyInfoError {
                    message: "Lobby not found".to_string(),
                },
            );
        }
    }
}
