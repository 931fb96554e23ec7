mod config;
mod games;
mod queue;
mod registry;
mod room;
mod stats;
mod types;
mod world;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::types::*;
use crate::world::{world_task, Command, World};

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    cmd_tx: mpsc::Sender<Command>,
    config: ServerConfig,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    // The upstream auth proxy verifies credentials and attaches the identity
    // parameters; anything it did not attach fails closed.
    if let Some(expected) = &state.config.gateway_key {
        if params.get("key") != Some(expected) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    let Some(numeric_id) = params.get("user_id").and_then(|v| v.parse::<i64>().ok()) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let Some(display_name) = params.get("username").cloned().filter(|u| !u.is_empty()) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let identity = Identity {
        numeric_id,
        stable_key: stable_key(&display_name),
        display_name,
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = uuid::Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMsg>();

    // At most one live transport per stable key.
    if !state.registry.bind(identity.clone(), conn_id, tx) {
        tracing::warn!("Connection already exists for {}", identity.stable_key);
        let msg = ServerMsg::ConnectionError {
            message: "Connection already exists".to_string(),
        };
        if let Ok(json) = serde_json::to_string(&msg) {
            let _ = sender.send(Message::Text(json.into())).await;
        }
        return;
    }
    tracing::info!("WebSocket connected: {} as {}", conn_id, identity.stable_key);

    // Pump world-originated messages out to this socket.
    let outbound = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    });

    let _ = state
        .cmd_tx
        .send(Command::Connected {
            identity: identity.clone(),
        })
        .await;

    let key = identity.stable_key.clone();
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message from {}: {}", key, e);
                continue;
            }
        };

        let command = match client_msg {
            ClientMsg::Enqueue {
                game_type,
                time_control,
            } => Command::Enqueue {
                stable_key: key.clone(),
                game_type,
                time_control,
            },
            ClientMsg::CreateLobby {
                game_type,
                time_control,
            } => Command::CreateLobby {
                stable_key: key.clone(),
                game_type,
                time_control,
            },
            ClientMsg::CancelQueueLobby => Command::CancelQueueLobby {
                stable_key: key.clone(),
            },
            ClientMsg::JoinLobby { lobby_code } => Command::JoinLobby {
                stable_key: key.clone(),
                lobby_code,
            },
            ClientMsg::RequestLobbyInfo { lobby_code } => Command::RequestLobbyInfo {
                stable_key: key.clone(),
                lobby_code,
            },
            ClientMsg::RequestRoomInfo { room_code } => Command::RequestRoomInfo {
                stable_key: key.clone(),
                room_code,
            },
            ClientMsg::SubmitMove { room_code, mv } => Command::SubmitMove {
                stable_key: key.clone(),
                room_code,
                mv,
            },
        };

        if state.cmd_tx.send(command).await.is_err() {
            break;
        }
    }

    // Socket closed. The session keeps its queue/lobby/room pointers; only
    // the transport binding is released.
    tracing::info!("WebSocket disconnected: {}", conn_id);
    state.registry.release(&key, conn_id);
    outbound.abort();
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let registry = Registry::new();
    let results_tx = stats::spawn_sink();

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let world = World::new(registry.clone(), cmd_tx.clone(), results_tx);
    tokio::spawn(world_task(world, cmd_rx));

    let state = AppState {
        registry,
        cmd_tx,
        config: config.clone(),
    };

    let app = Router::new().route("/ws", get(ws_handler)).with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("Failed to bind");

    tracing::info!("nimhub server running on port {}", config.port);

    axum::serve(listener, app).await.unwrap();
}
