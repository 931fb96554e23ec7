use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::games::{GameState, Move};
use crate::registry::Registry;
use crate::stats::MatchResult;
use crate::types::{GameConfig, Identity, ProjectedRoom, PublicPlayer, ServerMsg};
use crate::world::{unique_code, Command, World};

/// Slack added to deadline timers so a move arriving right at zero is
/// resolved by the clock sync, not by scheduling jitter.
const DEADLINE_GRACE_MS: u64 = 50;

/// A live two-player match. Created `ACTIVE`; the only transition is into
/// the terminal state, at which point the room leaves the live map within
/// the same command that decided it.
pub struct Room {
    pub code: String,
    pub config: GameConfig,
    /// Canonical storage order; clients only ever see the mirrored view.
    pub players: [Identity; 2],
    pub state: GameState,
    pub first_player: usize,
    pub player_turn: usize,
    pub winner: Option<usize>,
    pub remaining_ms: [i64; 2],
    pub last_synced: Instant,
    pub deadline: Option<JoinHandle<()>>,
}

impl Room {
    pub fn player_index(&self, stable_key: &str) -> Option<usize> {
        self.players
            .iter()
            .position(|p| p.stable_key == stable_key)
    }

    /// Lazily charges elapsed wall time to the player on turn. The
    /// authoritative clocks move only here; both the move path and the
    /// deadline path run this before any terminal decision, so whichever
    /// fires first observes the same clock.
    pub fn synchronize(&mut self) {
        if self.winner.is_some() {
            return;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_synced).as_millis() as i64;
        self.remaining_ms[self.player_turn] =
            (self.remaining_ms[self.player_turn] - elapsed).max(0);
        self.last_synced = now;
    }

    /// True when play cannot continue: no legal move, or an exhausted clock.
    fn should_end(&self) -> bool {
        self.state.is_terminal() || self.remaining_ms[0] <= 0 || self.remaining_ms[1] <= 0
    }

    /// Re-orients the room for one recipient: that player sees itself at
    /// index 0, the opponent at index 1, and the turn flag relative to
    /// itself. Stable keys never appear in the projection.
    pub fn project(&self, viewpoint: usize) -> ProjectedRoom {
        let mut state = self.state.clone();
        if viewpoint == 1 {
            state.set_turn(!state.turn());
        }
        ProjectedRoom {
            code: self.code.clone(),
            game_config: self.config,
            players: [
                PublicPlayer::of(&self.players[viewpoint]),
                PublicPlayer::of(&self.players[1 - viewpoint]),
            ],
            game_state: state,
            first_player: self.first_player ^ viewpoint,
            winner: self.winner.map(|w| w ^ viewpoint),
            player_times_ms: [
                self.remaining_ms[viewpoint],
                self.remaining_ms[1 - viewpoint],
            ],
            synced_at_ms: epoch_ms(),
        }
    }
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn push_room(registry: &Registry, room: &Room) {
    for index in 0..2 {
        registry.send_to(
            &room.players[index].stable_key,
            ServerMsg::RoomInfo {
                room: room.project(index),
            },
        );
    }
}

/// (Re)schedules the one-shot deadline for the player on turn. The fired
/// timer re-enters the world's command loop rather than touching the room
/// directly, keeping a single mutation path.
fn schedule_deadline(room: &mut Room, cmd_tx: mpsc::Sender<Command>) {
    if let Some(handle) = room.deadline.take() {
        handle.abort();
    }
    let wait = room.remaining_ms[room.player_turn].max(0) as u64 + DEADLINE_GRACE_MS;
    let room_code = room.code.clone();
    room.deadline = Some(tokio::spawn(async move {
        sleep(Duration::from_millis(wait)).await;
        let _ = cmd_tx.send(Command::RoomDeadline { room_code }).await;
    }));
}

/// Creates a room for two paired identities, seats them in the given order,
/// picks who moves first, starts the mover's clock and notifies both.
pub fn create_room(world: &mut World, config: GameConfig, first_key: &str, second_key: &str) {
    let Some(code) = unique_code(|c| world.rooms.contains_key(c)) else {
        for key in [first_key, second_key] {
            world.registry.send_to(
                key,
                ServerMsg::RoomInfoError {
                    message: "Could not allocate a room code".to_string(),
                },
            );
        }
        return;
    };

    let players = match (world.sessions.get(first_key), world.sessions.get(second_key)) {
        (Some(first), Some(second)) => [first.identity.clone(), second.identity.clone()],
        _ => {
            tracing::error!("Pairing resolved to an unknown session");
            return;
        }
    };

    let first_player = rand::rng().random_range(0..2);
    let mut state = GameState::generate(config.game_type);
    state.set_turn(first_player == 0);
    let budget = config.time_control.budget_ms();

    let mut room = Room {
        code: code.clone(),
        config,
        players,
        state,
        first_player,
        player_turn: first_player,
        winner: None,
        remaining_ms: [budget, budget],
        last_synced: Instant::now(),
        deadline: None,
    };

    for key in [first_key, second_key] {
        if let Some(session) = world.sessions.get_mut(key) {
            session.current_room = Some(code.clone());
        }
    }

    schedule_deadline(&mut room, world.cmd_tx.clone());
    push_room(&world.registry, &room);
    tracing::info!(
        "Room {} created: {} {} vs {}",
        code,
        config.game_type,
        first_key,
        second_key
    );
    world.rooms.insert(code, room);
}

/// Applies a move submitted by `stable_key`. Precondition violations and
/// illegal moves are rejected without any state change; a clock found
/// expired here ends the room first and rejects the move second.
pub fn handle_move(world: &mut World, stable_key: &str, room_code: &str, mv: &Move) {
    let Some(room) = world.rooms.get_mut(room_code) else {
        world.registry.send_to(
            stable_key,
            ServerMsg::MoveRejected {
                message: "Game not found".to_string(),
            },
        );
        return;
    };
    let Some(player_index) = room.player_index(stable_key) else {
        world.registry.send_to(
            stable_key,
            ServerMsg::MoveRejected {
                message: "You are not in this game".to_string(),
            },
        );
        return;
    };
    if room.player_turn != player_index {
        world.registry.send_to(
            stable_key,
            ServerMsg::MoveRejected {
                message: "It is not your turn".to_string(),
            },
        );
        return;
    }

    room.synchronize();
    if room.remaining_ms[room.player_turn] <= 0 {
        // The clock ran out before the move arrived.
        end_room(world, room_code);
        world.registry.send_to(
            stable_key,
            ServerMsg::MoveRejected {
                message: "Time's up".to_string(),
            },
        );
        return;
    }

    if !room.state.apply_move(mv) {
        world.registry.send_to(
            stable_key,
            ServerMsg::MoveRejected {
                message: "Invalid move".to_string(),
            },
        );
        return;
    }

    room.player_turn = 1 - room.player_turn;
    room.synchronize();

    if room.should_end() {
        end_room(world, room_code);
        return;
    }

    schedule_deadline(room, world.cmd_tx.clone());
    push_room(&world.registry, room);
}

/// A scheduled deadline fired. Re-sync defensively: when a move raced the
/// timer the clock is healthy again and the fire is a stale no-op.
pub fn handle_deadline(world: &mut World, room_code: &str) {
    let Some(room) = world.rooms.get_mut(room_code) else {
        return;
    };
    room.synchronize();
    if room.remaining_ms[room.player_turn] > 0 {
        return;
    }
    tracing::info!("Room {} timed out", room_code);
    end_room(world, room_code);
}

/// Member-only, side-effect-free snapshot of a live room.
pub fn handle_room_info(world: &mut World, stable_key: &str, room_code: &str) {
    let Some(room) = world.rooms.get_mut(room_code) else {
        world.registry.send_to(
            stable_key,
            ServerMsg::RoomInfoError {
                message: "Game not found".to_string(),
            },
        );
        return;
    };
    let Some(player_index) = room.player_index(stable_key) else {
        world.registry.send_to(
            stable_key,
            ServerMsg::RoomInfoError {
                message: "You are not in this game".to_string(),
            },
        );
        return;
    };
    room.synchronize();
    world.registry.send_to(
        stable_key,
        ServerMsg::RoomInfo {
            room: room.project(player_index),
        },
    );
}

/// Ends the room: the player who was about to move loses. Cancels the
/// timer, clears both session pointers, pushes the final mirrored state and
/// emits exactly one result record per player.
pub fn end_room(world: &mut World, room_code: &str) {
    let Some(mut room) = world.rooms.remove(room_code) else {
        return;
    };
    if let Some(handle) = room.deadline.take() {
        handle.abort();
    }
    room.synchronize();
    let winner = 1 - room.player_turn;
    room.winner = Some(winner);

    for (index, player) in room.players.iter().enumerate() {
        if let Some(session) = world.sessions.get_mut(&player.stable_key) {
            session.current_room = None;
        }
        let _ = world.results_tx.send(MatchResult {
            user_id: player.numeric_id,
            game_type: room.config.game_type,
            time_control: room.config.time_control,
            won: index == winner,
        });
    }

    push_room(&world.registry, &room);
    tracing::info!(
        "Room {} over, winner: {}",
        room.code,
        room.players[winner].display_name
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::handle_enqueue;
    use crate::types::stable_key;
    use crate::world::testutil::{connect, drain, harness, TestHarness};
    use crate::world::World;

    /// Enqueues both players for the given config and returns the room code.
    fn start_match(world: &mut World, ada_key: &str, bob_key: &str, game: &str, tc: &str) -> String {
        handle_enqueue(world, ada_key, game, tc);
        handle_enqueue(world, bob_key, game, tc);
        assert_eq!(world.rooms.len(), 1);
        world.rooms.keys().next().unwrap().clone()
    }

    fn mover_key(world: &World, code: &str) -> String {
        let room = &world.rooms[code];
        room.players[room.player_turn].stable_key.clone()
    }

    fn winner_seen_by(msgs: &[ServerMsg]) -> Vec<Option<usize>> {
        msgs.iter()
            .filter_map(|m| match m {
                ServerMsg::RoomInfo { room } => Some(room.winner),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_the_room_exactly_once() {
        let mut h: TestHarness = harness();
        let mut ada = connect(&mut h.world, "Ada", 1);
        let mut bob = connect(&mut h.world, "Bob", 2);
        let code = start_match(&mut h.world, &ada.key, &bob.key, "nim", "15s");
        let loser_key = mover_key(&h.world, &code);
        drain(&mut ada.rx);
        drain(&mut bob.rx);

        // Nobody moves. The paused clock auto-advances to the deadline and
        // the timer re-enters the command loop.
        let cmd = h.cmd_rx.recv().await.unwrap();
        assert!(matches!(cmd, Command::RoomDeadline { ref room_code } if *room_code == code));
        handle_deadline(&mut h.world, &code);

        assert!(h.world.rooms.is_empty());
        assert!(h.world.sessions[&ada.key].current_room.is_none());
        assert!(h.world.sessions[&bob.key].current_room.is_none());

        // Each player saw exactly one terminal push, mirrored per viewpoint.
        for conn in [&mut ada, &mut bob] {
            let winners = winner_seen_by(&drain(&mut conn.rx));
            assert_eq!(winners.len(), 1);
            let expected = if conn.key == loser_key { 1 } else { 0 };
            assert_eq!(winners[0], Some(expected));
        }

        // A stale fire after the room is gone is a no-op.
        handle_deadline(&mut h.world, &code);
        assert!(drain(&mut ada.rx).is_empty());

        let mut results = Vec::new();
        while let Ok(r) = h.results_rx.try_recv() {
            results.push(r);
        }
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.won).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_move_ends_the_room_then_rejects() {
        let mut h = harness();
        let mut ada = connect(&mut h.world, "Ada", 1);
        let mut bob = connect(&mut h.world, "Bob", 2);
        let code = start_match(&mut h.world, &ada.key, &bob.key, "marbles", "15s");
        let loser_key = mover_key(&h.world, &code);
        drain(&mut ada.rx);
        drain(&mut bob.rx);

        tokio::time::advance(Duration::from_secs(16)).await;
        handle_move(
            &mut h.world,
            &loser_key,
            &code,
            &Move::Marbles { amount: 1 },
        );

        assert!(h.world.rooms.is_empty());
        let loser_rx = if loser_key == ada.key {
            &mut ada.rx
        } else {
            &mut bob.rx
        };
        let msgs = drain(loser_rx);
        // Terminal push first, rejection second.
        assert!(matches!(
            msgs[0],
            ServerMsg::RoomInfo { ref room } if room.winner == Some(1)
        ));
        assert!(matches!(msgs[1], ServerMsg::MoveRejected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_turn_and_foreign_moves_are_rejected_without_state_change() {
        let mut h = harness();
        let mut ada = connect(&mut h.world, "Ada", 1);
        let mut bob = connect(&mut h.world, "Bob", 2);
        let mut eve = connect(&mut h.world, "Eve", 3);
        let code = start_match(&mut h.world, &ada.key, &bob.key, "marbles", "1m");
        let mover = mover_key(&h.world, &code);
        let waiter = if mover == ada.key {
            bob.key.clone()
        } else {
            ada.key.clone()
        };
        drain(&mut ada.rx);
        drain(&mut bob.rx);

        let state_before = h.world.rooms[&code].state.clone();

        handle_move(&mut h.world, &waiter, &code, &Move::Marbles { amount: 1 });
        handle_move(&mut h.world, &eve.key, &code, &Move::Marbles { amount: 1 });
        handle_move(&mut h.world, &mover, &code, &Move::Marbles { amount: 9 });
        handle_move(&mut h.world, &mover, "NOROOM", &Move::Marbles { amount: 1 });

        assert_eq!(h.world.rooms[&code].state, state_before);
        assert!(matches!(
            drain(&mut eve.rx)[0],
            ServerMsg::MoveRejected { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn optimal_play_runs_a_match_to_completion() {
        let mut h = harness();
        let mut ada = connect(&mut h.world, "Ada", 1);
        let mut bob = connect(&mut h.world, "Bob", 2);
        let code = start_match(&mut h.world, &ada.key, &bob.key, "nim", "5m");

        let mut guard = 0;
        while h.world.rooms.contains_key(&code) {
            guard += 1;
            assert!(guard < 200, "match did not terminate");
            let mover = mover_key(&h.world, &code);
            let mv = h.world.rooms[&code].state.optimal_move();
            handle_move(&mut h.world, &mover, &code, &mv);
        }

        // The player who applied the final move wins.
        let ada_winners = winner_seen_by(&drain(&mut ada.rx));
        let bob_winners = winner_seen_by(&drain(&mut bob.rx));
        assert!(ada_winners.last().unwrap().is_some());
        assert!(bob_winners.last().unwrap().is_some());
        assert_ne!(ada_winners.last().unwrap(), bob_winners.last().unwrap());

        let mut results = Vec::new();
        while let Ok(r) = h.results_rx.try_recv() {
            results.push(r);
        }
        assert_eq!(results.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn projections_are_exact_mirrors_and_never_leak_keys() {
        let mut h = harness();
        let mut ada = connect(&mut h.world, "Ada", 1);
        let mut bob = connect(&mut h.world, "Bob", 2);
        let code = start_match(&mut h.world, &ada.key, &bob.key, "nim", "1m");
        drain(&mut ada.rx);
        drain(&mut bob.rx);

        handle_room_info(&mut h.world, &ada.key, &code);
        handle_room_info(&mut h.world, &bob.key, &code);

        let ServerMsg::RoomInfo { room: for_ada } = drain(&mut ada.rx).remove(0) else {
            panic!("expected room info");
        };
        let ServerMsg::RoomInfo { room: for_bob } = drain(&mut bob.rx).remove(0) else {
            panic!("expected room info");
        };

        assert_eq!(for_ada.players[0].display_name, "Ada");
        assert_eq!(for_ada.players[1].display_name, "Bob");
        assert_eq!(for_bob.players[0].display_name, "Bob");
        assert_eq!(for_bob.players[1].display_name, "Ada");
        assert_eq!(for_ada.game_state.turn(), !for_bob.game_state.turn());
        assert_eq!(for_ada.first_player, 1 - for_bob.first_player);
        assert_eq!(for_ada.player_times_ms[0], for_bob.player_times_ms[1]);
        assert_eq!(for_ada.player_times_ms[1], for_bob.player_times_ms[0]);

        for projected in [&for_ada, &for_bob] {
            let json = serde_json::to_string(projected).unwrap();
            assert!(!json.contains("ws:"), "stable key leaked: {json}");
            assert!(!json.contains("stable_key"), "stable key leaked: {json}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn room_info_is_member_only_and_idempotent() {
        let mut h = harness();
        let ada = connect(&mut h.world, "Ada", 1);
        let bob = connect(&mut h.world, "Bob", 2);
        let mut eve = connect(&mut h.world, "Eve", 3);
        let code = start_match(&mut h.world, &ada.key, &bob.key, "nim", "1m");

        handle_room_info(&mut h.world, &eve.key, &code);
        assert!(matches!(
            drain(&mut eve.rx)[0],
            ServerMsg::RoomInfoError { .. }
        ));
        handle_room_info(&mut h.world, &eve.key, "NOROOM");
        assert!(matches!(
            drain(&mut eve.rx)[0],
            ServerMsg::RoomInfoError { .. }
        ));

        let state_before = h.world.rooms[&code].state.clone();
        for _ in 0..3 {
            handle_room_info(&mut h.world, &stable_key("Ada"), &code);
        }
        assert_eq!(h.world.rooms[&code].state, state_before);
    }

    #[tokio::test(start_paused = true)]
    async fn clocks_charge_only_the_player_on_turn() {
        let mut h = harness();
        let ada = connect(&mut h.world, "Ada", 1);
        let bob = connect(&mut h.world, "Bob", 2);
        let code = start_match(&mut h.world, &ada.key, &bob.key, "nim", "1m");

        tokio::time::advance(Duration::from_secs(10)).await;
        let room = h.world.rooms.get_mut(&code).unwrap();
        let mover = room.player_turn;
        room.synchronize();
        assert_eq!(room.remaining_ms[mover], 50_000);
        assert_eq!(room.remaining_ms[1 - mover], 60_000);
    }
}
