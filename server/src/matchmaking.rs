//! Random-opponent matchmaking
//!
//! One FIFO queue per game type. Every join stamps the player with a
//! monotonically increasing ticket; pairing always takes the two oldest
//! tickets of the queue whose head has waited longest, so the
//! longest-waiting compatible pair is matched first. Players queued under
//! different game types never see each other.

use crate::client_handler::ClientHandler;
use crate::player::Player;
use log::{debug, info};
use shared::{GameType, PlayerId, PlayerState, ServerMessage, QUEUE_SEARCHING};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Ticket {
    player_id: PlayerId,
    number: u64,
}

/// Two players taken off the same queue, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub first: PlayerId,
    pub second: PlayerId,
    pub game_type: GameType,
    tickets: (u64, u64),
}

#[derive(Default)]
pub struct MatchmakingService {
    queues: Mutex<HashMap<GameType, VecDeque<Ticket>>>,
    next_ticket: AtomicU64,
}

impl MatchmakingService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GameType, VecDeque<Ticket>>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueues a LOBBY player and moves them to MATCHMAKING
    ///
    /// Returns false, changing nothing, for a player in any other state.
    pub fn join_random_queue(
        &self,
        player: &mut Player,
        handler: Option<&ClientHandler>,
        game_type: GameType,
    ) -> bool {
        if player.state != PlayerState::Lobby {
            debug!("{} cannot queue while {}", player.id, player.state);
            return false;
        }

        let number = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.lock().entry(game_type).or_default().push_back(Ticket {
            player_id: player.id.clone(),
            number,
        });
        player.state = PlayerState::Matchmaking;

        if let Some(handler) = handler {
            handler.send(&ServerMessage::QueueStatus {
                status: QUEUE_SEARCHING.to_string(),
            });
        }
        info!("{} joined the {} queue", player.id, game_type);
        true
    }

    /// Pops every compatible pair currently waiting, longest-waiting first
    pub fn process_immediate_match(&self) -> Vec<Pairing> {
        let mut queues = self.lock();
        let mut pairings = Vec::new();

        loop {
            let next = queues
                .iter()
                .filter(|(_, queue)| queue.len() >= 2)
                .filter_map(|(game_type, queue)| queue.front().map(|head| (head.number, *game_type)))
                .min();
            let Some((_, game_type)) = next else {
                break;
            };

            let Some(queue) = queues.get_mut(&game_type) else {
                break;
            };
            let (Some(first), Some(second)) = (queue.pop_front(), queue.pop_front()) else {
                break;
            };
            debug!("Paired {} and {} for {}", first.player_id, second.player_id, game_type);
            pairings.push(Pairing {
                first: first.player_id,
                second: second.player_id,
                game_type,
                tickets: (first.number, second.number),
            });
        }
        pairings
    }

    /// Puts `player_id` from `pairing` back at its original queue position
    pub fn restore(&self, pairing: &Pairing, player_id: &str) {
        let number = if pairing.first == player_id {
            pairing.tickets.0
        } else if pairing.second == player_id {
            pairing.tickets.1
        } else {
            return;
        };

        let mut queues = self.lock();
        let queue = queues.entry(pairing.game_type).or_default();
        let position = queue
            .iter()
            .position(|ticket| ticket.number > number)
            .unwrap_or(queue.len());
        queue.insert(
            position,
            Ticket {
                player_id: player_id.to_string(),
                number,
            },
        );
    }

    /// Takes the player out of whichever queue holds them and back to LOBBY
    pub fn leave_queue(&self, player: &mut Player, handler: Option<&ClientHandler>) -> bool {
        if self.remove(&player.id).is_none() && player.state != PlayerState::Matchmaking {
            return false;
        }
        player.state = PlayerState::Lobby;

        if let Some(handler) = handler {
            handler.send(&ServerMessage::QueueLeft);
        }
        info!("{} left matchmaking", player.id);
        true
    }

    /// Drops the player's ticket without touching their state
    pub fn remove(&self, player_id: &str) -> Option<GameType> {
        let mut queues = self.lock();
        for (game_type, queue) in queues.iter_mut() {
            if let Some(index) = queue.iter().position(|t| t.player_id == player_id) {
                queue.remove(index);
                return Some(*game_type);
            }
        }
        None
    }

    /// Snapshot of one queue, oldest first
    pub fn queued(&self, game_type: GameType) -> Vec<PlayerId> {
        self.lock()
            .get(&game_type)
            .map(|queue| queue.iter().map(|t| t.player_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_queued(&self, player_id: &str) -> bool {
        self.lock()
            .values()
            .any(|queue| queue.iter().any(|t| t.player_id == player_id))
    }

    pub fn len(&self) -> usize {
        self.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_match_found(
        &self,
        handler: &ClientHandler,
        opponent: &Player,
        session_id: &str,
        game_type: GameType,
    ) {
        handler.send(&ServerMessage::MatchFound {
            session_id: session_id.to_string(),
            opponent_id: opponent.id.clone(),
            opponent_username: opponent.username.clone(),
            game_type,
        });
    }
}
