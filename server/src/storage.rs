//! Persistence interface for player and game-state snapshots
//!
//! The core only ever saves and loads whole snapshots. `MemoryStorage`
//! keeps them bincode-encoded in memory, which is what the server uses when
//! no other backend is plugged in.

use crate::error::StorageError;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use shared::{GameResult, GameType, PlayerId, SessionId};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub username: String,
    pub email: String,
    pub credential_ref: String,
    pub friends: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub session_id: SessionId,
    pub game_type: GameType,
    pub player1: PlayerId,
    pub player2: PlayerId,
    /// Rule-engine board rendering at the time of the snapshot
    pub board: String,
    pub moves: Vec<(PlayerId, String)>,
    pub result: Option<GameResult>,
    pub saved_at: u64,
}

impl GameStateSnapshot {
    pub fn involves(&self, player_id: &str) -> bool {
        self.player1 == player_id || self.player2 == player_id
    }
}

pub trait Storage: Send + Sync {
    fn save_player(&self, player: &PlayerSnapshot) -> Result<(), StorageError>;
    fn load_player(&self, player_id: &str) -> Result<Option<PlayerSnapshot>, StorageError>;
    fn save_game_state(&self, state: &GameStateSnapshot) -> Result<(), StorageError>;
    fn get_latest_game_state(&self, session_id: &str) -> Result<Option<GameStateSnapshot>, StorageError>;
    /// Every saved game state the player took part in, oldest first
    fn load_history(&self, player_id: &str) -> Result<Vec<GameStateSnapshot>, StorageError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    players: Mutex<HashMap<PlayerId, Vec<u8>>>,
    /// Every saved state in save order
    game_states: Mutex<Vec<(SessionId, Vec<u8>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_state(session_id: &str, bytes: &[u8]) -> Result<GameStateSnapshot, StorageError> {
        deserialize(bytes).map_err(|e| StorageError::Decode(session_id.to_string(), e))
    }
}

impl Storage for MemoryStorage {
    fn save_player(&self, player: &PlayerSnapshot) -> Result<(), StorageError> {
        let bytes = serialize(player).map_err(|e| StorageError::Encode(player.id.clone(), e))?;
        self.players
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .insert(player.id.clone(), bytes);
        Ok(())
    }

    fn load_player(&self, player_id: &str) -> Result<Option<PlayerSnapshot>, StorageError> {
        let players = self.players.lock().map_err(|_| StorageError::Poisoned)?;
        match players.get(player_id) {
            Some(bytes) => deserialize(bytes)
                .map(Some)
                .map_err(|e| StorageError::Decode(player_id.to_string(), e)),
            None => Ok(None),
        }
    }

    fn save_game_state(&self, state: &GameStateSnapshot) -> Result<(), StorageError> {
        let bytes = serialize(state).map_err(|e| StorageError::Encode(state.session_id.clone(), e))?;
        self.game_states
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .push((state.session_id.clone(), bytes));
        Ok(())
    }

    fn get_latest_game_state(&self, session_id: &str) -> Result<Option<GameStateSnapshot>, StorageError> {
        let states = self.game_states.lock().map_err(|_| StorageError::Poisoned)?;
        states
            .iter()
            .rev()
            .find(|(id, _)| id == session_id)
            .map(|(id, bytes)| Self::decode_state(id, bytes))
            .transpose()
    }

    fn load_history(&self, player_id: &str) -> Result<Vec<GameStateSnapshot>, StorageError> {
        let states = self.game_states.lock().map_err(|_| StorageError::Poisoned)?;
        let mut history = Vec::new();
        for (id, bytes) in states.iter() {
            let state = Self::decode_state(id, bytes)?;
            if state.involves(player_id) {
                history.push(state);
            }
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(session_id: &str, board: &str, result: Option<GameResult>) -> GameStateSnapshot {
        GameStateSnapshot {
            session_id: session_id.to_string(),
            game_type: GameType::TicTacToe,
            player1: "a".to_string(),
            player2: "b".to_string(),
            board: board.to_string(),
            moves: vec![("a".to_string(), "1,1".to_string())],
            result,
            saved_at: 0,
        }
    }

    #[test]
    fn test_player_save_and_load() {
        let storage = MemoryStorage::new();
        let snapshot = PlayerSnapshot {
            id: "a".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            credential_ref: "cred-a".to_string(),
            friends: vec!["b".to_string()],
        };

        storage.save_player(&snapshot).unwrap();
        assert_eq!(storage.load_player("a").unwrap(), Some(snapshot));
        assert_eq!(storage.load_player("zz").unwrap(), None);
    }

    #[test]
    fn test_latest_game_state_wins() {
        let storage = MemoryStorage::new();
        storage.save_game_state(&state("s1", "early", None)).unwrap();
        storage
            .save_game_state(&state("s1", "late", Some(GameResult::Draw)))
            .unwrap();
        storage.save_game_state(&state("s2", "other", None)).unwrap();

        let latest = storage.get_latest_game_state("s1").unwrap().unwrap();
        assert_eq!(latest.board, "late");
        assert_eq!(latest.result, Some(GameResult::Draw));
        assert!(storage.get_latest_game_state("missing").unwrap().is_none());
    }

    #[test]
    fn test_history_filters_by_player() {
        let storage = MemoryStorage::new();
        storage.save_game_state(&state("s1", "x", None)).unwrap();
        let mut unrelated = state("s2", "y", None);
        unrelated.player1 = "c".to_string();
        unrelated.player2 = "d".to_string();
        storage.save_game_state(&unrelated).unwrap();

        let history = storage.load_history("b").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].session_id, "s1");
        assert!(storage.load_history("zz").unwrap().is_empty());
    }
}
