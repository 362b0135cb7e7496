//! Player identity and social state
//!
//! Players reference each other and their connection handler by id only.
//! The registry owns every `Player`; friend lists and pending requests hold
//! ids, so removing a player never leaves a dangling owner behind.

use crate::social::{PendingRequest, RequestId};
use crate::storage::PlayerSnapshot;
use shared::{PlayerId, PlayerState};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct Player {
    /// Unique, immutable identifier
    pub id: PlayerId,
    pub username: String,
    pub email: String,
    /// Opaque reference owned by the authentication subsystem
    pub credential_ref: String,
    pub state: PlayerState,
    /// Friend ids; symmetric across both players
    pub friends: BTreeSet<PlayerId>,
    /// Requests awaiting a decision, oldest first
    pub pending_requests: Vec<PendingRequest>,
    /// Connection currently serving this player, if any
    pub connection_id: Option<u64>,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            credential_ref: String::new(),
            state: PlayerState::Lobby,
            friends: BTreeSet::new(),
            pending_requests: Vec::new(),
            connection_id: None,
        }
    }

    pub fn from_snapshot(snapshot: PlayerSnapshot) -> Self {
        Self {
            id: snapshot.id,
            username: snapshot.username,
            email: snapshot.email,
            credential_ref: snapshot.credential_ref,
            state: PlayerState::Lobby,
            friends: snapshot.friends.into_iter().collect(),
            pending_requests: Vec::new(),
            connection_id: None,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            credential_ref: self.credential_ref.clone(),
            friends: self.friends.iter().cloned().collect(),
        }
    }

    /// Adds a friend; returns false when already present
    pub fn add_friend(&mut self, friend_id: &str) -> bool {
        if friend_id == self.id {
            return false;
        }
        self.friends.insert(friend_id.to_string())
    }

    pub fn is_friend(&self, other_id: &str) -> bool {
        self.friends.contains(other_id)
    }

    pub fn add_request(&mut self, request: PendingRequest) {
        self.pending_requests.push(request);
    }

    pub fn remove_request(&mut self, request_id: RequestId) -> Option<PendingRequest> {
        let index = self
            .pending_requests
            .iter()
            .position(|request| request.id() == request_id)?;
        Some(self.pending_requests.remove(index))
    }

    /// Most recent pending friend request this player received from `sender`
    pub fn latest_friend_request_from(&self, sender: &str) -> Option<&PendingRequest> {
        self.pending_requests
            .iter()
            .rev()
            .find(|r| r.is_friend_request() && r.sender() == sender && r.recipient() == self.id)
    }

    /// Most recent pending invite this player received from `sender`
    pub fn latest_invite_from(&self, sender: &str) -> Option<&PendingRequest> {
        self.pending_requests
            .iter()
            .rev()
            .find(|r| r.is_invite() && r.sender() == sender && r.recipient() == self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::{FriendRequest, InviteRequest};
    use shared::GameType;

    #[test]
    fn test_player_creation() {
        let player = Player::new("a", "alice", "alice@example.com");
        assert_eq!(player.id, "a");
        assert_eq!(player.username, "alice");
        assert_eq!(player.state, PlayerState::Lobby);
        assert!(player.friends.is_empty());
        assert!(player.pending_requests.is_empty());
        assert!(player.connection_id.is_none());
    }

    #[test]
    fn test_friend_set_semantics() {
        let mut player = Player::new("a", "alice", "");
        assert!(player.add_friend("b"));
        assert!(!player.add_friend("b"));
        assert!(!player.add_friend("a"));
        assert_eq!(player.friends.len(), 1);
        assert!(player.is_friend("b"));
    }

    #[test]
    fn test_latest_request_lookup() {
        let mut bob = Player::new("b", "bob", "");
        bob.add_request(PendingRequest::Friend(FriendRequest::new(1, "a", "b")));
        bob.add_request(PendingRequest::Invite(InviteRequest::new(
            2,
            "a",
            "b",
            GameType::Checkers,
        )));
        bob.add_request(PendingRequest::Friend(FriendRequest::new(3, "a", "b")));

        assert_eq!(bob.latest_friend_request_from("a").unwrap().id(), 3);
        assert_eq!(bob.latest_invite_from("a").unwrap().id(), 2);
        assert!(bob.latest_invite_from("c").is_none());

        assert!(bob.remove_request(3).is_some());
        assert!(bob.remove_request(3).is_none());
        assert_eq!(bob.latest_friend_request_from("a").unwrap().id(), 1);
    }

    #[test]
    fn test_snapshot_roundtrip_keeps_friends() {
        let mut player = Player::new("a", "alice", "alice@example.com");
        player.add_friend("b");
        player.state = PlayerState::InGame;

        let restored = Player::from_snapshot(player.snapshot());
        assert_eq!(restored.id, "a");
        assert!(restored.is_friend("b"));
        assert_eq!(restored.state, PlayerState::Lobby);
    }
}
