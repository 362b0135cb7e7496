//! Player, lobby and session registries
//!
//! This module keeps the server-side bookkeeping for everyone who has logged
//! in:
//! - Player records indexed by id, plus the lobby set (LOBBY or MATCHMAKING)
//! - The connection handler currently serving each player
//! - Running sessions and which player sits in which session
//! - Friend requests, invites and per-pair chat histories
//!
//! `PlayerRegistry` is a plain struct. The server wraps it in a single mutex
//! so that match, join, leave and request resolution each run as one atomic
//! step with respect to every player id they touch.

use crate::chat::ChatHandler;
use crate::client_handler::ClientHandler;
use crate::player::Player;
use crate::session::GameSession;
use crate::social::{FriendRequest, InviteRequest, PendingRequest, RequestId};
use log::{debug, info};
use shared::{GameType, PlayerId, PlayerState, RequestStatus, SessionId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

fn pair_key(a: &str, b: &str) -> (PlayerId, PlayerId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[derive(Default)]
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
    /// Players present while LOBBY or MATCHMAKING
    lobby: HashSet<PlayerId>,
    /// Handler serving each player, kept for the life of the connection
    connected_clients: HashMap<PlayerId, Arc<ClientHandler>>,
    sessions: HashMap<SessionId, GameSession>,
    sessions_by_player: HashMap<PlayerId, SessionId>,
    chats: HashMap<(PlayerId, PlayerId), ChatHandler>,
    /// Newest request per (sender, recipient), with its latest status
    request_history: HashMap<(PlayerId, PlayerId), PendingRequest>,
    next_request_id: RequestId,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            next_request_id: 1,
            ..Self::default()
        }
    }

    /// Registers a player, replacing any previous record with the same id
    pub fn insert_player(&mut self, player: Player, handler: Option<Arc<ClientHandler>>) {
        let id = player.id.clone();
        if player.state != PlayerState::InGame {
            self.lobby.insert(id.clone());
        }
        match handler {
            Some(handler) => {
                self.connected_clients.insert(id.clone(), handler);
            }
            None => {
                self.connected_clients.remove(&id);
            }
        }
        info!("Player {} ({}) registered", player.username, id);
        self.players.insert(id, player);
    }

    /// Removes a player from every registry and drops requests that mention them
    pub fn remove_player(&mut self, player_id: &str) -> Option<(Player, Option<Arc<ClientHandler>>)> {
        let player = self.players.remove(player_id)?;
        self.lobby.remove(player_id);
        self.sessions_by_player.remove(player_id);
        self.chats.retain(|(a, b), _| a != player_id && b != player_id);

        for other in self.players.values_mut() {
            other
                .pending_requests
                .retain(|r| r.sender() != player_id && r.recipient() != player_id);
        }
        self.request_history
            .retain(|(sender, recipient), _| sender != player_id && recipient != player_id);

        let handler = self.connected_clients.remove(player_id);
        info!("Player {} ({}) removed", player.username, player_id);
        Some((player, handler))
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.get_mut(player_id)
    }

    pub fn handler(&self, player_id: &str) -> Option<Arc<ClientHandler>> {
        self.connected_clients.get(player_id).cloned()
    }

    pub fn set_handler(&mut self, player_id: &str, handler: Arc<ClientHandler>) {
        if let Some(player) = self.players.get_mut(player_id) {
            player.connection_id = Some(handler.connection_id());
            self.connected_clients.insert(player_id.to_string(), handler);
        }
    }

    pub fn handlers(&self) -> Vec<Arc<ClientHandler>> {
        self.connected_clients.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn in_lobby(&self, player_id: &str) -> bool {
        self.lobby.contains(player_id)
    }

    pub fn lobby_len(&self) -> usize {
        self.lobby.len()
    }

    pub fn connected_len(&self) -> usize {
        self.connected_clients.len()
    }

    /// Claims two distinct lobby players for a match and flips them to IN_GAME
    ///
    /// Fails without changing anything if either is missing, already claimed
    /// or the two ids are the same.
    pub fn take_from_lobby(&mut self, player1: &str, player2: &str) -> bool {
        if player1 == player2 || !self.lobby.contains(player1) || !self.lobby.contains(player2) {
            return false;
        }
        if !self.players.contains_key(player1) || !self.players.contains_key(player2) {
            return false;
        }

        for id in [player1, player2] {
            self.lobby.remove(id);
            if let Some(player) = self.players.get_mut(id) {
                player.state = PlayerState::InGame;
            }
        }
        true
    }

    pub fn return_to_lobby(&mut self, player_id: &str) {
        if let Some(player) = self.players.get_mut(player_id) {
            player.state = PlayerState::Lobby;
            self.lobby.insert(player_id.to_string());
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Keeps `request` unless a newer one between the same pair is already recorded
    fn record_request(&mut self, request: PendingRequest) {
        let key = (request.sender().to_string(), request.recipient().to_string());
        match self.request_history.get(&key) {
            Some(latest) if latest.id() > request.id() => {}
            _ => {
                self.request_history.insert(key, request);
            }
        }
    }

    fn both_known(&self, a: &str, b: &str) -> bool {
        a != b && self.players.contains_key(a) && self.players.contains_key(b)
    }

    /// Files a friend request on both parties' pending lists
    pub fn add_friend_request(&mut self, sender: &str, recipient: &str) -> Option<FriendRequest> {
        if !self.both_known(sender, recipient) {
            return None;
        }

        let request = FriendRequest::new(self.next_request_id(), sender, recipient);
        let pending = PendingRequest::Friend(request.clone());
        for party in [sender, recipient] {
            if let Some(player) = self.players.get_mut(party) {
                player.add_request(pending.clone());
            }
        }
        self.record_request(pending);
        debug!("Friend request {} from {} to {}", request.id, sender, recipient);
        Some(request)
    }

    /// Accepts or declines the newest pending friend request from `sender`
    pub fn resolve_friend_request(
        &mut self,
        sender: &str,
        recipient: &str,
        accept: bool,
    ) -> Option<FriendRequest> {
        let mut request = match self.players.get(recipient)?.latest_friend_request_from(sender)? {
            PendingRequest::Friend(request) => request.clone(),
            PendingRequest::Invite(_) => return None,
        };

        let resolved = if accept {
            request.accept(&mut self.players)
        } else {
            request.decline(&mut self.players)
        };
        if !resolved {
            return None;
        }

        self.record_request(PendingRequest::Friend(request.clone()));
        Some(request)
    }

    /// Appends an invite to the recipient's pending list; duplicates are kept
    pub fn add_invite(&mut self, sender: &str, recipient: &str, game_type: GameType) -> Option<InviteRequest> {
        if !self.both_known(sender, recipient) {
            return None;
        }

        let request = InviteRequest::new(self.next_request_id(), sender, recipient, game_type);
        let pending = PendingRequest::Invite(request.clone());
        if let Some(player) = self.players.get_mut(recipient) {
            player.add_request(pending.clone());
        }
        self.record_request(pending);
        debug!("Invite {} from {} to {} ({})", request.id, sender, recipient, game_type);
        Some(request)
    }

    /// Applies `status` to the newest pending invite from `sender`
    pub fn resolve_invite(
        &mut self,
        sender: &str,
        recipient: &str,
        status: RequestStatus,
    ) -> Option<InviteRequest> {
        let mut request = match self.players.get(recipient)?.latest_invite_from(sender)? {
            PendingRequest::Invite(request) => request.clone(),
            PendingRequest::Friend(_) => return None,
        };

        let resolved = match status {
            RequestStatus::Accepted => request.accept(&mut self.players),
            RequestStatus::Rejected => request.decline(&mut self.players),
            RequestStatus::Pending => false,
        };
        if !resolved {
            return None;
        }

        self.record_request(PendingRequest::Invite(request.clone()));
        Some(request)
    }

    /// Newest request of any kind from `sender` to `recipient`, resolved or not
    pub fn latest_request(&self, sender: &str, recipient: &str) -> Option<&PendingRequest> {
        self.request_history
            .get(&(sender.to_string(), recipient.to_string()))
    }

    /// Number of (sender, recipient) pairs with a recorded request
    pub fn request_history_len(&self) -> usize {
        self.request_history.len()
    }

    /// Stores a started session and indexes both of its players
    pub fn insert_session(&mut self, session: GameSession) {
        let session_id = session.session_id().to_string();
        for player_id in session.players() {
            self.sessions_by_player.insert(player_id, session_id.clone());
        }
        self.sessions.insert(session_id, session);
    }

    pub fn session_of(&self, player_id: &str) -> Option<&SessionId> {
        self.sessions_by_player.get(player_id)
    }

    pub fn session(&self, session_id: &str) -> Option<&GameSession> {
        self.sessions.get(session_id)
    }

    pub fn session_mut(&mut self, session_id: &str) -> Option<&mut GameSession> {
        self.sessions.get_mut(session_id)
    }

    pub fn remove_session(&mut self, session_id: &str) -> Option<GameSession> {
        let session = self.sessions.remove(session_id)?;
        self.sessions_by_player.retain(|_, sid| sid != session_id);
        Some(session)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn chat_mut(&mut self, a: &str, b: &str) -> &mut ChatHandler {
        self.chats.entry(pair_key(a, b)).or_default()
    }

    pub fn chat(&self, a: &str, b: &str) -> Option<&ChatHandler> {
        self.chats.get(&pair_key(a, b))
    }

    /// Players whose handler has been disconnected for longer than `window`
    pub fn expired_players(&self, window: Duration) -> Vec<PlayerId> {
        self.connected_clients
            .iter()
            .filter(|(_, handler)| handler.is_expired(window))
            .map(|(id, _)| id.clone())
            .collect()
    }
}
