//! Server network layer: TCP accept loop and the game server context
//!
//! `GameServer` owns every shared registry. The registry (players, lobby,
//! handlers, sessions, requests, chats) lives behind one mutex; the
//! matchmaking queues have their own lock that is only ever taken while the
//! registry lock is held, never the other way round. Nothing awaits while
//! either lock is held.
//!
//! Background tasks:
//! - **Accept loop**: one `serve_connection` task per socket
//! - **Sweeper**: purges players whose connection stayed down longer than
//!   the reconnect window
//! - **Turn clocks**: per-session timers that call back into `expire_turn`

use crate::auth::{Authenticator, Credentials, MemoryAuthenticator};
use crate::chat::Chat;
use crate::client_handler::{serve_connection, ClientHandler, ConnectionState};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::ConnectionHealth;
use crate::matchmaking::MatchmakingService;
use crate::player::Player;
use crate::registry::PlayerRegistry;
use crate::session::{GameSession, TurnClock, TurnExpiry};
use crate::social::{FriendRequest, InviteRequest, PendingRequest};
use crate::storage::{GameStateSnapshot, MemoryStorage, PlayerSnapshot, Storage};
use log::{debug, error, info, warn};
use shared::{
    ClientCommand, GameResult, GameType, PlayerId, PlayerState, ProtocolError, RequestStatus,
    ServerMessage, SessionId, SERVER_FULL,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

fn unix_time() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Main server coordinating connections, matchmaking and sessions
pub struct GameServer {
    config: ServerConfig,
    registry: Mutex<PlayerRegistry>,
    matchmaking: MatchmakingService,
    health: Mutex<ConnectionHealth>,
    storage: Arc<dyn Storage>,
    auth: Arc<dyn Authenticator>,

    /// Every live connection, authenticated or not
    connections: Mutex<HashMap<u64, Weak<ClientHandler>>>,
    next_connection_id: AtomicU64,
    next_session_id: AtomicU64,

    running: AtomicBool,
    /// Set by `stop()`, consumed by the next `run()`
    stop_requested: AtomicBool,
    shutdown: watch::Sender<bool>,
    self_ref: Weak<GameServer>,
}

impl GameServer {
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>, auth: Arc<dyn Authenticator>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new_cyclic(|self_ref| GameServer {
            config,
            registry: Mutex::new(PlayerRegistry::new()),
            matchmaking: MatchmakingService::new(),
            health: Mutex::new(ConnectionHealth::new()),
            storage,
            auth,
            connections: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
            next_session_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            shutdown,
            self_ref: self_ref.clone(),
        })
    }

    /// Server backed by in-memory storage and accounts
    pub fn with_config(config: ServerConfig) -> Arc<Self> {
        Self::new(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryAuthenticator::new()),
        )
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn matchmaking(&self) -> &MatchmakingService {
        &self.matchmaking
    }

    fn lock_registry(&self) -> MutexGuard<'_, PlayerRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_health(&self) -> MutexGuard<'_, ConnectionHealth> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_connections(&self) -> MutexGuard<'_, HashMap<u64, Weak<ClientHandler>>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Binds the configured address and runs the accept loop until `stop()`
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.run(listener).await
    }

    /// Runs the accept loop on an already bound listener until `stop()`
    pub async fn run(&self, listener: TcpListener) -> Result<(), ServerError> {
        let Some(server) = self.self_ref.upgrade() else {
            return Ok(());
        };
        let local_addr = listener.local_addr()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        // A stop() racing this reset either sets the flag before the check
        // below or sends `true` after we subscribed.
        self.shutdown.send_replace(false);
        let mut shutdown = self.shutdown.subscribe();
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            info!("Game server stopped before accepting on {}", local_addr);
            return Ok(());
        }
        info!("Game server listening on {}", local_addr);

        let sweeper = self.spawn_sweeper(Arc::clone(&server));

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept(&server, stream, addr),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        sweeper.abort();
        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        info!("Game server stopped");
        Ok(())
    }

    fn accept(&self, server: &Arc<GameServer>, stream: TcpStream, addr: SocketAddr) {
        let active = self.active_connections();
        if active >= self.config.max_clients {
            warn!("Rejecting {}: server full ({} connections)", addr, active);
            tokio::spawn(reject_connection(stream));
            return;
        }

        debug!("Accepted connection from {}", addr);
        let server = Arc::clone(server);
        tokio::spawn(async move {
            serve_connection(server, stream, addr).await;
        });
    }

    /// Spawns task that purges players whose reconnect window ran out
    fn spawn_sweeper(&self, server: Arc<GameServer>) -> JoinHandle<()> {
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                server.sweep_expired();
            }
        })
    }

    /// Stops the accept loop and every connection; safe to call repeatedly
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);

        let handlers: Vec<Arc<ClientHandler>> = {
            let connections = self.lock_connections();
            connections.values().filter_map(Weak::upgrade).collect()
        };
        let registered = self.lock_registry().handlers();
        for handler in handlers.iter().chain(registered.iter()) {
            handler.stop();
        }

        if was_running {
            info!("Game server shutting down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Open connections, authenticated or not
    pub fn active_connections(&self) -> usize {
        self.lock_connections().len()
    }

    /// Creates the handler for a freshly accepted socket
    pub fn open_connection(
        &self,
        addr: Option<SocketAddr>,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Arc<ClientHandler> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let handler = Arc::new(ClientHandler::new(
            connection_id,
            addr,
            self.self_ref.clone(),
            Some(outbound),
        ));
        self.lock_connections()
            .insert(connection_id, Arc::downgrade(&handler));
        handler
    }

    /// Transport for `handler` is gone
    ///
    /// A logged-in player keeps their handler, now DISCONNECTED, until they
    /// log in again or the sweeper purges them. Anything else is stopped.
    pub fn connection_lost(&self, handler: &Arc<ClientHandler>) {
        self.lock_connections().remove(&handler.connection_id());

        let registered = handler.client_id().and_then(|id| self.lock_registry().handler(&id));
        match registered {
            Some(current) if Arc::ptr_eq(&current, handler) && handler.is_running() => {
                handler.disconnect();
            }
            _ => handler.stop(),
        }
    }

    /// Parses and executes one inbound line
    ///
    /// Returns the handler that now serves this connection when a login
    /// re-attached the socket to a previously disconnected handler.
    pub fn handle_line(&self, handler: &Arc<ClientHandler>, line: &str) -> Option<Arc<ClientHandler>> {
        let command = match ClientCommand::parse(line) {
            Ok(command) => command,
            Err(ProtocolError::Empty) => return None,
            Err(e) => {
                warn!("Dropping line from connection {}: {}", handler.connection_id(), e);
                handler.send(&ServerMessage::Error {
                    reason: e.to_string(),
                });
                return None;
            }
        };

        match command {
            ClientCommand::Register {
                username,
                email,
                password,
            } => return self.register(handler, username, password, &email),
            ClientCommand::Login { username, password } => {
                return self.login(handler, username, password)
            }
            ClientCommand::Quit => {
                self.quit(handler);
                return None;
            }
            _ => {}
        }

        let Some(player_id) = handler.client_id() else {
            handler.send(&error("Not logged in"));
            return None;
        };

        match command {
            ClientCommand::Queue { game_type } => {
                if !self.join_random_matchmaking(&player_id, game_type) {
                    handler.send(&error("Cannot join matchmaking now"));
                }
            }
            ClientCommand::LeaveQueue => {
                if !self.leave_matchmaking(&player_id) {
                    handler.send(&error("Not in matchmaking"));
                }
            }
            ClientCommand::Invite {
                recipient,
                game_type,
            } => {
                if self.send_invite(&player_id, &recipient, game_type).is_none() {
                    handler.send(&error("Unknown player"));
                }
            }
            ClientCommand::AcceptInvite { sender } => {
                if self
                    .handle_invite(&sender, &player_id, RequestStatus::Accepted)
                    .is_none()
                {
                    handler.send(&error("No pending invite"));
                }
            }
            ClientCommand::DeclineInvite { sender } => {
                if self
                    .handle_invite(&sender, &player_id, RequestStatus::Rejected)
                    .is_none()
                {
                    handler.send(&error("No pending invite"));
                }
            }
            ClientCommand::FriendRequest { recipient } => {
                if !handler.send_friend_request(&recipient) {
                    handler.send(&error("Unknown player"));
                }
            }
            ClientCommand::AcceptFriend { sender } => {
                if !handler.accept_friend_request(&sender) {
                    handler.send(&error("No pending friend request"));
                }
            }
            ClientCommand::DeclineFriend { sender } => {
                if !handler.decline_friend_request(&sender) {
                    handler.send(&error("No pending friend request"));
                }
            }
            ClientCommand::Move { data } => {
                if !self.submit_move(&player_id, &data) {
                    debug!("Move {:?} from {} rejected", data, player_id);
                }
            }
            ClientCommand::Resign => {
                if !self.resign(&player_id) {
                    handler.send(&error("Not in a game"));
                }
            }
            ClientCommand::Chat { recipient, message } => {
                if !self.send_chat(&player_id, &recipient, &message) {
                    handler.send(&error("Unknown player"));
                }
            }
            ClientCommand::ChatHistory { other } => match self.chat_lines(&player_id, &other) {
                Some(lines) => {
                    handler.send(&ServerMessage::ChatHistory { count: lines.len() });
                    for line in lines {
                        handler.send(&ServerMessage::ChatEntry { line });
                    }
                }
                None => handler.send(&error("Unknown player")),
            },
            ClientCommand::Ping {
                latency_ms,
                packet_loss,
            } => {
                self.record_ping(handler, latency_ms, packet_loss);
            }
            ClientCommand::Register { .. } | ClientCommand::Login { .. } | ClientCommand::Quit => {}
        }
        None
    }

    fn register(
        &self,
        handler: &Arc<ClientHandler>,
        username: String,
        secret: String,
        email: &str,
    ) -> Option<Arc<ClientHandler>> {
        if handler.client_id().is_some() {
            handler.send(&error("Already logged in"));
            return None;
        }

        let identity = match self.auth.register(&Credentials { username, secret }, email) {
            Ok(identity) => identity,
            Err(e) => {
                info!("Registration on connection {} failed: {}", handler.connection_id(), e);
                handler.send(&error(&e.to_string()));
                return None;
            }
        };

        let mut player = Player::new(identity.id, identity.username, identity.email);
        player.credential_ref = identity.credential_ref;
        self.save_player(&player.snapshot());
        self.register_player(player, Some(Arc::clone(handler)));
        None
    }

    fn login(
        &self,
        handler: &Arc<ClientHandler>,
        username: String,
        secret: String,
    ) -> Option<Arc<ClientHandler>> {
        if handler.client_id().is_some() {
            handler.send(&error("Already logged in"));
            return None;
        }

        let identity = match self.auth.authenticate(&Credentials { username, secret }) {
            Ok(identity) => identity,
            Err(e) => {
                info!("Login on connection {} failed: {}", handler.connection_id(), e);
                handler.send(&error(&e.to_string()));
                return None;
            }
        };

        let stored = match self.storage.load_player(&identity.id) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to load player {}: {}", identity.id, e);
                None
            }
        };

        let mut registry = self.lock_registry();
        if let Some(existing) = registry.handler(&identity.id) {
            if existing.is_running() && existing.connection_state() != ConnectionState::Disconnected {
                drop(registry);
                handler.send(&error("Already logged in"));
                return None;
            }

            if existing.is_running() {
                return self.reattach(&mut registry, handler, existing);
            }
        }

        if registry.contains(&identity.id) {
            // Registered but its handler was stopped; serve it from this socket.
            handler.set_client_id(&identity.id);
            registry.set_handler(&identity.id, Arc::clone(handler));
            let username = registry
                .player(&identity.id)
                .map(|p| p.username.clone())
                .unwrap_or_default();
            handler.send(&ServerMessage::Welcome {
                player_id: identity.id,
                username,
            });
            return None;
        }

        let mut player = match stored {
            Some(snapshot) => Player::from_snapshot(snapshot),
            None => Player::new(identity.id, identity.username, identity.email),
        };
        if player.credential_ref.is_empty() {
            player.credential_ref = identity.credential_ref;
        }
        self.attach(&mut registry, player, handler);
        None
    }

    /// Moves this socket onto the player's disconnected handler
    fn reattach(
        &self,
        registry: &mut PlayerRegistry,
        provisional: &Arc<ClientHandler>,
        existing: Arc<ClientHandler>,
    ) -> Option<Arc<ClientHandler>> {
        let Some(outbound) = provisional.take_outbound() else {
            provisional.stop();
            return None;
        };
        if !existing.reconnect_with(outbound.clone()) {
            warn!(
                "Connection {} could not take over connection {}",
                provisional.connection_id(),
                existing.connection_id()
            );
            let _ = outbound.send(error("Reconnect failed").to_string());
            provisional.stop();
            return None;
        }

        {
            let mut connections = self.lock_connections();
            connections.remove(&provisional.connection_id());
            connections.insert(existing.connection_id(), Arc::downgrade(&existing));
        }
        provisional.stop();

        let player_id = existing.client_id().unwrap_or_default();
        if let Some(player) = registry.player_mut(&player_id) {
            player.connection_id = Some(existing.connection_id());
            existing.send(&ServerMessage::Welcome {
                player_id: player.id.clone(),
                username: player.username.clone(),
            });
        }
        info!("Player {} reconnected on connection {}", player_id, existing.connection_id());
        Some(existing)
    }

    fn attach(&self, registry: &mut PlayerRegistry, mut player: Player, handler: &Arc<ClientHandler>) {
        handler.set_client_id(&player.id);
        player.connection_id = Some(handler.connection_id());
        let welcome = ServerMessage::Welcome {
            player_id: player.id.clone(),
            username: player.username.clone(),
        };
        registry.insert_player(player, Some(Arc::clone(handler)));
        handler.send(&welcome);
    }

    /// Adds an authenticated player to the lobby, served by `handler`
    pub fn register_player(&self, player: Player, handler: Option<Arc<ClientHandler>>) {
        let mut registry = self.lock_registry();
        match handler {
            Some(handler) => self.attach(&mut registry, player, &handler),
            None => registry.insert_player(player, None),
        }
    }

    fn quit(&self, handler: &Arc<ClientHandler>) {
        if let Some(player_id) = handler.client_id() {
            let owns_player = self
                .lock_registry()
                .handler(&player_id)
                .map_or(false, |current| Arc::ptr_eq(&current, handler));
            if owns_player {
                self.purge_player(&player_id);
            }
        }
        handler.stop();
    }

    /// Removes a player from every registry, forfeiting any game in progress
    pub fn purge_player(&self, player_id: &str) -> bool {
        let (snapshot, game_state, handler) = {
            let mut registry = self.lock_registry();
            if !registry.contains(player_id) {
                return false;
            }

            self.matchmaking.remove(player_id);
            let game_state = registry.session_of(player_id).cloned().and_then(|session_id| {
                self.finish_session(
                    &mut registry,
                    &session_id,
                    GameResult::Forfeit(player_id.to_string()),
                )
            });
            let Some((player, handler)) = registry.remove_player(player_id) else {
                return false;
            };
            (player.snapshot(), game_state, handler)
        };

        self.lock_health().forget(player_id);
        if let Some(handler) = handler {
            handler.stop();
        }
        self.save_player(&snapshot);
        if let Some(state) = game_state {
            self.save_game_state(&state);
        }
        info!("Purged player {}", player_id);
        true
    }

    /// Purges every player whose reconnect window has run out
    pub fn sweep_expired(&self) -> Vec<PlayerId> {
        let expired = self
            .lock_registry()
            .expired_players(self.config.reconnect_window);
        for player_id in &expired {
            info!("Reconnect window for {} expired", player_id);
            self.purge_player(player_id);
        }
        expired
    }

    pub fn send_invite(&self, sender: &str, recipient: &str, game_type: GameType) -> Option<InviteRequest> {
        let mut registry = self.lock_registry();
        let request = registry.add_invite(sender, recipient, game_type)?;

        let sender_username = registry.player(sender)?.username.clone();
        if let Some(handler) = registry.handler(recipient) {
            handler.send(&ServerMessage::Invite {
                sender_id: sender.to_string(),
                sender_username,
                game_type,
            });
        }
        info!("{} invited {} to {}", sender, recipient, game_type);
        Some(request)
    }

    /// Resolves the newest pending invite from `sender` to `recipient`
    ///
    /// Accepting starts the match straight away; of two racing calls only
    /// one finds the request still pending.
    pub fn handle_invite(
        &self,
        sender: &str,
        recipient: &str,
        status: RequestStatus,
    ) -> Option<InviteRequest> {
        let mut registry = self.lock_registry();
        let request = registry.resolve_invite(sender, recipient, status)?;

        match request.status {
            RequestStatus::Accepted => {
                if self
                    .match_locked(&mut registry, sender, recipient, request.game_type)
                    .is_none()
                {
                    if let Some(handler) = registry.handler(recipient) {
                        handler.send(&error("Player is not available"));
                    }
                }
            }
            RequestStatus::Rejected => {
                if let Some(handler) = registry.handler(sender) {
                    handler.send(&ServerMessage::InviteDeclined {
                        recipient_id: recipient.to_string(),
                    });
                }
            }
            RequestStatus::Pending => {}
        }
        Some(request)
    }

    pub fn send_friend_request(&self, sender: &str, recipient: &str) -> Option<FriendRequest> {
        let mut registry = self.lock_registry();
        let request = registry.add_friend_request(sender, recipient)?;

        let sender_username = registry.player(sender)?.username.clone();
        if let Some(handler) = registry.handler(recipient) {
            handler.send(&ServerMessage::FriendRequest {
                sender_id: sender.to_string(),
                sender_username,
            });
        }
        Some(request)
    }

    pub fn accept_friend_request(&self, sender: &str, recipient: &str) -> Option<FriendRequest> {
        let (request, snapshots) = {
            let mut registry = self.lock_registry();
            let request = registry.resolve_friend_request(sender, recipient, true)?;

            let mut snapshots = Vec::new();
            for (me, friend) in [(sender, recipient), (recipient, sender)] {
                let Some(friend) = registry.player(friend) else {
                    continue;
                };
                if let Some(handler) = registry.handler(me) {
                    handler.send(&ServerMessage::FriendAdded {
                        friend_id: friend.id.clone(),
                        friend_username: friend.username.clone(),
                    });
                }
                snapshots.push(friend.snapshot());
            }
            (request, snapshots)
        };

        for snapshot in &snapshots {
            self.save_player(snapshot);
        }
        Some(request)
    }

    pub fn decline_friend_request(&self, sender: &str, recipient: &str) -> Option<FriendRequest> {
        let mut registry = self.lock_registry();
        let request = registry.resolve_friend_request(sender, recipient, false)?;

        if let Some(handler) = registry.handler(sender) {
            handler.send(&ServerMessage::FriendDeclined {
                recipient_id: recipient.to_string(),
            });
        }
        Some(request)
    }

    /// Newest request of either kind from `sender` to `recipient`
    pub fn latest_request(&self, sender: &str, recipient: &str) -> Option<PendingRequest> {
        self.lock_registry().latest_request(sender, recipient).cloned()
    }

    /// Builds the session variant for `game_type` with both seats bound
    pub fn create_game_session(&self, game_type: GameType, player1: &str, player2: &str) -> GameSession {
        let session_id = format!("s{}", self.next_session_id.fetch_add(1, Ordering::SeqCst));
        let mut session = GameSession::new(game_type, session_id);
        session.add_players(player1, player2);

        if let Some(timeout) = self.config.turn_timeout {
            let server = self.self_ref.clone();
            let on_expire: TurnExpiry = Arc::new(move |session_id, player_id| {
                if let Some(server) = server.upgrade() {
                    server.expire_turn(&session_id, &player_id);
                }
            });
            session.set_turn_clock(TurnClock::new(timeout, on_expire));
        }
        session
    }

    /// Atomically claims both players from the lobby and starts their session
    pub fn match_players(&self, player1: &str, player2: &str, game_type: GameType) -> Option<SessionId> {
        let mut registry = self.lock_registry();
        self.match_locked(&mut registry, player1, player2, game_type)
    }

    fn match_locked(
        &self,
        registry: &mut PlayerRegistry,
        player1: &str,
        player2: &str,
        game_type: GameType,
    ) -> Option<SessionId> {
        if !registry.take_from_lobby(player1, player2) {
            debug!("Cannot match {} with {}", player1, player2);
            return None;
        }
        self.matchmaking.remove(player1);
        self.matchmaking.remove(player2);

        let mut session = self.create_game_session(game_type, player1, player2);
        let session_id = session.session_id().to_string();

        let handler1 = registry.handler(player1);
        let handler2 = registry.handler(player2);
        for (handler, opponent) in [(&handler1, player2), (&handler2, player1)] {
            if let (Some(handler), Some(opponent)) = (handler, registry.player(opponent)) {
                self.matchmaking
                    .notify_match_found(handler, opponent, &session_id, game_type);
            }
        }

        session.start(handler1, handler2);
        registry.insert_session(session);
        info!("Matched {} and {} in {} ({})", player1, player2, session_id, game_type);
        Some(session_id)
    }

    /// Queues a LOBBY player and pairs whoever is now compatible
    pub fn join_random_matchmaking(&self, player_id: &str, game_type: GameType) -> bool {
        let mut registry = self.lock_registry();
        let handler = registry.handler(player_id);
        let Some(player) = registry.player_mut(player_id) else {
            return false;
        };
        if !self
            .matchmaking
            .join_random_queue(player, handler.as_deref(), game_type)
        {
            return false;
        }

        for pairing in self.matchmaking.process_immediate_match() {
            if self
                .match_locked(&mut registry, &pairing.first, &pairing.second, pairing.game_type)
                .is_some()
            {
                continue;
            }
            warn!("Pairing {} / {} failed, requeueing", pairing.first, pairing.second);
            for id in [&pairing.first, &pairing.second] {
                if registry.player(id).map(|p| p.state) == Some(PlayerState::Matchmaking) {
                    self.matchmaking.restore(&pairing, id);
                }
            }
        }
        true
    }

    pub fn leave_matchmaking(&self, player_id: &str) -> bool {
        let mut registry = self.lock_registry();
        let handler = registry.handler(player_id);
        match registry.player_mut(player_id) {
            Some(player) if player.state == PlayerState::Matchmaking => {
                self.matchmaking.leave_queue(player, handler.as_deref())
            }
            _ => false,
        }
    }

    /// Relays a move for whoever is on turn in the player's session
    pub fn submit_move(&self, player_id: &str, move_data: &str) -> bool {
        let state = {
            let mut registry = self.lock_registry();
            let Some(session_id) = registry.session_of(player_id).cloned() else {
                return false;
            };
            let Some(session) = registry.session_mut(&session_id) else {
                return false;
            };
            if !session.update_move(player_id, move_data) {
                return false;
            }

            match session.outcome().cloned() {
                Some(result) => self.finish_session(&mut registry, &session_id, result),
                None => session.snapshot(unix_time()),
            }
        };

        if let Some(state) = state {
            self.save_game_state(&state);
        }
        true
    }

    pub fn resign(&self, player_id: &str) -> bool {
        self.forfeit_session(player_id, None)
    }

    /// Turn clock callback; forfeits only if the same player is still on turn
    pub fn expire_turn(&self, session_id: &str, player_id: &str) -> bool {
        let current = {
            let registry = self.lock_registry();
            registry
                .session(session_id)
                .filter(|s| s.is_active() && s.outcome().is_none())
                .and_then(|s| s.current_player().cloned())
        };
        if current.as_deref() != Some(player_id) {
            return false;
        }
        info!("Turn clock expired for {} in {}", player_id, session_id);
        self.forfeit_session(player_id, Some(session_id))
    }

    fn forfeit_session(&self, player_id: &str, expected_session: Option<&str>) -> bool {
        let state = {
            let mut registry = self.lock_registry();
            let Some(session_id) = registry.session_of(player_id).cloned() else {
                return false;
            };
            if expected_session.map_or(false, |expected| expected != session_id) {
                return false;
            }
            let Some(session) = registry.session_mut(&session_id) else {
                return false;
            };
            if !session.forfeit(player_id) {
                return false;
            }
            self.finish_session(
                &mut registry,
                &session_id,
                GameResult::Forfeit(player_id.to_string()),
            )
        };

        if let Some(state) = state {
            self.save_game_state(&state);
        }
        true
    }

    /// Ends a session without a winner and returns both players to the lobby
    pub fn end_session(&self, session_id: &str) -> bool {
        let state = {
            let mut registry = self.lock_registry();
            if registry.session(session_id).is_none() {
                return false;
            }
            self.finish_session(&mut registry, session_id, GameResult::Abandoned)
        };
        if let Some(state) = state {
            self.save_game_state(&state);
        }
        true
    }

    /// Tears a session down: GAME_OVER to both seats, players back to LOBBY
    fn finish_session(
        &self,
        registry: &mut PlayerRegistry,
        session_id: &str,
        result: GameResult,
    ) -> Option<GameStateSnapshot> {
        let mut session = registry.remove_session(session_id)?;
        session.broadcast(&ServerMessage::GameOver {
            session_id: session_id.to_string(),
            result: result.clone(),
        });

        let mut snapshot = session.snapshot(unix_time());
        if let Some(snapshot) = snapshot.as_mut() {
            snapshot.result = Some(result.clone());
        }

        let players = session.players();
        session.end_game();
        for player_id in &players {
            registry.return_to_lobby(player_id);
        }
        info!("Session {} over: {}", session_id, result);
        snapshot
    }

    /// Stores the chat in the pair's history and forwards it to `recipient`
    pub fn send_chat(&self, sender: &str, recipient: &str, message: &str) -> bool {
        let mut registry = self.lock_registry();
        if sender == recipient {
            return false;
        }
        let (Some(from), Some(to)) = (registry.player(sender), registry.player(recipient)) else {
            return false;
        };

        let chat = Chat::new(Some(message), &from.username, &to.username);
        if let Some(handler) = registry.handler(recipient) {
            handler.send(&ServerMessage::Chat {
                sender_username: chat.sender.clone(),
                content: chat.message.clone(),
            });
        }
        registry.chat_mut(sender, recipient).add_chat(chat);
        true
    }

    pub fn chat_history(&self, player_id: &str, other: &str) -> Option<String> {
        let registry = self.lock_registry();
        if !registry.contains(player_id) || !registry.contains(other) {
            return None;
        }
        Some(
            registry
                .chat(player_id, other)
                .map(|chat| chat.get_formatted_history())
                .unwrap_or_else(|| "Chat History:\n".to_string()),
        )
    }

    /// History between two players as single lines, oldest first
    pub fn chat_lines(&self, player_id: &str, other: &str) -> Option<Vec<String>> {
        let registry = self.lock_registry();
        if !registry.contains(player_id) || !registry.contains(other) {
            return None;
        }
        Some(
            registry
                .chat(player_id, other)
                .map(|chat| chat.history().map(Chat::format_line).collect())
                .unwrap_or_default(),
        )
    }

    /// Records a client-reported sample and answers with the health line
    pub fn record_ping(&self, handler: &ClientHandler, latency_ms: u64, packet_loss: f64) -> String {
        let mut health = self.lock_health();
        if let Some(player_id) = handler.client_id() {
            health.record_latency(&player_id, latency_ms);
            health.record_packet_loss(&player_id, packet_loss);
        }
        handler.monitor_connection_health(&health)
    }

    pub fn check_connection_health(&self, player_id: &str) -> &'static str {
        self.lock_health().check_connection_health(player_id)
    }

    pub fn player(&self, player_id: &str) -> Option<Player> {
        self.lock_registry().player(player_id).cloned()
    }

    pub fn handler(&self, player_id: &str) -> Option<Arc<ClientHandler>> {
        self.lock_registry().handler(player_id)
    }

    pub fn in_lobby(&self, player_id: &str) -> bool {
        self.lock_registry().in_lobby(player_id)
    }

    pub fn session_of(&self, player_id: &str) -> Option<SessionId> {
        self.lock_registry().session_of(player_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.lock_registry().session_count()
    }

    /// Runs `f` against a live session
    pub fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&GameSession) -> R) -> Option<R> {
        self.lock_registry().session(session_id).map(f)
    }

    fn save_player(&self, snapshot: &PlayerSnapshot) {
        if let Err(e) = self.storage.save_player(snapshot) {
            error!("Failed to save player {}: {}", snapshot.id, e);
        }
    }

    fn save_game_state(&self, state: &GameStateSnapshot) {
        if let Err(e) = self.storage.save_game_state(state) {
            error!("Failed to save game state {}: {}", state.session_id, e);
        }
    }
}

fn error(reason: &str) -> ServerMessage {
    ServerMessage::Error {
        reason: reason.to_string(),
    }
}

async fn reject_connection(mut stream: TcpStream) {
    let line = format!("{}\n", error(SERVER_FULL));
    if let Err(e) = stream.write_all(line.as_bytes()).await {
        debug!("Failed to notify rejected client: {}", e);
    }
    let _ = stream.shutdown().await;
}
