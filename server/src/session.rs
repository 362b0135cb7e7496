//! Turn-based game sessions
//!
//! A session seats two players, relays their moves and keeps track of whose
//! turn it is. Legality and outcome detection belong to the `RuleEngine`
//! each session variant owns; the session only enforces turn ownership.
//!
//! `GameSession` is a tagged union over the three variants, all of which are
//! the same `TurnCoordinator` parameterised by a different engine.

use crate::client_handler::ClientHandler;
use crate::rules::{Checkers, Connect4, Outcome, RuleEngine, Seat, TicTacToe};
use crate::storage::GameStateSnapshot;
use log::{debug, info};
use shared::{GameResult, GameType, PlayerId, ServerMessage, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Invoked with `(session_id, player_on_turn)` when a turn clock runs out
pub type TurnExpiry = Arc<dyn Fn(SessionId, PlayerId) + Send + Sync>;

/// Cancellable per-turn timer tied to one session
pub struct TurnClock {
    timeout: Duration,
    on_expire: TurnExpiry,
    task: Option<JoinHandle<()>>,
}

impl TurnClock {
    pub fn new(timeout: Duration, on_expire: TurnExpiry) -> Self {
        Self {
            timeout,
            on_expire,
            task: None,
        }
    }

    /// Restarts the clock for `player_id`; needs a running tokio runtime
    fn arm(&mut self, session_id: &str, player_id: &str) {
        self.cancel();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, turn clock for {} not armed", session_id);
            return;
        };

        let timeout = self.timeout;
        let on_expire = Arc::clone(&self.on_expire);
        let session_id = session_id.to_string();
        let player_id = player_id.to_string();
        self.task = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            on_expire(session_id, player_id);
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }
}

impl Drop for TurnClock {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Seating, turn and relay state shared by every session variant
pub struct SessionCore {
    pub session_id: SessionId,
    pub game_type: GameType,
    player1: Option<PlayerId>,
    player2: Option<PlayerId>,
    handler1: Option<Arc<ClientHandler>>,
    handler2: Option<Arc<ClientHandler>>,
    current_player: Option<PlayerId>,
    active: bool,
    moves: Vec<(PlayerId, String)>,
    result: Option<GameResult>,
    clock: Option<TurnClock>,
}

impl SessionCore {
    fn new(session_id: SessionId, game_type: GameType) -> Self {
        Self {
            session_id,
            game_type,
            player1: None,
            player2: None,
            handler1: None,
            handler2: None,
            current_player: None,
            active: false,
            moves: Vec::new(),
            result: None,
            clock: None,
        }
    }

    fn seat_of(&self, player_id: &str) -> Option<Seat> {
        if self.player1.as_deref() == Some(player_id) {
            Some(Seat::First)
        } else if self.player2.as_deref() == Some(player_id) {
            Some(Seat::Second)
        } else {
            None
        }
    }

    fn player_at(&self, seat: Seat) -> Option<&PlayerId> {
        match seat {
            Seat::First => self.player1.as_ref(),
            Seat::Second => self.player2.as_ref(),
        }
    }

    fn send_to(&self, seat: Seat, message: &ServerMessage) {
        let handler = match seat {
            Seat::First => &self.handler1,
            Seat::Second => &self.handler2,
        };
        if let Some(handler) = handler {
            handler.send(message);
        }
    }

    fn broadcast(&self, message: &ServerMessage) {
        self.send_to(Seat::First, message);
        self.send_to(Seat::Second, message);
    }

    fn arm_clock(&mut self) {
        let (Some(clock), Some(current)) = (self.clock.as_mut(), self.current_player.as_ref()) else {
            return;
        };
        clock.arm(&self.session_id, current);
    }

    fn cancel_clock(&mut self) {
        if let Some(clock) = self.clock.as_mut() {
            clock.cancel();
        }
    }

    fn detach(&mut self) {
        self.cancel_clock();
        self.player1 = None;
        self.player2 = None;
        self.handler1 = None;
        self.handler2 = None;
        self.current_player = None;
    }
}

/// The common turn-session capability
pub trait TurnSession {
    fn core(&self) -> &SessionCore;
    fn core_mut(&mut self) -> &mut SessionCore;

    fn add_players(&mut self, player1: &str, player2: &str);
    fn remove_players(&mut self);
    fn start(&mut self, handler1: Option<Arc<ClientHandler>>, handler2: Option<Arc<ClientHandler>>);
    fn update_move(&mut self, player_id: &str, move_data: &str) -> bool;
    fn forfeit(&mut self, player_id: &str) -> bool;
    fn end_game(&mut self);
    fn board(&self) -> String;
}

pub struct TurnCoordinator<E: RuleEngine> {
    core: SessionCore,
    engine: E,
}

pub type TicTacToeSession = TurnCoordinator<TicTacToe>;
pub type Connect4Session = TurnCoordinator<Connect4>;
pub type CheckersSession = TurnCoordinator<Checkers>;

impl<E: RuleEngine> TurnCoordinator<E> {
    pub fn new(session_id: SessionId, game_type: GameType, engine: E) -> Self {
        Self {
            core: SessionCore::new(session_id, game_type),
            engine,
        }
    }
}

impl<E: RuleEngine> TurnSession for TurnCoordinator<E> {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SessionCore {
        &mut self.core
    }

    fn add_players(&mut self, player1: &str, player2: &str) {
        self.core.player1 = Some(player1.to_string());
        self.core.player2 = Some(player2.to_string());
    }

    fn remove_players(&mut self) {
        debug!("Detaching players from session {}", self.core.session_id);
        self.core.detach();
    }

    fn start(&mut self, handler1: Option<Arc<ClientHandler>>, handler2: Option<Arc<ClientHandler>>) {
        self.core.handler1 = handler1;
        self.core.handler2 = handler2;

        let first = self.engine.start_new_game();
        self.core.current_player = self.core.player_at(first).cloned();
        self.core.active = self.core.current_player.is_some();
        if !self.core.active {
            return;
        }

        self.core.send_to(first, &ServerMessage::YourTurn);
        self.core.send_to(first.other(), &ServerMessage::OpponentsTurn);
        self.core.arm_clock();
        info!(
            "Session {} ({}) started, {} moves first",
            self.core.session_id,
            self.core.game_type,
            self.core.current_player.as_deref().unwrap_or_default()
        );
    }

    fn update_move(&mut self, player_id: &str, move_data: &str) -> bool {
        if !self.core.active || self.core.result.is_some() {
            return false;
        }
        let Some(seat) = self.core.seat_of(player_id) else {
            return false;
        };
        if self.core.current_player.as_deref() != Some(player_id) {
            debug!("Out-of-turn move from {} in {}", player_id, self.core.session_id);
            return false;
        }

        if let Err(e) = self.engine.apply_move(seat, move_data) {
            self.core.send_to(
                seat,
                &ServerMessage::InvalidMove {
                    reason: e.to_string(),
                },
            );
            return false;
        }

        self.core.moves.push((player_id.to_string(), move_data.to_string()));
        self.core.broadcast(&ServerMessage::Move {
            player_id: player_id.to_string(),
            data: move_data.to_string(),
        });

        match self.engine.check_winner() {
            Outcome::InProgress => {
                let next = seat.other();
                self.core.current_player = self.core.player_at(next).cloned();
                self.core.send_to(next, &ServerMessage::NowYourTurn);
                self.core.send_to(seat, &ServerMessage::OpponentsTurn);
                self.core.arm_clock();
            }
            Outcome::Won(winner) => {
                self.core.result = self.core.player_at(winner).cloned().map(GameResult::Winner);
                self.core.cancel_clock();
            }
            Outcome::Draw => {
                self.core.result = Some(GameResult::Draw);
                self.core.cancel_clock();
            }
        }
        true
    }

    fn forfeit(&mut self, player_id: &str) -> bool {
        if !self.core.active || self.core.result.is_some() || self.core.seat_of(player_id).is_none() {
            return false;
        }
        self.core.result = Some(GameResult::Forfeit(player_id.to_string()));
        self.core.cancel_clock();
        true
    }

    fn end_game(&mut self) {
        if !self.core.active && self.core.player1.is_none() && self.core.player2.is_none() {
            return;
        }
        self.core.active = false;
        self.core.detach();
        info!("Session {} ended", self.core.session_id);
    }

    fn board(&self) -> String {
        self.engine.board()
    }
}

pub enum GameSession {
    TicTacToe(TicTacToeSession),
    Connect4(Connect4Session),
    Checkers(CheckersSession),
}

impl GameSession {
    /// Builds the session variant for `game_type` with a fresh rule engine
    pub fn new(game_type: GameType, session_id: SessionId) -> Self {
        match game_type {
            GameType::TicTacToe => {
                GameSession::TicTacToe(TurnCoordinator::new(session_id, game_type, TicTacToe::new()))
            }
            GameType::Connect4 => {
                GameSession::Connect4(TurnCoordinator::new(session_id, game_type, Connect4::new()))
            }
            GameType::Checkers => {
                GameSession::Checkers(TurnCoordinator::new(session_id, game_type, Checkers::new()))
            }
        }
    }

    fn turn(&self) -> &dyn TurnSession {
        match self {
            GameSession::TicTacToe(s) => s,
            GameSession::Connect4(s) => s,
            GameSession::Checkers(s) => s,
        }
    }

    fn turn_mut(&mut self) -> &mut dyn TurnSession {
        match self {
            GameSession::TicTacToe(s) => s,
            GameSession::Connect4(s) => s,
            GameSession::Checkers(s) => s,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.turn().core().session_id
    }

    pub fn game_type(&self) -> GameType {
        self.turn().core().game_type
    }

    pub fn player1(&self) -> Option<&PlayerId> {
        self.turn().core().player1.as_ref()
    }

    pub fn player2(&self) -> Option<&PlayerId> {
        self.turn().core().player2.as_ref()
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.player1().into_iter().chain(self.player2()).cloned().collect()
    }

    pub fn opponent_of(&self, player_id: &str) -> Option<&PlayerId> {
        let core = self.turn().core();
        core.seat_of(player_id).and_then(|seat| core.player_at(seat.other()))
    }

    pub fn current_player(&self) -> Option<&PlayerId> {
        self.turn().core().current_player.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.turn().core().active
    }

    /// Terminal result once the engine, a forfeit or a timeout decided the game
    pub fn outcome(&self) -> Option<&GameResult> {
        self.turn().core().result.as_ref()
    }

    pub fn move_count(&self) -> usize {
        self.turn().core().moves.len()
    }

    pub fn set_turn_clock(&mut self, clock: TurnClock) {
        self.turn_mut().core_mut().clock = Some(clock);
    }

    pub fn turn_clock_armed(&self) -> bool {
        self.turn().core().clock.as_ref().map_or(false, TurnClock::is_armed)
    }

    pub fn add_players(&mut self, player1: &str, player2: &str) {
        self.turn_mut().add_players(player1, player2);
    }

    pub fn remove_players(&mut self) {
        self.turn_mut().remove_players();
    }

    pub fn start(&mut self, handler1: Option<Arc<ClientHandler>>, handler2: Option<Arc<ClientHandler>>) {
        self.turn_mut().start(handler1, handler2);
    }

    pub fn update_move(&mut self, player_id: &str, move_data: &str) -> bool {
        self.turn_mut().update_move(player_id, move_data)
    }

    pub fn forfeit(&mut self, player_id: &str) -> bool {
        self.turn_mut().forfeit(player_id)
    }

    /// Sends `message` to both seated players
    pub fn broadcast(&self, message: &ServerMessage) {
        self.turn().core().broadcast(message);
    }

    pub fn end_game(&mut self) {
        self.turn_mut().end_game();
    }

    pub fn snapshot(&self, saved_at: u64) -> Option<GameStateSnapshot> {
        let core = self.turn().core();
        Some(GameStateSnapshot {
            session_id: core.session_id.clone(),
            game_type: core.game_type,
            player1: core.player1.clone()?,
            player2: core.player2.clone()?,
            board: self.turn().board(),
            moves: core.moves.clone(),
            result: core.result.clone(),
            saved_at,
        })
    }
}
