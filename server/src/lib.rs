//! # Game Server Library
//!
//! This library provides the server side of a turn-based multiplayer game
//! service. Clients connect over TCP, log in, and are paired into two-player
//! sessions either by a direct invite or through a random matchmaking queue.
//! The server relays moves between the two seats, enforces turn ownership and
//! asks a per-game rule engine whether a move is legal and whether the game
//! is over.
//!
//! ## Core Responsibilities
//!
//! ### Presence
//! Tracks every logged-in player and the connection currently serving them.
//! Players move through `LOBBY → MATCHMAKING → IN_GAME` and back to `LOBBY`
//! when their session ends. A dropped connection does not remove the player:
//! logging in again within the reconnect window picks up the same handler,
//! including any messages that were sent in the meantime.
//!
//! ### Matching
//! Random matchmaking keeps one FIFO queue per game type and always pairs the
//! longest-waiting compatible players. Invites go straight to the recipient;
//! accepting one starts the match immediately. Either way a player can be
//! claimed by at most one session at a time.
//!
//! ### Sessions
//! A session seats two players, prompts whoever is on turn, relays each
//! accepted move to both seats and ends with a `GAME_OVER` line once the rule
//! engine reports a result, a player resigns, or an optional turn clock runs
//! out.
//!
//! ## Module Organization
//!
//! - `network`: `GameServer`, the accept loop and every server operation
//! - `client_handler`: per-connection worker and connection state machine
//! - `registry`: players, lobby, handlers, sessions, requests and chats
//! - `matchmaking`: per-game-type queues
//! - `session`: turn coordinator over a rule engine
//! - `rules`: tic-tac-toe, connect-four and checkers engines
//! - `social`: friend requests and invites
//! - `player`, `chat`, `health`: player records, chat history, connection health
//! - `storage`, `auth`: persistence and identity interfaces with in-memory defaults
//! - `config`, `error`: runtime settings and error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::GameServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default().with_bind_addr("0.0.0.0:8080");
//!     let server = GameServer::with_config(config);
//!
//!     // Accepts connections until `server.stop()` is called
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod chat;
pub mod client_handler;
pub mod config;
pub mod error;
pub mod health;
pub mod matchmaking;
pub mod network;
pub mod player;
pub mod registry;
pub mod rules;
pub mod session;
pub mod social;
pub mod storage;
