//! # Game Client Library
//!
//! A line-oriented terminal client for the game server. It connects over TCP,
//! forwards what the user types and prints what the server sends back.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Turns slash shortcuts such as `/queue checkers` or `/move 2,1-3,2` into
//! protocol commands; raw protocol lines pass through unchanged.
//!
//! ### Network Module (`network`)
//! Owns the connection: a select loop over stdin and the server stream, plus
//! a small renderer that makes match and move notifications readable.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("127.0.0.1:8080").await?;
//!     client.run().await
//! }
//! ```

pub mod input;
pub mod network;
