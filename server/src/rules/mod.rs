//! Rule-engine interface consumed by game sessions
//!
//! A session only enforces turn ownership and relays moves. Whether a move
//! is legal and whether the game is over is decided by the engine for the
//! session's game type.

mod checkers;
mod connect4;
mod tictactoe;

pub use checkers::Checkers;
pub use connect4::Connect4;
pub use tictactoe::TicTacToe;

use thiserror::Error;

/// The two seats at a table; player1 always sits in `First`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    pub fn other(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    fn symbol(self) -> char {
        match self {
            Seat::First => 'X',
            Seat::Second => 'O',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Won(Seat),
    Draw,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("malformed move `{0}`")]
    Malformed(String),
    #[error("position is off the board")]
    OutOfBounds,
    #[error("position is already taken")]
    Occupied,
    #[error("column is full")]
    ColumnFull,
    #[error("illegal move: {0}")]
    Illegal(&'static str),
    #[error("game is already over")]
    GameOver,
}

pub trait RuleEngine: Send {
    /// Resets the board and returns the seat that moves first
    fn start_new_game(&mut self) -> Seat;

    fn apply_move(&mut self, seat: Seat, move_data: &str) -> Result<(), MoveError>;

    fn check_winner(&self) -> Outcome;

    /// Compact text rendering of the board, used for snapshots
    fn board(&self) -> String;
}

/// Parses `"a,b"` into two indices
fn parse_pair(text: &str) -> Result<(usize, usize), MoveError> {
    let malformed = || MoveError::Malformed(text.to_string());
    let (a, b) = text.split_once(',').ok_or_else(malformed)?;
    let a = a.trim().parse().map_err(|_| malformed())?;
    let b = b.trim().parse().map_err(|_| malformed())?;
    Ok((a, b))
}
