//! Error types for the game server
//!
//! Most failures inside the core are state violations or registry misses and
//! are reported as `false`/`None` by the operation itself. The enums here
//! cover the few places where a caller needs to know *why* something failed:
//! transport setup, persistence and authentication.

use std::io::Error as IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Server is already running")]
    AlreadyRunning,
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to encode snapshot for {0}: {1}")]
    Encode(String, bincode::Error),

    #[error("Failed to decode snapshot for {0}: {1}")]
    Decode(String, bincode::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Authentication failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unknown user {0}")]
    UnknownUser(String),

    #[error("Wrong password for {0}")]
    BadPassword(String),

    #[error("Username {0} is already taken")]
    UsernameTaken(String),

    #[error("Invalid username {0:?}")]
    InvalidUsername(String),
}
