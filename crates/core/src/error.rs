//! Error types for Channote Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Rejected user input. Raised before any state change happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("channel name must not be empty")]
    EmptyName,

    #[error("channel name is {len} characters, the limit is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("channel name contains disallowed character {0:?}")]
    InvalidCharacter(char),

    #[error("message content must not be empty")]
    EmptyMessage,

    #[error("user name must not be empty")]
    EmptyUser,
}

/// Failures of a durable storage backend.
///
/// These never reach callers of the store: the persistence adapter logs
/// them and carries on.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine application data directory")]
    NoDataDir,
}

pub type Result<T> = std::result::Result<T, Error>;
