//! Channote Core Library
//!
//! State container, persistence, and id generation for the Channote
//! channel chat and notes workspace.

pub mod autosave;
pub mod config;
pub mod error;
pub mod ids;
pub mod invariants;
pub mod migrate;
pub mod models;
pub mod storage;
pub mod store;

pub use autosave::{format_last_saved, Autosave, AutosaveHandle, SaveStatus, SharedStore};
pub use config::StoreConfig;
pub use error::{Error, Result, StorageError, ValidationError};
pub use models::*;
pub use storage::{MemoryStorage, Persistence, SqliteStorage, StateStorage};
pub use store::{Store, SubscriptionId};
