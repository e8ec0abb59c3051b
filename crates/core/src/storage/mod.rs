//! Persistence for the application state
//!
//! The whole [`AppState`] is stored as one JSON document under a single key
//! of a [`StateStorage`] slot. Persistence is a best-effort cache: reads fall
//! back to the default state and write failures are logged, never returned.

mod memory;
mod migrations;
mod sqlite;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{StoreConfig, DEFAULT_STORAGE_KEY};
use crate::error::StorageError;
use crate::migrate::{migrate_json, PersistedState};
use crate::models::{self, AppState, DEFAULT_USER};

pub use memory::MemoryStorage;
pub use migrations::{run_migrations, Migration};
pub use sqlite::SqliteStorage;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A durable key-value slot holding serialized documents
pub trait StateStorage: Send {
    /// Stored document for `key`, `None` if never written
    fn load(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `blob` under `key`, replacing any previous value
    fn save(&self, key: &str, blob: &str) -> StorageResult<()>;

    /// Remove the document for `key`
    fn clear(&self, key: &str) -> StorageResult<()>;
}

/// Extension trait for converting rusqlite Results to Option
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Reads and writes the state document.
///
/// Without a backend (no durable storage available) every read yields the
/// default state and every write is skipped.
pub struct Persistence {
    backend: Option<Box<dyn StateStorage>>,
    key: String,
    default_user: String,
}

impl Persistence {
    pub fn new(backend: impl StateStorage + 'static) -> Self {
        Self {
            backend: Some(Box::new(backend)),
            key: DEFAULT_STORAGE_KEY.to_string(),
            default_user: DEFAULT_USER.to_string(),
        }
    }

    /// Persistence for contexts with no durable storage
    pub fn unavailable() -> Self {
        Self {
            backend: None,
            key: DEFAULT_STORAGE_KEY.to_string(),
            default_user: DEFAULT_USER.to_string(),
        }
    }

    /// Open the SQLite slot named by the config. If the database cannot be
    /// opened the session continues without durable storage.
    #[instrument(skip(config))]
    pub fn from_config(config: &StoreConfig) -> Self {
        let opened = config
            .database_path()
            .and_then(|path| SqliteStorage::open(&path).map(|s| (path, s)));

        let persistence = match opened {
            Ok((path, storage)) => {
                info!(path = %path.display(), "Opened state database");
                Self::new(storage)
            }
            Err(e) => {
                warn!(error = %e, "State database unavailable, changes will not be saved");
                Self::unavailable()
            }
        };

        persistence
            .with_key(&config.storage_key)
            .with_default_user(&config.default_user)
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn with_default_user(mut self, user: &str) -> Self {
        self.default_user = user.to_string();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// A first-run state using the configured default user
    pub fn default_state(&self) -> AppState {
        AppState::new_default(&self.default_user, models::now())
    }

    /// Load and migrate the stored state, or the default state when there
    /// is nothing usable to load.
    pub fn read(&self) -> AppState {
        let Some(backend) = &self.backend else {
            debug!("No durable storage, starting from defaults");
            return self.default_state();
        };

        let blob = match backend.load(&self.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!(key = %self.key, "Nothing stored yet, starting from defaults");
                return self.default_state();
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read stored state");
                return self.default_state();
            }
        };

        match migrate_json(&blob, &self.default_user) {
            Ok(state) => state,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored state is unreadable, starting from defaults");
                self.default_state()
            }
        }
    }

    /// Store the full state, replacing the previous document. Failures are
    /// logged and dropped.
    pub fn write(&self, state: &AppState) {
        let Some(backend) = &self.backend else {
            return;
        };

        let blob = match serde_json::to_string(&PersistedState::new(state)) {
            Ok(blob) => blob,
            Err(e) => {
                error!(error = %e, "Failed to serialize state");
                return;
            }
        };

        if let Err(e) = backend.save(&self.key, &blob) {
            error!(key = %self.key, error = %e, "Failed to write state");
        }
    }

    /// Drop the stored document
    pub fn clear(&self) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.clear(&self.key) {
                error!(key = %self.key, error = %e, "Failed to clear stored state");
            }
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("available", &self.is_available())
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;

    /// Slot whose writes always fail
    struct FullDisk;

    impl StateStorage for FullDisk {
        fn load(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Io(std::io::Error::other("disk unreadable")))
        }

        fn save(&self, _key: &str, _blob: &str) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::other("quota exceeded")))
        }

        fn clear(&self, _key: &str) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::other("read-only")))
        }
    }

    fn sample_state() -> AppState {
        let mut state = AppState::new_default("ada", models::now());
        state.dark_mode = true;
        state.notes.push(Note::new(
            "note-1".into(),
            "random".into(),
            Some("Plans"),
            models::now(),
        ));
        state.active_note_id = Some("note-1".into());
        state
    }

    #[test]
    fn test_read_empty_slot_gives_defaults() {
        let persistence = Persistence::new(MemoryStorage::new()).with_default_user("ada");
        let state = persistence.read();

        assert_eq!(state.active_channel_id.as_deref(), Some("general"));
        assert_eq!(state.current_user, "ada");
    }

    #[test]
    fn test_round_trip() {
        let persistence = Persistence::new(MemoryStorage::new());
        let state = sample_state();

        persistence.write(&state);
        assert_eq!(persistence.read(), state);
    }

    #[test]
    fn test_round_trip_sqlite() {
        let persistence = Persistence::new(SqliteStorage::open_in_memory().unwrap());
        let state = sample_state();

        persistence.write(&state);
        assert_eq!(persistence.read(), state);
    }

    #[test]
    fn test_write_uses_key_and_version() {
        let slot = MemoryStorage::new();
        let persistence = Persistence::new(slot.clone()).with_key("custom");
        persistence.write(&sample_state());

        assert!(slot.get(DEFAULT_STORAGE_KEY).is_none());
        let value: serde_json::Value = serde_json::from_str(&slot.get("custom").unwrap()).unwrap();
        assert_eq!(value["schemaVersion"], crate::migrate::SCHEMA_VERSION);
    }

    #[test]
    fn test_corrupt_blob_gives_defaults() {
        let slot = MemoryStorage::new();
        slot.insert(DEFAULT_STORAGE_KEY, "{\"channels\": [oops");
        let state = Persistence::new(slot).read();

        assert!(state.channel("general").is_some());
    }

    #[test]
    fn test_read_migrates_legacy_blob() {
        let slot = MemoryStorage::new();
        slot.insert(
            DEFAULT_STORAGE_KEY,
            r#"{
                "channels": [{"id": "channel-1699999999999-abc123def", "name": "Book Club", "createdAt": 1699999999999, "updatedAt": 1699999999999}],
                "messages": [{"id": "m", "channelId": "channel-1699999999999-abc123def", "content": "hi", "author": "You", "createdAt": 1700000000000}],
                "activeChannelId": "channel-1699999999999-abc123def"
            }"#,
        );
        let persistence = Persistence::new(slot.clone());
        let state = persistence.read();

        assert_eq!(state.channels[0].id, "book-club");
        assert_eq!(state.messages[0].channel_id, "book-club");
        // Reading never writes back
        assert!(slot
            .get(DEFAULT_STORAGE_KEY)
            .unwrap()
            .contains("channel-1699999999999-abc123def"));
    }

    #[test]
    fn test_failures_are_swallowed() {
        let persistence = Persistence::new(FullDisk);
        let state = sample_state();

        persistence.write(&state);
        persistence.clear();
        assert_eq!(persistence.read().current_user, DEFAULT_USER);
    }

    #[test]
    fn test_unavailable_is_noop() {
        let persistence = Persistence::unavailable();
        assert!(!persistence.is_available());

        persistence.write(&sample_state());
        let state = persistence.read();
        assert_eq!(state.current_user, DEFAULT_USER);
        assert!(state.notes.is_empty());
    }

    #[test]
    fn test_clear() {
        let slot = MemoryStorage::new();
        let persistence = Persistence::new(slot.clone());
        persistence.write(&sample_state());
        persistence.clear();

        assert!(slot.get(DEFAULT_STORAGE_KEY).is_none());
    }

    #[test]
    fn test_from_config_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            database_path: Some(dir.path().join("state.db")),
            storage_key: "k".into(),
            ..StoreConfig::default()
        };

        let persistence = Persistence::from_config(&config);
        assert!(persistence.is_available());
        assert_eq!(persistence.key(), "k");

        let state = sample_state();
        persistence.write(&state);
        assert_eq!(Persistence::from_config(&config).read(), state);
    }
}
