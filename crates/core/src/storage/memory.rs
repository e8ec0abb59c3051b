//! In-process state slot

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{StateStorage, StorageResult};

/// Volatile key-value slot. Clones share the same map, so a test can keep
/// one handle to inspect what the store wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored value for a key
    pub fn get(&self, key: &str) -> Option<String> {
        self.slots().get(key).cloned()
    }

    /// Seed a value directly, bypassing serialization
    pub fn insert(&self, key: &str, value: impl Into<String>) {
        self.slots().insert(key.to_string(), value.into());
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, blob: &str) -> StorageResult<()> {
        self.insert(key, blob);
        Ok(())
    }

    fn clear(&self, key: &str) -> StorageResult<()> {
        self.slots().remove(key);
        Ok(())
    }
}
