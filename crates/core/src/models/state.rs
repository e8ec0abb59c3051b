//! Aggregate application state

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Channel, Message, Note};

/// Author used when nothing else is configured
pub const DEFAULT_USER: &str = "You";

/// Author of the built-in welcome messages
pub const SYSTEM_AUTHOR: &str = "System";

/// The whole state tree, persisted as one document.
///
/// Values of this type are never mutated once handed out by the store;
/// every operation builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub channels: Vec<Channel>,
    pub messages: Vec<Message>,
    pub notes: Vec<Note>,
    pub active_channel_id: Option<String>,
    pub active_note_id: Option<String>,
    pub current_user: String,
    pub dark_mode: bool,
}

impl AppState {
    /// Fresh state for a first run
    pub fn new_default(current_user: &str, now: DateTime<Utc>) -> Self {
        let channels = default_channels(now);
        let active_channel_id = channels.first().map(|c| c.id.clone());

        Self {
            channels,
            messages: vec![
                Message::new(
                    "welcome-1".to_string(),
                    "general".to_string(),
                    "Welcome to Channote! 👋".to_string(),
                    SYSTEM_AUTHOR.to_string(),
                    now - Duration::seconds(1),
                ),
                Message::new(
                    "welcome-2".to_string(),
                    "general".to_string(),
                    "Channels hold chat messages and notes. Try sending a message!".to_string(),
                    SYSTEM_AUTHOR.to_string(),
                    now,
                ),
            ],
            notes: Vec::new(),
            active_channel_id,
            active_note_id: None,
            current_user: current_user.to_string(),
            dark_mode: false,
        }
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn active_channel(&self) -> Option<&Channel> {
        self.active_channel_id.as_deref().and_then(|id| self.channel(id))
    }

    pub fn active_note(&self) -> Option<&Note> {
        self.active_note_id.as_deref().and_then(|id| self.note(id))
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.id.as_str())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new_default(DEFAULT_USER, super::now())
    }
}

/// The channel set every installation starts with
pub fn default_channels(now: DateTime<Utc>) -> Vec<Channel> {
    vec![
        Channel::new("general".to_string(), "general".to_string(), now)
            .with_description("General discussion".to_string()),
        Channel::new("random".to_string(), "random".to_string(), now)
            .with_description("Random conversations".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert_eq!(state.active_channel_id.as_deref(), Some("general"));
        assert!(state.channel("general").is_some());
        assert!(state.channel("random").is_some());
        assert_eq!(state.current_user, DEFAULT_USER);
        assert!(!state.dark_mode);
        assert!(state.messages.iter().all(|m| m.channel_id == "general"));
    }

    #[test]
    fn test_serialized_field_names() {
        let state = AppState::default();
        let value = serde_json::to_value(&state).unwrap();
        assert!(value.get("activeChannelId").is_some());
        assert!(value.get("currentUser").is_some());
        assert!(value["channels"][0].get("createdAt").unwrap().is_i64());
    }
}
