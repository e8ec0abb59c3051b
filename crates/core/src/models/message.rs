//! Message model for channel chat

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message in a channel. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub content: String,
    pub author: String,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: String,
        channel_id: String,
        content: String,
        author: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            channel_id,
            content,
            author,
            created_at,
        }
    }

    pub fn format_timestamp(&self) -> String {
        self.created_at
            .with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string()
    }
}
