//! Note model

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title given to notes created without one
pub const UNTITLED_NOTE: &str = "Untitled Note";

/// A note filed under a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub content: String,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// New note with an empty body. A missing or blank title falls back to
    /// [`UNTITLED_NOTE`].
    pub fn new(id: String, channel_id: String, title: Option<&str>, now: DateTime<Utc>) -> Self {
        let title = match title.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => UNTITLED_NOTE.to_string(),
        };

        Self {
            id,
            channel_id,
            title,
            content: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a note. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
        }
    }
}

/// Ordering for a channel's note list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteSort {
    /// Most recently edited first
    #[default]
    Updated,
    /// Most recently created first
    Created,
    /// Alphabetical, case-insensitive
    Title,
}

impl NoteSort {
    pub fn label(&self) -> &'static str {
        match self {
            NoteSort::Updated => "updated",
            NoteSort::Created => "created",
            NoteSort::Title => "title",
        }
    }
}

impl std::str::FromStr for NoteSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "updated" => Ok(NoteSort::Updated),
            "created" => Ok(NoteSort::Created),
            "title" => Ok(NoteSort::Title),
            other => Err(format!("unknown note sort '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_blank_title_falls_back() {
        let now = Utc::now();
        let note = Note::new("n".into(), "general".into(), Some("   "), now);
        assert_eq!(note.title, UNTITLED_NOTE);
        assert!(note.content.is_empty());
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_sort_parse() {
        assert_eq!("Title".parse::<NoteSort>().unwrap(), NoteSort::Title);
        assert!("size".parse::<NoteSort>().is_err());
    }
}
