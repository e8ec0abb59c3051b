//! The application state container
//!
//! [`Store`] owns the live [`AppState`]. Every operation builds a new state
//! value from the current one, swaps it in, writes it through the
//! [`Persistence`] adapter and hands it to subscribers. Snapshots returned
//! by [`Store::state`] are never modified afterwards.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, ValidationError};
use crate::ids::{allocate_channel_id, opaque_id, slugify, validate_name};
use crate::invariants;
use crate::models::{self, AppState, Channel, ChannelPatch, Message, Note, NotePatch, NoteSort};
use crate::storage::Persistence;

/// Prefix of generated message ids
const MESSAGE_ID_PREFIX: &str = "msg";

/// Prefix of generated note ids
const NOTE_ID_PREFIX: &str = "note";

/// Callback invoked with each newly committed state
pub type Listener = Box<dyn Fn(&Arc<AppState>) + Send>;

/// Handle returned by [`Store::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Store {
    state: Arc<AppState>,
    persistence: Persistence,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl Store {
    /// Load the persisted state (migrating it if needed) and write the
    /// result back, so a one-time migration only ever runs once.
    pub fn open(persistence: Persistence) -> Self {
        let state = persistence.read();
        info!(
            channels = state.channels.len(),
            messages = state.messages.len(),
            notes = state.notes.len(),
            durable = persistence.is_available(),
            "Store opened"
        );
        invariants::assert_state_invariants(&state);
        persistence.write(&state);
        Self::with_state(state, persistence)
    }

    /// Start from a given state. Nothing is written until the first change.
    pub fn with_state(state: AppState, persistence: Persistence) -> Self {
        Self {
            state: Arc::new(state),
            persistence,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Store with default state and no durable storage
    pub fn ephemeral() -> Self {
        let persistence = Persistence::unavailable();
        Self::with_state(persistence.default_state(), persistence)
    }

    /// Current snapshot
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Register a listener called after every committed change
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<AppState>) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Create a channel and make it active. Returns its id.
    pub fn create_channel(&mut self, name: &str, description: Option<&str>) -> Result<String> {
        let name = name.trim();
        validate_name(name)?;

        let id = allocate_channel_id(&slugify(name), self.state.channel_ids());
        let mut channel = Channel::new(id.clone(), name.to_string(), models::now());
        channel.description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let mut next = self.next_state();
        next.channels.push(channel);
        next.active_channel_id = Some(id.clone());

        debug!(%id, "Channel created");
        self.commit(next);
        Ok(id)
    }

    /// Merge fields into a channel. Unknown ids are ignored. The id is
    /// never re-derived from a new name.
    pub fn update_channel(&mut self, id: &str, patch: ChannelPatch) -> Result<()> {
        let name = match patch.name.as_deref().map(str::trim) {
            Some(name) => {
                validate_name(name)?;
                Some(name.to_string())
            }
            None => None,
        };

        let Some(index) = self.state.channels.iter().position(|c| c.id == id) else {
            debug!(%id, "Update for unknown channel ignored");
            return Ok(());
        };

        let mut next = self.next_state();
        let channel = &mut next.channels[index];
        if let Some(name) = name {
            channel.name = name;
        }
        if let Some(description) = patch.description {
            channel.description = description;
        }
        channel.updated_at = advance(channel.updated_at);

        self.commit(next);
        Ok(())
    }

    /// Delete a channel with every message and note filed under it
    pub fn delete_channel(&mut self, id: &str) {
        if self.state.channel(id).is_none() {
            debug!(%id, "Delete for unknown channel ignored");
            return;
        }

        let mut next = self.next_state();
        let active_note_in_channel = next
            .active_note()
            .is_some_and(|note| note.channel_id == id);

        next.channels.retain(|c| c.id != id);
        next.messages.retain(|m| m.channel_id != id);
        next.notes.retain(|n| n.channel_id != id);

        if next.active_channel_id.as_deref() == Some(id) {
            next.active_channel_id = next.channels.first().map(|c| c.id.clone());
            invariants::assert_active_channel_after_delete(&next);
        }
        if active_note_in_channel {
            next.active_note_id = None;
        }

        debug!(%id, "Channel deleted");
        self.commit(next);
    }

    /// Focus a channel. Any selected note is dropped.
    pub fn select_channel(&mut self, id: &str) {
        let mut next = self.next_state();
        next.active_channel_id = Some(id.to_string());
        next.active_note_id = None;
        self.commit(next);
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Post a message as the current user. Surrounding whitespace is
    /// trimmed; blank messages are rejected. The channel is not checked.
    pub fn send_message(&mut self, channel_id: &str, content: &str) -> Result<String> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let id = opaque_id(MESSAGE_ID_PREFIX);
        let mut next = self.next_state();
        let message = Message::new(
            id.clone(),
            channel_id.to_string(),
            content.to_string(),
            next.current_user.clone(),
            models::now(),
        );
        next.messages.push(message);

        self.commit(next);
        Ok(id)
    }

    pub fn delete_message(&mut self, id: &str) {
        if self.state.message(id).is_none() {
            return;
        }

        let mut next = self.next_state();
        next.messages.retain(|m| m.id != id);
        self.commit(next);
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Create an empty note, select it, and return its id. The channel is
    /// not checked.
    pub fn create_note(&mut self, channel_id: &str, title: Option<&str>) -> String {
        let id = opaque_id(NOTE_ID_PREFIX);
        let note = Note::new(id.clone(), channel_id.to_string(), title, models::now());

        let mut next = self.next_state();
        next.notes.push(note);
        next.active_note_id = Some(id.clone());

        debug!(%id, %channel_id, "Note created");
        self.commit(next);
        id
    }

    /// Merge fields into a note. `updated_at` moves forward even for an
    /// empty patch. Unknown ids are ignored.
    pub fn update_note(&mut self, id: &str, patch: NotePatch) {
        let Some(index) = self.state.notes.iter().position(|n| n.id == id) else {
            debug!(%id, "Update for unknown note ignored");
            return;
        };

        let mut next = self.next_state();
        let note = &mut next.notes[index];
        if let Some(title) = patch.title {
            note.title = title;
        }
        if let Some(content) = patch.content {
            note.content = content;
        }
        note.updated_at = advance(note.updated_at);

        self.commit(next);
    }

    pub fn delete_note(&mut self, id: &str) {
        if self.state.note(id).is_none() {
            return;
        }

        let mut next = self.next_state();
        next.notes.retain(|n| n.id != id);
        if next.active_note_id.as_deref() == Some(id) {
            next.active_note_id = None;
        }
        self.commit(next);
    }

    pub fn select_note(&mut self, id: &str) {
        let mut next = self.next_state();
        next.active_note_id = Some(id.to_string());
        self.commit(next);
    }

    // ------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------

    pub fn toggle_dark_mode(&mut self) {
        let mut next = self.next_state();
        next.dark_mode = !next.dark_mode;
        self.commit(next);
    }

    /// Change the author of messages sent from now on
    pub fn set_current_user(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyUser.into());
        }

        let mut next = self.next_state();
        next.current_user = name.to_string();
        self.commit(next);
        Ok(())
    }

    /// Replace everything with a first-run state
    pub fn reset(&mut self) {
        info!("Resetting state to defaults");
        let next = self.persistence.default_state();
        self.commit(next);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn channel(&self, id: &str) -> Option<Channel> {
        self.state.channel(id).cloned()
    }

    /// Messages of a channel, oldest first
    pub fn messages_in_channel(&self, channel_id: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .state
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    /// Notes of a channel in the requested order
    pub fn notes_in_channel(&self, channel_id: &str, sort: NoteSort) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .state
            .notes
            .iter()
            .filter(|n| n.channel_id == channel_id)
            .cloned()
            .collect();

        match sort {
            NoteSort::Updated => notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            NoteSort::Created => notes.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            NoteSort::Title => notes.sort_by_cached_key(|n| n.title.to_lowercase()),
        }
        notes
    }

    /// Pretty-printed JSON of the current state, for debugging
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self.state.as_ref())?)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Write the current state again
    pub fn flush(&self) {
        self.persistence.write(&self.state);
    }

    /// Flush and tear down
    pub fn close(self) {
        self.flush();
        info!("Store closed");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn next_state(&self) -> AppState {
        AppState::clone(&self.state)
    }

    fn commit(&mut self, next: AppState) {
        invariants::assert_state_invariants(&next);

        self.state = Arc::new(next);
        self.persistence.write(&self.state);

        for (_, listener) in &self.listeners {
            listener(&self.state);
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("persistence", &self.persistence)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// New modification time: now, but never earlier than the previous one
fn advance(previous: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    models::now().max(previous)
}
