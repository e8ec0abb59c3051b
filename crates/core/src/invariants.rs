//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use crate::models::{AppState, Channel, Note};

/// Validate that a state is internally consistent
pub fn assert_state_invariants(state: &AppState) {
    assert_unique_channel_ids(&state.channels);

    for channel in &state.channels {
        assert_channel_invariants(channel);
    }

    for note in &state.notes {
        assert_note_invariants(note);
    }
}

/// No two channels may share an id
pub fn assert_unique_channel_ids(channels: &[Channel]) {
    let mut seen = HashSet::new();
    for channel in channels {
        debug_assert!(
            seen.insert(channel.id.as_str()),
            "Duplicate channel id {:?}",
            channel.id
        );
    }
}

/// Validate a single channel
pub fn assert_channel_invariants(channel: &Channel) {
    debug_assert!(!channel.id.is_empty(), "Channel {:?} has empty id", channel.name);

    debug_assert!(
        channel.updated_at >= channel.created_at,
        "Channel {} updated before it was created",
        channel.id
    );
}

/// Validate a single note
pub fn assert_note_invariants(note: &Note) {
    debug_assert!(
        note.updated_at >= note.created_at,
        "Note {} updated before it was created",
        note.id
    );
}

/// After a channel deletion the active channel must be a survivor, or
/// nothing when no channels are left
pub fn assert_active_channel_after_delete(state: &AppState) {
    match state.active_channel_id.as_deref() {
        Some(id) => debug_assert!(
            state.channel(id).is_some(),
            "Active channel {:?} does not exist after delete",
            id
        ),
        None => debug_assert!(
            state.channels.is_empty(),
            "No active channel but {} channels remain",
            state.channels.len()
        ),
    }
}
