//! Persisted state migration
//!
//! Upgrades a previously written state document to the current shape.
//! Documents written before `schemaVersion` existed are version 1; their
//! channels may still carry opaque `channel-<millis>-<token>` ids, which are
//! re-keyed to name-derived slugs here.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::ids::{allocate_channel_id, slugify};
use crate::models::{self, default_channels, AppState, Channel, Message, Note, DEFAULT_USER};

/// Schema version stamped on every written document
pub const SCHEMA_VERSION: u32 = 2;

/// Version assumed for documents without a `schemaVersion` field
const LEGACY_SCHEMA_VERSION: u32 = 1;

/// Prefix of channel ids minted by the version 1 scheme
const LEGACY_ID_PREFIX: &str = "channel-";

/// Ids longer than this are not plausible slugs
const MAX_SLUG_ID_LEN: usize = 64;

/// Millisecond timestamps have had 13 digits since 2001
const LEGACY_STAMP_DIGITS: usize = 13;

/// A state document as found in storage. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawState {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    #[serde(default)]
    pub notes: Option<Vec<Note>>,
    #[serde(default)]
    pub active_channel_id: Option<String>,
    #[serde(default)]
    pub active_note_id: Option<String>,
    #[serde(default)]
    pub current_user: Option<String>,
    #[serde(default)]
    pub dark_mode: Option<bool>,
}

impl From<AppState> for RawState {
    fn from(state: AppState) -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION),
            channels: Some(state.channels),
            messages: Some(state.messages),
            notes: Some(state.notes),
            active_channel_id: state.active_channel_id,
            active_note_id: state.active_note_id,
            current_user: Some(state.current_user),
            dark_mode: Some(state.dark_mode),
        }
    }
}

/// The document layout written to storage: the state plus its version
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState<'a> {
    pub schema_version: u32,
    #[serde(flatten)]
    pub state: &'a AppState,
}

impl<'a> PersistedState<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            state,
        }
    }
}

/// Parse a stored document and bring it up to date
pub fn migrate_json(blob: &str, default_user: &str) -> Result<AppState> {
    let raw: RawState = serde_json::from_str(blob)?;
    Ok(migrate_with_defaults(raw, default_user))
}

/// Bring a raw document up to date, using the built-in default user
pub fn migrate(raw: RawState) -> AppState {
    migrate_with_defaults(raw, DEFAULT_USER)
}

/// Bring a raw document up to date.
///
/// Steps, in order:
/// 1. missing `messages` / `notes` become empty
/// 2. missing scalars get their defaults, and an `updatedAt` earlier than
///    `createdAt` is raised to it
/// 3. an empty channel list is replaced by the default channels, and a
///    missing active channel becomes the first channel
/// 4. (version 1 only) legacy channel ids are re-keyed and every reference
///    to them rewritten, then any remaining duplicate ids are split
#[instrument(skip_all, fields(version = raw.schema_version))]
pub fn migrate_with_defaults(raw: RawState, default_user: &str) -> AppState {
    let version = raw.schema_version.unwrap_or(LEGACY_SCHEMA_VERSION);

    let mut state = AppState {
        channels: raw.channels.unwrap_or_default(),
        messages: raw.messages.unwrap_or_default(),
        notes: raw.notes.unwrap_or_default(),
        active_channel_id: raw.active_channel_id,
        active_note_id: raw.active_note_id,
        current_user: raw
            .current_user
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| default_user.to_string()),
        dark_mode: raw.dark_mode.unwrap_or(false),
    };

    if state.channels.is_empty() {
        debug!("No channels stored, restoring defaults");
        state.channels = default_channels(models::now());
        let active_is_member = state
            .active_channel_id
            .as_deref()
            .is_some_and(|id| state.channel(id).is_some());
        if !active_is_member {
            state.active_channel_id = state.channels.first().map(|c| c.id.clone());
        }
    }
    if state.active_channel_id.is_none() {
        state.active_channel_id = state.channels.first().map(|c| c.id.clone());
    }

    clamp_updated_at(&mut state);

    // Re-key first so duplicated legacy ids still get slugs
    if version < SCHEMA_VERSION {
        let remapped = rekey_legacy_channels(&mut state);
        if remapped > 0 {
            info!(remapped, "Re-keyed legacy channel ids");
        }
    }

    let split = split_duplicate_ids(&mut state);
    if split > 0 {
        info!(split, "Renamed duplicate channel ids");
    }

    state
}

/// Whether a channel id was minted by the opaque version 1 scheme
/// (`channel-<millis>-<token>`), or is too long to be a slug.
pub fn is_legacy_channel_id(id: &str) -> bool {
    if id.chars().count() > MAX_SLUG_ID_LEN {
        return true;
    }

    let Some(rest) = id.strip_prefix(LEGACY_ID_PREFIX) else {
        return false;
    };
    let Some((stamp, token)) = rest.split_once('-') else {
        return false;
    };

    stamp.len() >= LEGACY_STAMP_DIGITS
        && stamp.bytes().all(|b| b.is_ascii_digit())
        && !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Written clocks can step backwards; never let an edit predate creation
fn clamp_updated_at(state: &mut AppState) {
    for channel in &mut state.channels {
        channel.updated_at = channel.updated_at.max(channel.created_at);
    }
    for note in &mut state.notes {
        note.updated_at = note.updated_at.max(note.created_at);
    }
}

/// Give every repeated channel id after its first occurrence a fresh one.
/// References keep pointing at the first occurrence.
fn split_duplicate_ids(state: &mut AppState) -> usize {
    let mut taken: HashSet<String> = state.channels.iter().map(|c| c.id.clone()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut split = 0;

    for channel in &mut state.channels {
        if seen.insert(channel.id.clone()) {
            continue;
        }
        let fresh = allocate_channel_id(&channel.id, taken.iter().map(String::as_str));
        taken.insert(fresh.clone());
        seen.insert(fresh.clone());
        channel.id = fresh;
        split += 1;
    }

    split
}

/// Replace legacy channel ids with slugs of the channel names and rewrite
/// every message, note and selection that pointed at them.
fn rekey_legacy_channels(state: &mut AppState) -> usize {
    let mut taken: HashSet<String> = state.channels.iter().map(|c| c.id.clone()).collect();
    let mut remap: HashMap<String, String> = HashMap::new();

    for channel in &mut state.channels {
        if !is_legacy_channel_id(&channel.id) {
            continue;
        }

        taken.remove(&channel.id);
        let fresh = allocate_channel_id(&slugify(&channel.name), taken.iter().map(String::as_str));
        taken.insert(fresh.clone());

        debug!(old = %channel.id, new = %fresh, "Re-keying channel");
        // A repeated legacy id keeps its references on the first copy
        remap
            .entry(std::mem::replace(&mut channel.id, fresh.clone()))
            .or_insert(fresh);
    }

    if remap.is_empty() {
        return 0;
    }

    for message in &mut state.messages {
        if let Some(fresh) = remap.get(&message.channel_id) {
            message.channel_id = fresh.clone();
        }
    }
    for note in &mut state.notes {
        if let Some(fresh) = remap.get(&note.channel_id) {
            note.channel_id = fresh.clone();
        }
    }
    if let Some(fresh) = state
        .active_channel_id
        .as_ref()
        .and_then(|id| remap.get(id))
    {
        state.active_channel_id = Some(fresh.clone());
    }

    remap.len()
}
