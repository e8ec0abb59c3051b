//! Editor autosave
//!
//! Keystrokes in the note editor produce drafts much faster than the state
//! should be rewritten. An [`AutosaveHandle`] holds the latest draft and
//! commits it to the store once no edit has arrived for the debounce delay.
//! Every edit pushes the deadline back. An explicit save, or closing the
//! editor, commits straight away.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::models::{self, NotePatch};
use crate::store::Store;

/// Store shared between the editor and its autosave task
pub type SharedStore = Arc<Mutex<Store>>;

/// What the editor shows next to the note title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// Nothing edited since the editor opened
    Idle,
    /// A draft is waiting for the quiet period to end
    Pending,
    /// Last commit time
    Saved(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Draft {
    title: String,
    content: String,
}

enum Command {
    Edit(Draft),
    SaveNow(oneshot::Sender<bool>),
    Close,
}

/// Spawns autosave tasks
pub struct Autosave;

impl Autosave {
    /// Start an autosave task for one note. Must be called inside a tokio
    /// runtime.
    pub fn spawn(store: SharedStore, note_id: impl Into<String>, delay: Duration) -> AutosaveHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SaveStatus::Idle);
        let note_id = note_id.into();

        debug!(%note_id, ?delay, "Starting autosave");
        let task = tokio::spawn(run(store, note_id, delay, rx, status_tx));

        AutosaveHandle {
            tx,
            status: status_rx,
            task,
        }
    }
}

/// Editor-side handle of an autosave task
pub struct AutosaveHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SaveStatus>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Record the editor contents and restart the quiet period
    pub fn edit(&self, title: impl Into<String>, content: impl Into<String>) {
        let draft = Draft {
            title: title.into(),
            content: content.into(),
        };
        if self.tx.send(Command::Edit(draft)).is_err() {
            warn!("Autosave task has stopped, edit dropped");
        }
    }

    /// Commit the pending draft now. Returns whether the note changed.
    pub async fn save_now(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::SaveNow(reply_tx)).is_err() {
            warn!("Autosave task has stopped, save dropped");
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub fn status(&self) -> SaveStatus {
        *self.status.borrow()
    }

    /// Flush any unsaved draft and stop the task
    pub async fn close(self) {
        let _ = self.tx.send(Command::Close);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Autosave task ended abnormally");
        }
    }
}

async fn run(
    store: SharedStore,
    note_id: String,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SaveStatus>,
) {
    let mut pending: Option<Draft> = None;
    let mut deadline = Instant::now();

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Edit(draft)) => {
                    pending = Some(draft);
                    deadline = Instant::now() + delay;
                    status.send_replace(SaveStatus::Pending);
                }
                Some(Command::SaveNow(reply)) => {
                    let saved = commit(&store, &note_id, pending.take(), &status);
                    let _ = reply.send(saved);
                }
                Some(Command::Close) | None => {
                    commit(&store, &note_id, pending.take(), &status);
                    break;
                }
            },
            _ = sleep_until(deadline), if pending.is_some() => {
                commit(&store, &note_id, pending.take(), &status);
            }
        }
    }

    debug!(%note_id, "Autosave stopped");
}

/// Write a draft to the note if it differs from what is stored
fn commit(
    store: &SharedStore,
    note_id: &str,
    draft: Option<Draft>,
    status: &watch::Sender<SaveStatus>,
) -> bool {
    let Some(draft) = draft else {
        return false;
    };

    let mut store = lock(store);
    let changed = match store.state().note(note_id) {
        Some(note) => note.title != draft.title || note.content != draft.content,
        None => {
            debug!(%note_id, "Note no longer exists, draft discarded");
            status.send_replace(SaveStatus::Idle);
            return false;
        }
    };

    if changed {
        store.update_note(
            note_id,
            NotePatch {
                title: Some(draft.title),
                content: Some(draft.content),
            },
        );
        debug!(%note_id, "Draft committed");
        status.send_replace(SaveStatus::Saved(models::now()));
    } else if *status.borrow() == SaveStatus::Pending {
        status.send_replace(SaveStatus::Idle);
    }

    changed
}

fn lock(store: &SharedStore) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Human-readable age of the last save
pub fn format_last_saved(now: DateTime<Utc>, saved_at: DateTime<Utc>) -> String {
    let seconds = (now - saved_at).num_seconds();

    if seconds < 60 {
        "Saved just now".to_string()
    } else if seconds < 3600 {
        format!("Saved {}m ago", seconds / 60)
    } else {
        format!(
            "Saved at {}",
            saved_at.with_timezone(&Local).format("%H:%M:%S")
        )
    }
}
