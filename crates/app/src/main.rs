//! Channote - channel chat with per-channel notes
//!
//! Command-line front end over the core store. Every command opens the
//! persisted state, applies one operation, and exits.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use channote_core::{
    Autosave, ChannelPatch, NoteSort, Persistence, SqliteStorage, Store, StoreConfig,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "channote")]
#[command(about = "Channels, messages and notes, kept on disk")]
struct Cli {
    /// State database file (overrides the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Run without durable storage
    #[arg(long, global = true, conflicts_with = "db")]
    ephemeral: bool,

    /// Path to a TOML config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump the full state as JSON
    State,

    /// List channels
    Channels,

    /// List messages in a channel, oldest first
    Messages {
        channel: String,
    },

    /// List notes in a channel
    Notes {
        channel: String,
        /// updated, created or title
        #[arg(long, short, default_value = "updated")]
        sort: NoteSort,
    },

    /// Create a channel and select it
    CreateChannel {
        name: String,
        #[arg(long, short)]
        description: Option<String>,
    },

    /// Rename a channel. Its id stays the same.
    RenameChannel {
        id: String,
        name: String,
    },

    /// Delete a channel with its messages and notes
    DeleteChannel {
        id: String,
    },

    /// Post a message as the current user
    Send {
        channel: String,
        content: String,
    },

    /// Create a note in a channel
    NewNote {
        channel: String,
        #[arg(long, short)]
        title: Option<String>,
    },

    /// Change a note's title or content
    EditNote {
        id: String,
        #[arg(long, short)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },

    /// Delete a note
    DeleteNote {
        id: String,
    },

    /// Flip the dark mode preference
    DarkMode,

    /// Restore the first-run state
    Reset,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::debug!("Starting Channote");

    let config = match &cli.config {
        Some(path) => StoreConfig::load(path),
        None => StoreConfig::load_default(),
    }
    .context("Failed to load config")?;

    let persistence = open_persistence(&cli, &config)?;
    let store = Store::open(persistence);

    let mut stdout = std::io::stdout().lock();
    let store = run(store, cli.command, config.autosave_delay(), &mut stdout)?;
    store.close();

    Ok(())
}

fn open_persistence(cli: &Cli, config: &StoreConfig) -> anyhow::Result<Persistence> {
    let persistence = if cli.ephemeral {
        Persistence::unavailable()
    } else if let Some(path) = &cli.db {
        let storage = SqliteStorage::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Persistence::new(storage)
    } else {
        return Ok(Persistence::from_config(config));
    };

    Ok(persistence
        .with_key(&config.storage_key)
        .with_default_user(&config.default_user))
}

/// Apply one command and hand the store back for shutdown
fn run(
    mut store: Store,
    command: Command,
    autosave_delay: Duration,
    out: &mut impl Write,
) -> anyhow::Result<Store> {
    match command {
        Command::State => {
            writeln!(out, "{}", store.to_pretty_json()?)?;
        }

        Command::Channels => {
            let state = store.state();
            for channel in &state.channels {
                let marker = if state.active_channel_id.as_deref() == Some(channel.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                match &channel.description {
                    Some(description) => writeln!(
                        out,
                        "{} #{:<20} {} - {}",
                        marker, channel.id, channel.name, description
                    )?,
                    None => writeln!(out, "{} #{:<20} {}", marker, channel.id, channel.name)?,
                }
            }
        }

        Command::Messages { channel } => {
            require_channel(&store, &channel)?;
            for message in store.messages_in_channel(&channel) {
                writeln!(
                    out,
                    "[{}] {}: {}",
                    message.format_timestamp(),
                    message.author,
                    message.content
                )?;
            }
        }

        Command::Notes { channel, sort } => {
            require_channel(&store, &channel)?;
            for note in store.notes_in_channel(&channel, sort) {
                writeln!(
                    out,
                    "{:<40} {:<30} {}",
                    note.id,
                    note.title,
                    note.updated_at.format("%Y-%m-%d %H:%M")
                )?;
            }
        }

        Command::CreateChannel { name, description } => {
            let id = store.create_channel(&name, description.as_deref())?;
            writeln!(out, "{}", id)?;
        }

        Command::RenameChannel { id, name } => {
            require_channel(&store, &id)?;
            store.update_channel(&id, ChannelPatch::name(name))?;
        }

        Command::DeleteChannel { id } => {
            require_channel(&store, &id)?;
            store.delete_channel(&id);
        }

        Command::Send { channel, content } => {
            require_channel(&store, &channel)?;
            let id = store.send_message(&channel, &content)?;
            writeln!(out, "{}", id)?;
        }

        Command::NewNote { channel, title } => {
            require_channel(&store, &channel)?;
            let id = store.create_note(&channel, title.as_deref());
            writeln!(out, "{}", id)?;
        }

        Command::EditNote { id, title, content } => {
            let note = store
                .state()
                .note(&id)
                .cloned()
                .ok_or_else(|| anyhow!("No note with id '{}'", id))?;
            if title.is_none() && content.is_none() {
                bail!("Nothing to change, pass --title or --content");
            }

            let (saved, returned) = edit_note(
                store,
                &id,
                title.unwrap_or(note.title),
                content.unwrap_or(note.content),
                autosave_delay,
            )?;
            store = returned;
            writeln!(out, "{}", if saved { "Saved" } else { "No changes" })?;
        }

        Command::DeleteNote { id } => {
            if store.state().note(&id).is_none() {
                bail!("No note with id '{}'", id);
            }
            store.delete_note(&id);
        }

        Command::DarkMode => {
            store.toggle_dark_mode();
            let state = if store.state().dark_mode { "on" } else { "off" };
            writeln!(out, "Dark mode {}", state)?;
        }

        Command::Reset => {
            store.reset();
            writeln!(out, "State reset")?;
        }
    }

    Ok(store)
}

/// Push an edit through the editor's autosave path
fn edit_note(
    store: Store,
    id: &str,
    title: String,
    content: String,
    delay: Duration,
) -> anyhow::Result<(bool, Store)> {
    let shared = Arc::new(Mutex::new(store));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to create tokio runtime")?;

    let saved = runtime.block_on(async {
        let handle = Autosave::spawn(Arc::clone(&shared), id, delay);
        handle.edit(title, content);
        let saved = handle.save_now().await;
        handle.close().await;
        saved
    });

    let store = Arc::try_unwrap(shared)
        .map_err(|_| anyhow!("Autosave task still holds the store"))?
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok((saved, store))
}

fn require_channel(store: &Store, id: &str) -> anyhow::Result<()> {
    if store.channel(id).is_none() {
        bail!("No channel with id '{}'", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use channote_core::MemoryStorage;

    fn exec(store: Store, command: Command) -> (Store, String) {
        let mut out = Vec::new();
        let store = run(store, command, Duration::from_millis(500), &mut out).unwrap();
        (store, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "channote",
            "notes",
            "general",
            "--sort",
            "title",
            "--ephemeral",
        ])
        .unwrap();
        assert!(cli.ephemeral);
        assert!(matches!(
            cli.command,
            Command::Notes { sort: NoteSort::Title, .. }
        ));

        assert!(Cli::try_parse_from(["channote", "--ephemeral", "--db", "x.db", "state"]).is_err());
        assert!(Cli::try_parse_from(["channote", "notes", "general", "--sort", "size"]).is_err());
    }

    #[test]
    fn test_channels_marks_active() {
        let (_, out) = exec(Store::ephemeral(), Command::Channels);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("* #general"));
        assert!(lines[0].ends_with("General discussion"));
        assert!(lines[1].starts_with("  #random"));
    }

    #[test]
    fn test_create_channel_prints_id() {
        let (store, out) = exec(
            Store::ephemeral(),
            Command::CreateChannel {
                name: "Book Club".into(),
                description: None,
            },
        );
        assert_eq!(out.trim(), "book-club");
        assert_eq!(store.state().active_channel_id.as_deref(), Some("book-club"));
    }

    #[test]
    fn test_invalid_name_is_an_error() {
        let mut out = Vec::new();
        let result = run(
            Store::ephemeral(),
            Command::CreateChannel {
                name: "bad!name".into(),
                description: None,
            },
            Duration::from_millis(500),
            &mut out,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_send_and_list_messages() {
        let (store, _) = exec(
            Store::ephemeral(),
            Command::Send {
                channel: "random".into(),
                content: "  hello  ".into(),
            },
        );
        let (_, out) = exec(store, Command::Messages { channel: "random".into() });

        assert!(out.trim_end().ends_with("You: hello"));
    }

    #[test]
    fn test_unknown_channel_is_an_error() {
        let mut out = Vec::new();
        let result = run(
            Store::ephemeral(),
            Command::Send {
                channel: "nowhere".into(),
                content: "hi".into(),
            },
            Duration::from_millis(500),
            &mut out,
        );
        assert!(result.unwrap_err().to_string().contains("nowhere"));
    }

    #[test]
    fn test_edit_note_through_autosave() {
        let (store, out) = exec(
            Store::ephemeral(),
            Command::NewNote {
                channel: "general".into(),
                title: None,
            },
        );
        let id = out.trim().to_string();

        let (store, out) = exec(
            store,
            Command::EditNote {
                id: id.clone(),
                title: None,
                content: Some("agenda".into()),
            },
        );
        assert_eq!(out.trim(), "Saved");

        let state = store.state();
        let note = state.note(&id).unwrap();
        assert_eq!(note.title, "Untitled Note");
        assert_eq!(note.content, "agenda");

        let (_, out) = exec(
            store,
            Command::EditNote {
                id,
                title: None,
                content: Some("agenda".into()),
            },
        );
        assert_eq!(out.trim(), "No changes");
    }

    #[test]
    fn test_commands_persist() {
        let slot = MemoryStorage::new();
        let store = Store::open(Persistence::new(slot.clone()));
        let (store, _) = exec(store, Command::DarkMode);
        store.close();

        let reopened = Store::open(Persistence::new(slot));
        assert!(reopened.state().dark_mode);
    }

    #[test]
    fn test_db_flag_opens_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let cli = Cli::try_parse_from([
            "channote",
            "--db",
            path.to_str().unwrap(),
            "channels",
        ])
        .unwrap();

        let persistence = open_persistence(&cli, &StoreConfig::default()).unwrap();
        assert!(persistence.is_available());
        assert!(path.exists());
    }
}
