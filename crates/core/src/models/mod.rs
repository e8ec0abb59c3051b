//! Data models for Channote

mod channel;
mod message;
mod note;
mod state;

pub use channel::*;
pub use message::*;
pub use note::*;
pub use state::*;

use chrono::{DateTime, SubsecRound, Utc};

/// Current wall-clock time at the millisecond precision the persisted
/// format keeps, so that a written state reads back equal.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
