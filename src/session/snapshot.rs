use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transcript::TranscriptTurn;

/// Connection lifecycle. `Ended` is terminal: a new `start()` builds a
/// fresh session rather than reviving this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Active,
    Ended,
}

/// UI-observable state of a consultation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: ConnectionState,

    /// True iff any playback source is active.
    pub is_ai_speaking: bool,

    /// UX signal, debounced ~1.5s after the last user partial.
    pub is_user_speaking: bool,

    /// Whole seconds in the Active state; resets to 0 on leaving Active.
    pub elapsed_seconds: u64,

    /// `m:ss` rendering of the call timer.
    pub elapsed_display: String,

    /// Finalized conversation log, oldest first.
    pub transcript: Vec<TranscriptTurn>,

    /// In-progress (not yet finalized) fragments.
    pub current_user_partial: String,
    pub current_ai_partial: String,

    /// User-visible description of the failure that ended the session, if
    /// any.
    pub last_error: Option<String>,

    pub started_at: DateTime<Utc>,
}

/// Render a call timer as `m:ss`.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
