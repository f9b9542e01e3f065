use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke a finalized turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

/// One finalized utterance in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: Role,
    pub text: String,
    /// When the turn was finalized
    pub timestamp: DateTime<Utc>,
}

/// Accumulates partial transcriptions into an ordered conversation log.
///
/// Fragments are cumulative deltas: each partial is concatenated onto the
/// in-progress accumulator for its role, never replacing it. At most one
/// accumulator exists per role. The finalized transcript is append-only.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    turns: Vec<TranscriptTurn>,
    user_partial: String,
    ai_partial: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate a fragment of the user's speech.
    pub fn push_user_partial(&mut self, text: &str) {
        self.user_partial.push_str(text);
    }

    /// Concatenate a fragment of the model's speech.
    pub fn push_ai_partial(&mut self, text: &str) {
        self.ai_partial.push_str(text);
    }

    /// Finalize the current turn: append each non-empty accumulator to the
    /// log in {user, ai} order (the user's utterance precedes the reply
    /// within one exchange), then clear both. A no-op when both are empty.
    ///
    /// Returns how many turns were appended.
    pub fn finalize_turn(&mut self) -> usize {
        let now = Utc::now();
        let mut appended = 0;

        if !self.user_partial.is_empty() {
            self.turns.push(TranscriptTurn {
                role: Role::User,
                text: std::mem::take(&mut self.user_partial),
                timestamp: now,
            });
            appended += 1;
        }

        if !self.ai_partial.is_empty() {
            self.turns.push(TranscriptTurn {
                role: Role::Ai,
                text: std::mem::take(&mut self.ai_partial),
                timestamp: now,
            });
            appended += 1;
        }

        appended
    }

    /// Drop the in-progress AI partial without transcribing it. An
    /// interrupted utterance was never fully spoken, so it does not enter
    /// the log.
    pub fn discard_ai_partial(&mut self) -> bool {
        let had_partial = !self.ai_partial.is_empty();
        self.ai_partial.clear();
        had_partial
    }

    pub fn user_partial(&self) -> &str {
        &self.user_partial
    }

    pub fn ai_partial(&self) -> &str {
        &self.ai_partial
    }

    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    pub fn to_turns(&self) -> Vec<TranscriptTurn> {
        self.turns.clone()
    }
}
