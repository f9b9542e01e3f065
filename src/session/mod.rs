//! Consultation session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Connection lifecycle (Idle → Connecting → Active → Ended)
//! - Routing of inbound endpoint events to playback and transcript
//! - Microphone capture, encoding and transmission
//! - Interruption (barge-in) policy
//! - The call timer and UI-observable state

mod config;
mod session;
mod snapshot;
mod transcript;

pub use config::SessionConfig;
pub use session::{SessionDeps, VoiceSession};
pub use snapshot::{format_elapsed, ConnectionState, SessionSnapshot};
pub use transcript::{Role, TranscriptAssembler, TranscriptTurn};
