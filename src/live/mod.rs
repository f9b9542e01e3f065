//! Client for the streaming speech endpoint
//!
//! The wire protocol is bidirectional: outbound base64 PCM frames
//! (`RealtimeInput`), inbound `ServerMessage` frames carrying any subset of
//! model audio, input/output transcription deltas, turn-complete and
//! interrupted signals.

pub mod client;
pub mod messages;

pub use client::{LiveConnection, LiveEvent, LiveTransport, WebSocketTransport};
pub use messages::{
    advisor_instruction, InlineData, MediaChunk, ModelTurn, Part, RealtimeInput, ServerContent,
    ServerMessage, SessionSetup, TranscriptionDelta,
};
