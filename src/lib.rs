pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioChunk, CallRecorder, CaptureBackend, CaptureConfig, CaptureFrame, EncoderConfig,
    FrameEncoder, PlaybackScheduler, PlaybackSink, PlaybackSource, RecorderConfig,
};
pub use config::Config;
pub use error::{DecodeError, SessionError};
pub use http::{create_router, AppState};
pub use live::{LiveConnection, LiveEvent, LiveTransport, RealtimeInput, ServerMessage, SessionSetup};
pub use session::{
    ConnectionState, Role, SessionConfig, SessionDeps, SessionSnapshot, TranscriptAssembler,
    TranscriptTurn, VoiceSession,
};
