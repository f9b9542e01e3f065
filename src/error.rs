use thiserror::Error;

/// Failures surfaced at the session boundary.
///
/// Every variant maps to a user-visible message plus a transition to
/// `Ended`; nothing here is retried automatically. The caller re-initiates
/// with a fresh `start()`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Microphone device or permission failure during `start()`.
    /// The session never reaches `Active`.
    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    /// The streaming endpoint could not be opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Mid-session transport failure. Handled like `stop()`: graceful
    /// teardown, never a crash.
    #[error("stream error: {0}")]
    StreamError(String),
}

/// A malformed inbound audio payload.
///
/// A single bad frame is dropped and logged; the call continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(String),

    /// 16-bit PCM must arrive as an even number of bytes.
    #[error("PCM payload has odd byte length ({0})")]
    OddLength(usize),

    #[error("empty PCM payload")]
    Empty,
}
