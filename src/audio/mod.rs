pub mod capture;
pub mod encoder;
pub mod pcm;
pub mod playback;
pub mod recorder;

pub use capture::{default_backend, CaptureBackend, CaptureConfig, CaptureFrame, CpalMicrophone};
pub use encoder::{AudioChunk, EncoderConfig, FrameEncoder};
pub use playback::{CpalSpeaker, PlaybackScheduler, PlaybackSink, PlaybackSource};
pub use recorder::{CallRecorder, ChunkMetadata, RecorderConfig};
