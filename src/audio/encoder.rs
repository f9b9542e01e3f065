use super::capture::CaptureFrame;
use super::pcm;

/// A fixed-size block of transmit-ready PCM.
///
/// Immutable once produced; ownership moves from the encoder to the
/// transport (and, when recording is on, a copy of the samples to the call
/// recorder).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Signed 16-bit mono samples.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Base64-encoded little-endian payload for the wire.
    pub fn base64_payload(&self) -> String {
        pcm::encode_base64(&self.samples)
    }

    /// MIME type declaring the PCM rate, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

/// Encoder configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Output sample rate (the endpoint expects 16 kHz).
    pub target_sample_rate: u32,
    /// Samples per outbound chunk. ~4096 at 16 kHz is a quarter second,
    /// small enough for conversational latency.
    pub frame_samples: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: pcm::CAPTURE_SAMPLE_RATE,
            frame_samples: 4096,
        }
    }
}

/// Turns device-rate capture frames into fixed-size 16 kHz mono i16 chunks.
///
/// Work per call is proportional to the pushed frame, never to the whole
/// clip: samples are downsampled, converted and buffered, and every full
/// `frame_samples` window is drained as one chunk. Each emitted chunk
/// corresponds to exactly one transport send.
#[derive(Debug)]
pub struct FrameEncoder {
    config: EncoderConfig,
    pending: Vec<f32>,
    chunks_emitted: u64,
}

impl FrameEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            chunks_emitted: 0,
        }
    }

    /// Feed one capture frame; returns every chunk completed by it.
    pub fn push(&mut self, frame: &CaptureFrame) -> Vec<AudioChunk> {
        let mono = pcm::to_mono(&frame.samples, frame.channels);
        let resampled = pcm::downsample(&mono, frame.sample_rate, self.config.target_sample_rate);
        self.pending.extend_from_slice(&resampled);

        let mut out = Vec::new();
        while self.pending.len() >= self.config.frame_samples {
            let window: Vec<f32> = self.pending.drain(..self.config.frame_samples).collect();
            out.push(self.chunk_from(&window));
        }
        out
    }

    /// Drain whatever is buffered as a final short chunk, if anything.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            return None;
        }
        let window: Vec<f32> = self.pending.drain(..).collect();
        Some(self.chunk_from(&window))
    }

    /// Total chunks produced so far.
    pub fn chunks_emitted(&self) -> u64 {
        self.chunks_emitted
    }

    fn chunk_from(&mut self, window: &[f32]) -> AudioChunk {
        self.chunks_emitted += 1;
        AudioChunk {
            samples: window.iter().map(|&s| pcm::f32_to_i16(s)).collect(),
            sample_rate: self.config.target_sample_rate,
        }
    }
}
