use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

use super::encoder::AudioChunk;

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Duration of each WAV chunk in seconds (default: 300 = 5 minutes)
    pub chunk_duration_secs: u64,
    /// Output directory for chunks
    pub output_dir: PathBuf,
    /// Session ID (used for chunk filenames)
    pub session_id: String,
}

impl RecorderConfig {
    pub fn new(session_id: String, output_dir: PathBuf) -> Self {
        Self {
            chunk_duration_secs: 300,
            output_dir,
            session_id,
        }
    }
}

/// Metadata for a single recorded chunk
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    /// Chunk number (0-indexed)
    pub chunk_index: usize,
    /// File path to the chunk
    pub file_path: PathBuf,
    /// Start offset in milliseconds since recording began
    pub start_ms: u64,
    /// End offset in milliseconds since recording began
    pub end_ms: u64,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of samples in this chunk
    pub sample_count: usize,
}

/// Chunked consultation recorder
///
/// Persists the caller's side of a consultation (the encoded 16 kHz mono
/// stream, exactly what is transmitted) to disk in fixed-duration WAV
/// chunks. Offsets are derived from sample counts, so recordings stay
/// accurate regardless of wall-clock jitter.
pub struct CallRecorder {
    config: RecorderConfig,
    current_chunk: Option<ChunkWriter>,
    chunk_index: usize,
    samples_written: u64,
    completed: Vec<ChunkMetadata>,
}

impl CallRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir).context("Failed to create recording directory")?;

        info!(
            "Call recorder initialized: {} (chunks: {}s each)",
            config.session_id, config.chunk_duration_secs
        );

        Ok(Self {
            config,
            current_chunk: None,
            chunk_index: 0,
            samples_written: 0,
            completed: Vec::new(),
        })
    }

    /// Append one transmitted chunk to the recording, rotating WAV files
    /// when the configured chunk duration is exceeded.
    pub fn append(&mut self, chunk: &AudioChunk) -> Result<()> {
        if self.should_rotate(chunk.sample_rate) {
            if let Some(writer) = self.current_chunk.take() {
                let meta = writer.finish()?;
                info!(
                    "Recording chunk {} complete: {:.1}s - {:.1}s ({} samples)",
                    meta.chunk_index,
                    meta.start_ms as f64 / 1000.0,
                    meta.end_ms as f64 / 1000.0,
                    meta.sample_count
                );
                self.completed.push(meta);
            }
            self.current_chunk = Some(self.start_new_chunk(chunk.sample_rate)?);
        }

        if let Some(writer) = &mut self.current_chunk {
            writer.write_samples(&chunk.samples)?;
            self.samples_written += chunk.samples.len() as u64;
            writer.metadata.end_ms = offset_ms(self.samples_written, chunk.sample_rate);
        }

        Ok(())
    }

    /// Finalize the in-progress chunk and return metadata for everything
    /// recorded.
    pub fn finish(mut self) -> Result<Vec<ChunkMetadata>> {
        if let Some(writer) = self.current_chunk.take() {
            let meta = writer.finish()?;
            self.completed.push(meta);
        }

        info!(
            "Consultation recording complete: {} chunks saved",
            self.completed.len()
        );

        Ok(self.completed)
    }

    fn should_rotate(&self, sample_rate: u32) -> bool {
        match &self.current_chunk {
            None => true,
            Some(writer) => {
                let elapsed_ms =
                    offset_ms(self.samples_written, sample_rate) - writer.metadata.start_ms;
                elapsed_ms >= self.config.chunk_duration_secs * 1000
            }
        }
    }

    fn start_new_chunk(&mut self, sample_rate: u32) -> Result<ChunkWriter> {
        let path = self.config.output_dir.join(format!(
            "{}-chunk-{:03}.wav",
            self.config.session_id, self.chunk_index
        ));

        let writer = ChunkWriter::new(
            path,
            self.chunk_index,
            offset_ms(self.samples_written, sample_rate),
            sample_rate,
        )?;

        self.chunk_index += 1;

        Ok(writer)
    }
}

fn offset_ms(samples: u64, sample_rate: u32) -> u64 {
    samples * 1000 / u64::from(sample_rate)
}

/// Writes a single chunk to disk as WAV file
struct ChunkWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: ChunkMetadata,
}

impl ChunkWriter {
    fn new(file_path: PathBuf, chunk_index: usize, start_ms: u64, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            metadata: ChunkMetadata {
                chunk_index,
                file_path,
                start_ms,
                end_ms: start_ms,
                sample_rate,
                sample_count: 0,
            },
        })
    }

    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.metadata.sample_count += samples.len();
        }

        Ok(())
    }

    fn finish(mut self) -> Result<ChunkMetadata> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        Ok(self.metadata.clone())
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
