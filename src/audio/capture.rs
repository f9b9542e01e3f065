use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::error::SessionError;

/// A block of microphone samples as delivered by the input device.
///
/// Samples are float PCM in [-1.0, 1.0] at the device's native rate; the
/// frame encoder owns downsampling and int conversion.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Interleaved float samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
    /// Milliseconds since capture started.
    pub timestamp_ms: u64,
}

/// Configuration for microphone capture.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Preferred device sample rate. The device may pick another supported
    /// rate; frames report what was actually used.
    pub preferred_sample_rate: u32,
    /// Preferred channel count.
    pub preferred_channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            preferred_sample_rate: 16_000,
            preferred_channels: 1,
        }
    }
}

/// Microphone capture backend.
///
/// Implementations deliver frames over a channel; dropping the stream closes
/// the channel, which is how consumers observe end-of-capture.
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing audio.
    ///
    /// Returns a channel receiver that will receive capture frames. Fails
    /// with `SessionError::MicrophoneUnavailable` when no usable input
    /// device exists, which aborts session start.
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>, SessionError>;

    /// Stop capturing audio.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing.
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging.
    fn name(&self) -> &str;
}

/// Create the default capture backend for this platform.
pub fn default_backend(config: CaptureConfig) -> Box<dyn CaptureBackend> {
    Box::new(CpalMicrophone::new(config))
}

/// Microphone backend backed by cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread that
/// forwards buffers into a tokio channel.
pub struct CpalMicrophone {
    config: CaptureConfig,
    shutdown: Option<Arc<AtomicBool>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl CpalMicrophone {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            shutdown: None,
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CpalMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>, SessionError> {
        if self.worker.is_some() {
            return Err(SessionError::MicrophoneUnavailable(
                "capture already running".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel::<CaptureFrame>(64);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let config = self.config.clone();

        let worker = std::thread::spawn(move || {
            run_capture_thread(&config, &frame_tx, ready_tx, &shutdown_flag);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.shutdown = Some(shutdown);
                self.worker = Some(worker);
                Ok(frame_rx)
            }
            Ok(Err(message)) => {
                let _ = worker.join();
                Err(SessionError::MicrophoneUnavailable(message))
            }
            Err(_) => {
                let _ = worker.join();
                Err(SessionError::MicrophoneUnavailable(
                    "capture thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.store(true, Ordering::SeqCst);
        }
        if let Some(worker) = self.worker.take() {
            // Join off the async runtime; the thread wakes within one poll
            // interval of the shutdown flag.
            let _ = tokio::task::spawn_blocking(move || worker.join()).await;
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

fn run_capture_thread(
    config: &CaptureConfig,
    frame_tx: &mpsc::Sender<CaptureFrame>,
    ready_tx: oneshot::Sender<Result<(), String>>,
    shutdown: &AtomicBool,
) {
    let host = cpal::default_host();

    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err("no input device available".to_string()));
        return;
    };

    let supported = match pick_input_config(&device, config) {
        Ok(c) => c,
        Err(message) => {
            let _ = ready_tx.send(Err(message));
            return;
        }
    };

    let sample_format = supported.sample_format();
    let stream_config = supported.config();
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;
    let started = Instant::now();

    let tx = frame_tx.clone();
    let on_error = |err: cpal::StreamError| {
        warn!("Microphone stream error: {}", err);
    };

    // The device callback must not block; frames are dropped when the
    // session loop falls behind.
    let build = move |data: Vec<f32>| CaptureFrame {
        samples: data,
        sample_rate,
        channels,
        timestamp_ms: started.elapsed().as_millis() as u64,
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.try_send(build(data.to_vec()));
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let samples = data.iter().map(|&s| super::pcm::i16_to_f32(s)).collect();
                let _ = tx.try_send(build(samples));
            },
            on_error,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(format!("unsupported sample format: {other:?}")));
            return;
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to open input stream: {e}")));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("failed to start input stream: {e}")));
        return;
    }

    info!(
        "Microphone capture started ({}Hz, {} channels)",
        sample_rate, channels
    );
    let _ = ready_tx.send(Ok(()));

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    // Dropping the stream stops the device callback; dropping the last
    // sender clone closes the frame channel.
    drop(stream);
}

fn pick_input_config(
    device: &cpal::Device,
    config: &CaptureConfig,
) -> Result<cpal::SupportedStreamConfig, String> {
    let preferred = SampleRate(config.preferred_sample_rate);

    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| format!("failed to enumerate input configs: {e}"))?
        .collect();

    // Prefer the requested rate and channel count, then any config that can
    // do the requested rate, then whatever the device defaults to.
    let exact = ranges
        .iter()
        .find(|r| {
            r.channels() == config.preferred_channels
                && r.min_sample_rate() <= preferred
                && r.max_sample_rate() >= preferred
        })
        .or_else(|| {
            ranges
                .iter()
                .find(|r| r.min_sample_rate() <= preferred && r.max_sample_rate() >= preferred)
        });

    if let Some(range) = exact {
        return Ok(range.clone().with_sample_rate(preferred));
    }

    device
        .default_input_config()
        .map_err(|e| format!("no usable input config: {e}"))
}
