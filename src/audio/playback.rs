use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use super::pcm;
use crate::error::DecodeError;

/// Realizes scheduled audio on an output device.
///
/// The scheduler owns the timeline; the sink owns the hardware. `play`
/// appends samples behind everything already queued (which is exactly the
/// gapless back-to-back schedule the timeline computes), and `stop_all`
/// discards queued and in-flight audio immediately.
pub trait PlaybackSink: Send {
    fn play(&mut self, samples: &[f32]) -> Result<()>;
    fn stop_all(&mut self) -> Result<()>;
}

/// One scheduled stretch of model speech.
#[derive(Debug, Clone)]
pub struct PlaybackSource {
    pub id: u64,
    pub starts_at: Instant,
    pub ends_at: Instant,
    pub sample_count: usize,
}

/// Schedules decoded audio chunks for gapless sequential playback.
///
/// `next_start` is monotonically non-decreasing except on interruption,
/// which resets it to the present: a post-barge-in chunk can never be
/// scheduled into the past, and never overlaps a prior source.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    sample_rate: u32,
    next_start: Option<Instant>,
    active: VecDeque<PlaybackSource>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>, sample_rate: u32) -> Self {
        Self {
            sink,
            sample_rate,
            next_start: None,
            active: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Decode one base64 PCM chunk and schedule it at
    /// `max(next_start, now)`.
    ///
    /// A malformed payload is rejected without touching the timeline; the
    /// caller drops the frame and the call continues.
    pub fn enqueue(&mut self, payload: &str) -> Result<PlaybackSource, DecodeError> {
        let samples = pcm::decode_base64(payload)?;
        let now = Instant::now();

        let starts_at = match self.next_start {
            Some(t) if t > now => t,
            _ => now,
        };
        let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(self.sample_rate));
        let ends_at = starts_at + duration;

        if let Err(e) = self.sink.play(&samples) {
            // Output device trouble should not end the consultation.
            warn!("Playback sink rejected chunk: {}", e);
        }

        let source = PlaybackSource {
            id: self.next_id,
            starts_at,
            ends_at,
            sample_count: samples.len(),
        };
        self.next_id += 1;
        self.next_start = Some(ends_at);
        self.active.push_back(source.clone());

        Ok(source)
    }

    /// Hard barge-in: force-stop and discard every active source and reset
    /// the timeline to now. No more queued audio from the interrupted turn
    /// is played. Returns how many sources were cut off.
    pub fn interrupt(&mut self) -> usize {
        let cut = self.active.len();
        if let Err(e) = self.sink.stop_all() {
            warn!("Playback sink failed to stop: {}", e);
        }
        self.active.clear();
        self.next_start = Some(Instant::now());
        cut
    }

    /// Teardown: force-stop everything and clear the timeline entirely.
    pub fn stop(&mut self) {
        if let Err(e) = self.sink.stop_all() {
            warn!("Playback sink failed to stop: {}", e);
        }
        self.active.clear();
        self.next_start = None;
    }

    /// Remove sources whose scheduled end has passed. Returns how many
    /// completed. Sources leave the active set exactly once: here, or in
    /// `interrupt`/`stop`.
    pub fn reap_completed(&mut self) -> usize {
        let now = Instant::now();
        let mut reaped = 0;
        while matches!(self.active.front(), Some(s) if s.ends_at <= now) {
            self.active.pop_front();
            reaped += 1;
        }
        reaped
    }

    /// Deadline of the earliest active source, for the event loop to sleep
    /// on. Sources are scheduled sequentially, so the front ends first.
    pub fn next_completion(&self) -> Option<Instant> {
        self.active.front().map(|s| s.ends_at)
    }

    /// The AI is speaking iff any source is active.
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_sources(&self) -> usize {
        self.active.len()
    }

    pub fn next_start(&self) -> Option<Instant> {
        self.next_start
    }
}

/// Speaker output backed by cpal.
///
/// Samples pass through a shared queue drained by the device callback on a
/// dedicated thread (the cpal stream is not `Send`). Clearing the queue is
/// what makes `stop_all` effective against in-flight audio.
pub struct CpalSpeaker {
    queue: Arc<Mutex<VecDeque<f32>>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl CpalSpeaker {
    /// Open the default output device at the playback rate (24 kHz mono).
    pub fn new(sample_rate: u32) -> Result<Self> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();
        let thread_queue = Arc::clone(&queue);
        let thread_shutdown = Arc::clone(&shutdown);

        let worker = std::thread::spawn(move || {
            run_speaker_thread(sample_rate, &thread_queue, &ready_tx, &thread_shutdown);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                queue,
                shutdown,
                worker: Some(worker),
            }),
            Ok(Err(message)) => {
                let _ = worker.join();
                anyhow::bail!("audio output unavailable: {message}")
            }
            Err(_) => {
                let _ = worker.join();
                anyhow::bail!("audio output thread exited before reporting readiness")
            }
        }
    }
}

impl PlaybackSink for CpalSpeaker {
    fn play(&mut self, samples: &[f32]) -> Result<()> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| anyhow::anyhow!("playback queue poisoned"))?;
        queue.extend(samples.iter().copied());
        Ok(())
    }

    fn stop_all(&mut self) -> Result<()> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| anyhow::anyhow!("playback queue poisoned"))?;
        queue.clear();
        Ok(())
    }
}

impl Drop for CpalSpeaker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_speaker_thread(
    sample_rate: u32,
    queue: &Arc<Mutex<VecDeque<f32>>>,
    ready_tx: &std::sync::mpsc::Sender<Result<(), String>>,
    shutdown: &AtomicBool,
) {
    let host = cpal::default_host();

    let Some(device) = host.default_output_device() else {
        let _ = ready_tx.send(Err("no output device available".to_string()));
        return;
    };

    let supported = device
        .supported_output_configs()
        .ok()
        .and_then(|mut configs| {
            configs.find(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .map(|c| c.with_sample_rate(SampleRate(sample_rate)));

    // A device that cannot run the playback rate would shift pitch; refuse
    // it rather than play 24 kHz speech at the wrong speed.
    let Some(supported) = supported else {
        let _ = ready_tx.send(Err(format!(
            "no output config supports f32 @ {sample_rate} Hz"
        )));
        return;
    };

    let stream_config = supported.config();
    let channels = stream_config.channels as usize;
    let callback_queue = Arc::clone(queue);

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut queue = match callback_queue.lock() {
                Ok(q) => q,
                Err(_) => return,
            };
            for frame in data.chunks_mut(channels) {
                let sample = queue.pop_front().unwrap_or(0.0);
                for out in frame.iter_mut() {
                    *out = sample;
                }
            }
        },
        |err| {
            warn!("Speaker stream error: {}", err);
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to open output stream: {e}")));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("failed to start output stream: {e}")));
        return;
    }

    info!(
        "Speaker output started ({}Hz, {} channels)",
        stream_config.sample_rate.0, stream_config.channels
    );
    let _ = ready_tx.send(Ok(()));

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    drop(stream);
}
