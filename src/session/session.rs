use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::snapshot::{format_elapsed, ConnectionState, SessionSnapshot};
use super::transcript::{TranscriptAssembler, TranscriptTurn};
use crate::audio::{
    CallRecorder, CaptureBackend, CaptureFrame, EncoderConfig, FrameEncoder, PlaybackScheduler,
    PlaybackSink,
};
use crate::error::SessionError;
use crate::live::{LiveConnection, LiveEvent, LiveTransport, RealtimeInput, ServerMessage};

/// The collaborators a session drives: microphone, streaming endpoint,
/// speaker. Injected so the engine never hardwires device or network
/// specifics.
pub struct SessionDeps {
    pub capture: Box<dyn CaptureBackend>,
    pub transport: Box<dyn LiveTransport>,
    pub sink: Box<dyn PlaybackSink>,
}

enum Command {
    Stop,
}

/// A live voice consultation.
///
/// Owns the connection lifecycle (`Idle → Connecting → Active → Ended`) and
/// routes inbound endpoint events to playback scheduling and transcript
/// assembly. All mutable session state lives in one event-loop task;
/// everything observable crosses over through `SessionShared`.
pub struct VoiceSession {
    config: SessionConfig,
    shared: Arc<SessionShared>,
    deps: Mutex<Option<SessionDeps>>,
    command_tx: Mutex<Option<mpsc::Sender<Command>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

struct SessionShared {
    started_at: chrono::DateTime<chrono::Utc>,
    state: RwLock<ConnectionState>,
    is_ai_speaking: AtomicBool,
    is_user_speaking: AtomicBool,
    elapsed_seconds: AtomicU64,
    transcript: Mutex<TranscriptAssembler>,
    last_error: Mutex<Option<String>>,
}

impl SessionShared {
    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    async fn fail(&self, error: &SessionError) {
        *self.last_error.lock().await = Some(error.to_string());
        self.set_state(ConnectionState::Ended).await;
    }
}

impl VoiceSession {
    /// Create a session in `Idle`. Nothing is opened until `start()`.
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        Self {
            config,
            shared: Arc::new(SessionShared {
                started_at: Utc::now(),
                state: RwLock::new(ConnectionState::Idle),
                is_ai_speaking: AtomicBool::new(false),
                is_user_speaking: AtomicBool::new(false),
                elapsed_seconds: AtomicU64::new(0),
                transcript: Mutex::new(TranscriptAssembler::new()),
                last_error: Mutex::new(None),
            }),
            deps: Mutex::new(Some(deps)),
            command_tx: Mutex::new(None),
            loop_handle: Mutex::new(None),
        }
    }

    /// Start the consultation: request the microphone, open the streaming
    /// connection, and hand both to the session event loop.
    ///
    /// Returns once the connection attempt resolves; the transition to
    /// `Active` happens when the endpoint acknowledges setup. On failure
    /// the session ends immediately and the error is surfaced. Nothing is
    /// retried.
    pub async fn start(&self) -> Result<(), SessionError> {
        {
            let state = self.shared.state.read().await;
            if *state != ConnectionState::Idle {
                warn!("Session already started (state: {:?})", *state);
                return Ok(());
            }
        }

        let Some(mut deps) = self.deps.lock().await.take() else {
            warn!("Session dependencies already consumed");
            return Ok(());
        };

        info!("Starting consultation session: {}", self.config.session_id);
        self.shared.set_state(ConnectionState::Connecting).await;

        // Microphone first: denied access aborts start before any network
        // traffic.
        let capture_rx = match deps.capture.start().await {
            Ok(rx) => rx,
            Err(e) => {
                error!("Microphone unavailable: {}", e);
                self.shared.fail(&e).await;
                return Err(e);
            }
        };

        let connection = match deps.transport.connect(&self.config.setup).await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to open live stream: {}", e);
                if let Err(stop_err) = deps.capture.stop().await {
                    warn!("Failed to stop capture after connect error: {}", stop_err);
                }
                self.shared.fail(&e).await;
                return Err(e);
            }
        };

        let (command_tx, command_rx) = mpsc::channel(4);
        *self.command_tx.lock().await = Some(command_tx);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let handle = tokio::spawn(run_session(
            shared,
            config,
            deps.capture,
            capture_rx,
            connection,
            deps.sink,
            command_rx,
        ));
        *self.loop_handle.lock().await = Some(handle);

        Ok(())
    }

    /// End the consultation. Effective immediately: in-flight playback is
    /// forcibly stopped, capture ends, the stream closes. Idempotent, and
    /// also ends a session that never reached `Active`.
    pub async fn stop(&self) -> SessionSnapshot {
        let command_tx = self.command_tx.lock().await.take();

        match command_tx {
            Some(tx) => {
                info!("Stopping consultation session: {}", self.config.session_id);
                // The loop may already have ended on its own; either way we
                // wait for its teardown to finish.
                let _ = tx.send(Command::Stop).await;
                if let Some(handle) = self.loop_handle.lock().await.take() {
                    if let Err(e) = handle.await {
                        error!("Session task panicked: {}", e);
                    }
                }
            }
            None => {
                // Never started (or already stopped): Ended is still the
                // terminal state for a non-terminal session.
                self.shared.set_state(ConnectionState::Ended).await;
            }
        }

        self.snapshot().await
    }

    /// Current UI-observable state.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = *self.shared.state.read().await;
        let transcript = self.shared.transcript.lock().await;
        let elapsed = self.shared.elapsed_seconds.load(Ordering::SeqCst);

        SessionSnapshot {
            session_id: self.config.session_id.clone(),
            state,
            is_ai_speaking: self.shared.is_ai_speaking.load(Ordering::SeqCst),
            is_user_speaking: self.shared.is_user_speaking.load(Ordering::SeqCst),
            elapsed_seconds: elapsed,
            elapsed_display: format_elapsed(elapsed),
            transcript: transcript.to_turns(),
            current_user_partial: transcript.user_partial().to_string(),
            current_ai_partial: transcript.ai_partial().to_string(),
            last_error: self.shared.last_error.lock().await.clone(),
            started_at: self.shared.started_at,
        }
    }

    /// Finalized conversation log so far.
    pub async fn transcript(&self) -> Vec<TranscriptTurn> {
        self.shared.transcript.lock().await.to_turns()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }
}

/// The session event loop.
///
/// Single owner of the playback scheduler and the capture pump; every
/// inbound event, timer tick and completion deadline is serviced from this
/// one task, so scheduler state is never touched concurrently.
async fn run_session(
    shared: Arc<SessionShared>,
    config: SessionConfig,
    mut capture: Box<dyn CaptureBackend>,
    capture_rx: mpsc::Receiver<CaptureFrame>,
    connection: LiveConnection,
    sink: Box<dyn PlaybackSink>,
    mut command_rx: mpsc::Receiver<Command>,
) {
    let LiveConnection { mut events, input } = connection;

    // Connecting: nothing is routed until the endpoint acknowledges setup.
    loop {
        tokio::select! {
            _ = command_rx.recv() => {
                info!("Stop requested before the stream opened");
                if let Err(e) = capture.stop().await {
                    warn!("Failed to stop capture: {}", e);
                }
                shared.set_state(ConnectionState::Ended).await;
                return;
            }
            event = events.recv() => match event {
                Some(LiveEvent::Opened) => break,
                Some(LiveEvent::Message(_)) => {
                    // Not Active yet; audio before open is not routed.
                }
                Some(LiveEvent::Error(e)) => {
                    let failure = SessionError::ConnectionFailed(e);
                    if let Err(stop_err) = capture.stop().await {
                        warn!("Failed to stop capture: {}", stop_err);
                    }
                    shared.fail(&failure).await;
                    return;
                }
                Some(LiveEvent::Closed) | None => {
                    let failure = SessionError::ConnectionFailed(
                        "stream closed before setup completed".to_string(),
                    );
                    if let Err(stop_err) = capture.stop().await {
                        warn!("Failed to stop capture: {}", stop_err);
                    }
                    shared.fail(&failure).await;
                    return;
                }
            }
        }
    }

    shared.set_state(ConnectionState::Active).await;
    info!("Consultation active: {}", config.session_id);

    // Microphone pump: capture → encode → one send per frame.
    let encoder = FrameEncoder::new(EncoderConfig {
        target_sample_rate: config.capture_sample_rate,
        frame_samples: config.frame_samples,
    });
    let recorder = config.recording.clone().and_then(|cfg| {
        CallRecorder::new(cfg)
            .map_err(|e| warn!("Recording disabled: {}", e))
            .ok()
    });
    let capture_task = tokio::spawn(pump_capture(capture_rx, encoder, recorder, input));
    let capture_abort = capture_task.abort_handle();

    let mut scheduler = PlaybackScheduler::new(sink, config.playback_sample_rate);
    let mut tick = tokio::time::interval_at(
        Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );
    let mut user_speech_deadline: Option<Instant> = None;
    let mut exit_error: Option<SessionError> = None;

    loop {
        let completion = scheduler.next_completion();
        // Placeholder deadline for disabled branches; never polled.
        let far = Instant::now() + Duration::from_secs(3600);

        tokio::select! {
            _ = command_rx.recv() => break,
            event = events.recv() => match event {
                Some(LiveEvent::Message(message)) => {
                    handle_server_message(
                        message,
                        &mut scheduler,
                        &shared,
                        &config,
                        &mut user_speech_deadline,
                    )
                    .await;
                }
                Some(LiveEvent::Error(e)) => {
                    error!("Live stream error: {}", e);
                    exit_error = Some(SessionError::StreamError(e));
                    break;
                }
                Some(LiveEvent::Closed) | None => {
                    info!("Live stream closed by the endpoint");
                    break;
                }
                Some(LiveEvent::Opened) => {}
            },
            _ = tick.tick() => {
                shared.elapsed_seconds.fetch_add(1, Ordering::SeqCst);
            }
            _ = tokio::time::sleep_until(completion.unwrap_or(far)), if completion.is_some() => {
                scheduler.reap_completed();
                if !scheduler.is_speaking() {
                    shared.is_ai_speaking.store(false, Ordering::SeqCst);
                }
            }
            _ = tokio::time::sleep_until(user_speech_deadline.unwrap_or(far)),
                if user_speech_deadline.is_some() =>
            {
                shared.is_user_speaking.store(false, Ordering::SeqCst);
                user_speech_deadline = None;
            }
        }
    }

    // Teardown: force-stop playback, end capture, close the stream. The
    // session object is terminal from here on.
    if let Some(e) = exit_error {
        *shared.last_error.lock().await = Some(e.to_string());
    }

    scheduler.stop();
    shared.is_ai_speaking.store(false, Ordering::SeqCst);
    shared.is_user_speaking.store(false, Ordering::SeqCst);

    if let Err(e) = capture.stop().await {
        warn!("Failed to stop capture: {}", e);
    }
    // Stopping capture closes the frame stream; the pump drains, finalizes
    // the recorder, and drops the outbound lane, closing the stream.
    match tokio::time::timeout(Duration::from_secs(1), capture_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Capture pump panicked: {}", e),
        Err(_) => {
            warn!("Capture pump did not drain in time; aborting");
            capture_abort.abort();
        }
    }

    shared.elapsed_seconds.store(0, Ordering::SeqCst);
    shared.set_state(ConnectionState::Ended).await;
    info!("Consultation ended: {}", config.session_id);
}

/// Forward capture frames to the endpoint as fixed-size encoded chunks,
/// recording the transmitted stream when enabled.
async fn pump_capture(
    mut frames: mpsc::Receiver<CaptureFrame>,
    mut encoder: FrameEncoder,
    mut recorder: Option<CallRecorder>,
    input: mpsc::Sender<RealtimeInput>,
) {
    'pump: while let Some(frame) = frames.recv().await {
        for chunk in encoder.push(&frame) {
            if let Some(mut rec) = recorder.take() {
                match rec.append(&chunk) {
                    Ok(()) => recorder = Some(rec),
                    Err(e) => warn!("Recording write failed, disabling recording: {}", e),
                }
            }

            let message = RealtimeInput::audio(chunk.base64_payload(), chunk.sample_rate);
            if input.send(message).await.is_err() {
                // Outbound lane closed; nothing left to transmit to.
                break 'pump;
            }
        }
    }

    if let Some(rec) = recorder {
        match rec.finish() {
            Ok(chunks) => info!("Saved {} recording chunk(s)", chunks.len()),
            Err(e) => warn!("Failed to finalize recording: {}", e),
        }
    }
    // `input` drops here, closing the outbound lane.
}

/// Route one inbound server message. Each field is independent; a message
/// may carry any subset.
async fn handle_server_message(
    message: ServerMessage,
    scheduler: &mut PlaybackScheduler,
    shared: &SessionShared,
    config: &SessionConfig,
    user_speech_deadline: &mut Option<Instant>,
) {
    let Some(content) = message.server_content else {
        return;
    };

    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            let Some(inline) = part.inline_data else {
                continue;
            };
            match scheduler.enqueue(&inline.data) {
                Ok(_) => {
                    shared.is_ai_speaking.store(true, Ordering::SeqCst);
                }
                Err(e) => {
                    // One bad frame never tears down the call.
                    warn!("Dropping undecodable audio frame: {}", e);
                }
            }
        }
    }

    if let Some(delta) = content.input_transcription {
        shared
            .transcript
            .lock()
            .await
            .push_user_partial(&delta.text);
        shared.is_user_speaking.store(true, Ordering::SeqCst);
        *user_speech_deadline = Some(Instant::now() + config.user_speech_debounce);
    }

    if let Some(delta) = content.output_transcription {
        shared.transcript.lock().await.push_ai_partial(&delta.text);
    }

    if content.turn_complete {
        shared.transcript.lock().await.finalize_turn();
        shared.is_user_speaking.store(false, Ordering::SeqCst);
        *user_speech_deadline = None;
    }

    if content.interrupted {
        // Hard barge-in: discard queued audio and the half-spoken reply.
        let cut = scheduler.interrupt();
        shared.is_ai_speaking.store(false, Ordering::SeqCst);
        shared.transcript.lock().await.discard_ai_partial();
        info!("Barge-in: stopped {} playback source(s)", cut);
    }
}
