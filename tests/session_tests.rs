// Scenario tests for the session state machine, run against in-process
// fakes for the microphone, the streaming endpoint, and the speaker. Time
// is paused so the call timer and debounce behave deterministically.

use std::sync::{Arc, Mutex as StdMutex};

use mitra_voice::audio::pcm;
use mitra_voice::live::{LiveConnection, LiveEvent, LiveTransport, RealtimeInput, SessionSetup};
use mitra_voice::{
    CaptureBackend, CaptureFrame, ConnectionState, PlaybackSink, Role, SessionConfig, SessionDeps,
    SessionError, VoiceSession,
};
use tokio::sync::mpsc;
use tokio::time::Duration;

// ============================================================================
// Fakes
// ============================================================================

struct FakeCapture {
    rx: Option<mpsc::Receiver<CaptureFrame>>,
    tx: Option<mpsc::Sender<CaptureFrame>>,
}

impl FakeCapture {
    /// The returned sender feeds frames into the session; dropping it (and
    /// the fake's own copy, on `stop`) ends the capture stream.
    fn new() -> (Self, mpsc::Sender<CaptureFrame>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                rx: Some(rx),
                tx: Some(tx.clone()),
            },
            tx,
        )
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FakeCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>, SessionError> {
        self.rx
            .take()
            .ok_or_else(|| SessionError::MicrophoneUnavailable("already started".to_string()))
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.tx.take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "fake-capture"
    }
}

struct DeniedMicrophone;

#[async_trait::async_trait]
impl CaptureBackend for DeniedMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>, SessionError> {
        Err(SessionError::MicrophoneUnavailable(
            "permission denied".to_string(),
        ))
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "denied-microphone"
    }
}

struct FakeTransport {
    connection: StdMutex<Option<LiveConnection>>,
}

fn fake_transport() -> (
    FakeTransport,
    mpsc::Sender<LiveEvent>,
    mpsc::Receiver<RealtimeInput>,
) {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (input_tx, input_rx) = mpsc::channel(64);
    (
        FakeTransport {
            connection: StdMutex::new(Some(LiveConnection {
                events: event_rx,
                input: input_tx,
            })),
        },
        event_tx,
        input_rx,
    )
}

#[async_trait::async_trait]
impl LiveTransport for FakeTransport {
    async fn connect(&mut self, _setup: &SessionSetup) -> Result<LiveConnection, SessionError> {
        self.connection
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SessionError::ConnectionFailed("transport already consumed".to_string()))
    }
}

struct RefusingTransport;

#[async_trait::async_trait]
impl LiveTransport for RefusingTransport {
    async fn connect(&mut self, _setup: &SessionSetup) -> Result<LiveConnection, SessionError> {
        Err(SessionError::ConnectionFailed(
            "endpoint refused".to_string(),
        ))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SinkCall {
    Play(usize),
    StopAll,
}

#[derive(Clone, Default)]
struct RecordingSink {
    calls: Arc<StdMutex<Vec<SinkCall>>>,
}

impl PlaybackSink for RecordingSink {
    fn play(&mut self, samples: &[f32]) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Play(samples.len()));
        Ok(())
    }

    fn stop_all(&mut self) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(SinkCall::StopAll);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    session: VoiceSession,
    events: mpsc::Sender<LiveEvent>,
    outbound: mpsc::Receiver<RealtimeInput>,
    sink_calls: Arc<StdMutex<Vec<SinkCall>>>,
    capture_tx: mpsc::Sender<CaptureFrame>,
}

fn harness() -> Harness {
    let (capture, capture_tx) = FakeCapture::new();
    let (transport, events, outbound) = fake_transport();
    let sink = RecordingSink::default();
    let sink_calls = Arc::clone(&sink.calls);

    let session = VoiceSession::new(
        SessionConfig::default(),
        SessionDeps {
            capture: Box::new(capture),
            transport: Box::new(transport),
            sink: Box::new(sink),
        },
    );

    Harness {
        session,
        events,
        outbound,
        sink_calls,
        capture_tx,
    }
}

/// Let the session loop service everything queued so far.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn start_active(h: &Harness) {
    h.session.start().await.expect("start");
    h.events.send(LiveEvent::Opened).await.unwrap();
    settle().await;
    assert_eq!(h.session.state().await, ConnectionState::Active);
}

fn server_message(content: serde_json::Value) -> LiveEvent {
    LiveEvent::Message(
        serde_json::from_value(serde_json::json!({ "serverContent": content })).unwrap(),
    )
}

/// Model audio frame carrying `n` samples (n / 24000 seconds).
fn audio_frame(n: usize) -> LiveEvent {
    server_message(serde_json::json!({
        "modelTurn": {
            "parts": [
                { "inlineData": { "data": pcm::encode_base64(&vec![0i16; n]),
                                  "mimeType": "audio/pcm;rate=24000" } }
            ]
        }
    }))
}

fn input_transcription(text: &str) -> LiveEvent {
    server_message(serde_json::json!({ "inputTranscription": { "text": text } }))
}

fn output_transcription(text: &str) -> LiveEvent {
    server_message(serde_json::json!({ "outputTranscription": { "text": text } }))
}

fn turn_complete() -> LiveEvent {
    server_message(serde_json::json!({ "turnComplete": true }))
}

fn interrupted() -> LiveEvent {
    server_message(serde_json::json!({ "interrupted": true }))
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_open_transitions_to_active_and_timer_runs() {
    let h = harness();

    assert_eq!(h.session.state().await, ConnectionState::Idle);
    h.session.start().await.expect("start");
    h.events.send(LiveEvent::Opened).await.unwrap();
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.state, ConnectionState::Active);
    assert_eq!(snapshot.elapsed_seconds, 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.elapsed_seconds, 1);
    assert_eq!(snapshot.elapsed_display, "0:01");
}

#[tokio::test(start_paused = true)]
async fn test_denied_microphone_aborts_start() {
    let (transport, _events, _outbound) = fake_transport();
    let session = VoiceSession::new(
        SessionConfig::default(),
        SessionDeps {
            capture: Box::new(DeniedMicrophone),
            transport: Box::new(transport),
            sink: Box::new(RecordingSink::default()),
        },
    );

    let err = session.start().await.expect_err("start must fail");
    assert!(matches!(err, SessionError::MicrophoneUnavailable(_)));

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ConnectionState::Ended);
    assert!(snapshot
        .last_error
        .unwrap()
        .contains("microphone unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_refused_connection_ends_session() {
    let (capture, _tx) = FakeCapture::new();
    let session = VoiceSession::new(
        SessionConfig::default(),
        SessionDeps {
            capture: Box::new(capture),
            transport: Box::new(RefusingTransport),
            sink: Box::new(RecordingSink::default()),
        },
    );

    let err = session.start().await.expect_err("start must fail");
    assert!(matches!(err, SessionError::ConnectionFailed(_)));
    assert_eq!(session.state().await, ConnectionState::Ended);
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_playback_forces_teardown() {
    let h = harness();
    start_active(&h).await;

    // Five seconds of model audio is in flight
    h.events.send(audio_frame(120_000)).await.unwrap();
    settle().await;
    assert!(h.session.snapshot().await.is_ai_speaking);

    // Two seconds into the call, still mid-playback
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    let mid_call = h.session.snapshot().await;
    assert!(mid_call.is_ai_speaking);
    assert_eq!(mid_call.elapsed_seconds, 2);

    let snapshot = h.session.stop().await;

    assert_eq!(snapshot.state, ConnectionState::Ended);
    assert_eq!(snapshot.elapsed_seconds, 0, "timer resets on leaving Active");
    assert!(!snapshot.is_ai_speaking);
    assert!(h.sink_calls.lock().unwrap().contains(&SinkCall::StopAll));
}

#[tokio::test(start_paused = true)]
async fn test_stream_error_tears_down_like_stop() {
    let h = harness();
    start_active(&h).await;

    h.events
        .send(LiveEvent::Error("socket reset".to_string()))
        .await
        .unwrap();
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.state, ConnectionState::Ended);
    assert_eq!(snapshot.elapsed_seconds, 0);
    assert!(snapshot.last_error.unwrap().contains("socket reset"));
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_ends_without_error() {
    let h = harness();
    start_active(&h).await;

    h.events.send(LiveEvent::Closed).await.unwrap();
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.state, ConnectionState::Ended);
    assert!(snapshot.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_ended_is_terminal() {
    let h = harness();
    start_active(&h).await;
    h.session.stop().await;

    // A second start on the same object cannot revive it
    h.session.start().await.expect("no-op start");
    assert_eq!(h.session.state().await, ConnectionState::Ended);
}

#[tokio::test(start_paused = true)]
async fn test_audio_before_open_is_not_routed() {
    let h = harness();
    h.session.start().await.expect("start");

    // Audio while still Connecting must not reach the scheduler
    h.events.send(audio_frame(2400)).await.unwrap();
    h.events.send(LiveEvent::Opened).await.unwrap();
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.state, ConnectionState::Active);
    assert!(!snapshot.is_ai_speaking);
    assert!(h.sink_calls.lock().unwrap().is_empty());
}

// ============================================================================
// Inbound routing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_model_audio_drives_speaking_indicator() {
    let h = harness();
    start_active(&h).await;

    // Two 100ms chunks
    h.events.send(audio_frame(2400)).await.unwrap();
    h.events.send(audio_frame(2400)).await.unwrap();
    settle().await;
    assert!(h.session.snapshot().await.is_ai_speaking);

    // Both complete naturally; the indicator clears
    tokio::time::sleep(Duration::from_millis(300)).await;
    settle().await;
    assert!(!h.session.snapshot().await.is_ai_speaking);
}

#[tokio::test(start_paused = true)]
async fn test_interruption_discards_audio_and_partial_reply() {
    let h = harness();
    start_active(&h).await;

    h.events.send(audio_frame(24_000)).await.unwrap();
    h.events.send(audio_frame(24_000)).await.unwrap();
    h.events.send(output_transcription("hel")).await.unwrap();
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert!(snapshot.is_ai_speaking);
    assert_eq!(snapshot.current_ai_partial, "hel");

    h.events.send(interrupted()).await.unwrap();
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert!(!snapshot.is_ai_speaking);
    assert_eq!(snapshot.current_ai_partial, "");
    assert!(
        snapshot.transcript.is_empty(),
        "an interrupted utterance is never transcribed"
    );
    assert!(h.sink_calls.lock().unwrap().contains(&SinkCall::StopAll));
}

#[tokio::test(start_paused = true)]
async fn test_turn_complete_finalizes_user_then_ai() {
    let h = harness();
    start_active(&h).await;

    h.events.send(input_transcription("what ")).await.unwrap();
    h.events.send(input_transcription("pests")).await.unwrap();
    h.events
        .send(output_transcription("use neem oil"))
        .await
        .unwrap();
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.current_user_partial, "what pests");
    assert_eq!(snapshot.current_ai_partial, "use neem oil");
    assert!(snapshot.is_user_speaking);

    h.events.send(turn_complete()).await.unwrap();
    settle().await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.transcript.len(), 2);
    assert_eq!(snapshot.transcript[0].role, Role::User);
    assert_eq!(snapshot.transcript[0].text, "what pests");
    assert_eq!(snapshot.transcript[1].role, Role::Ai);
    assert_eq!(snapshot.transcript[1].text, "use neem oil");
    assert_eq!(snapshot.current_user_partial, "");
    assert_eq!(snapshot.current_ai_partial, "");
    assert!(!snapshot.is_user_speaking);
}

#[tokio::test(start_paused = true)]
async fn test_user_speaking_debounces_after_silence() {
    let h = harness();
    start_active(&h).await;

    h.events.send(input_transcription("hello")).await.unwrap();
    settle().await;
    assert!(h.session.snapshot().await.is_user_speaking);

    // Well past the ~1.5s debounce
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert!(!h.session.snapshot().await.is_user_speaking);
}

#[tokio::test(start_paused = true)]
async fn test_bad_audio_frame_is_dropped_without_ending_the_call() {
    let h = harness();
    start_active(&h).await;

    h.events
        .send(server_message(serde_json::json!({
            "modelTurn": {
                "parts": [ { "inlineData": { "data": "@@garbage@@",
                                             "mimeType": "audio/pcm;rate=24000" } } ]
            }
        })))
        .await
        .unwrap();
    settle().await;

    // Session survives; the next frame plays normally
    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.state, ConnectionState::Active);
    assert!(!snapshot.is_ai_speaking);

    h.events.send(audio_frame(2400)).await.unwrap();
    settle().await;
    assert!(h.session.snapshot().await.is_ai_speaking);
}

// ============================================================================
// Outbound path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_capture_frames_are_encoded_and_sent_once_each() {
    let mut h = harness();
    start_active(&h).await;

    // Exactly one 4096-sample window at the capture rate
    h.capture_tx
        .send(CaptureFrame {
            samples: vec![0.5; 4096],
            sample_rate: 16_000,
            channels: 1,
            timestamp_ms: 0,
        })
        .await
        .unwrap();
    settle().await;

    let sent = h.outbound.try_recv().expect("one frame transmitted");
    assert_eq!(sent.media.mime_type, "audio/pcm;rate=16000");
    let decoded = pcm::decode_base64(&sent.media.data).unwrap();
    assert_eq!(decoded.len(), 4096);

    // No second send for a single frame
    assert!(h.outbound.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_transcript_survives_stop() {
    let h = harness();
    start_active(&h).await;

    h.events.send(input_transcription("namaste")).await.unwrap();
    h.events.send(output_transcription("namaste ji")).await.unwrap();
    h.events.send(turn_complete()).await.unwrap();
    settle().await;

    let snapshot = h.session.stop().await;
    assert_eq!(snapshot.state, ConnectionState::Ended);
    assert_eq!(snapshot.transcript.len(), 2);
    assert_eq!(h.session.transcript().await.len(), 2);
}
