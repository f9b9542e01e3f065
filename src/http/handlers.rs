use super::state::AppState;
use crate::audio::{self, CaptureConfig, CpalSpeaker, RecorderConfig};
use crate::live::{advisor_instruction, SessionSetup, WebSocketTransport};
use crate::session::{ConnectionState, SessionConfig, SessionDeps, SessionSnapshot, VoiceSession};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Consultation language override (default from config)
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub state: ConnectionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub message: String,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Snapshot of the current (or most recent) session, if any
    pub session: Option<SessionSnapshot>,
    /// Suggested openers for the UI to show while the line is quiet
    pub quick_asks: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/session/start
/// Start a new consultation session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("consult-{}", uuid::Uuid::new_v4()));

    info!("Starting consultation: {}", session_id);

    // Check for a session that is still running
    {
        let current = state.session.read().await;
        if let Some(session) = current.as_ref() {
            let s = session.state().await;
            if s == ConnectionState::Connecting || s == ConnectionState::Active {
                return (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse {
                        error: format!(
                            "Session {} is already running",
                            session.session_id()
                        ),
                    }),
                )
                    .into_response();
            }
        }
    }

    let cfg = &state.config;
    let language = req.language.unwrap_or_else(|| cfg.live.language.clone());

    let session_config = SessionConfig {
        session_id: session_id.clone(),
        capture_sample_rate: cfg.audio.capture_sample_rate,
        playback_sample_rate: cfg.audio.playback_sample_rate,
        frame_samples: cfg.audio.frame_samples,
        user_speech_debounce: Duration::from_millis(1500),
        setup: SessionSetup {
            model: cfg.live.model.clone(),
            system_instruction: advisor_instruction(&language),
            language,
            voice: cfg.live.voice.clone(),
        },
        recording: cfg.recording.enabled.then(|| RecorderConfig {
            chunk_duration_secs: cfg.recording.chunk_duration_secs,
            output_dir: PathBuf::from(&cfg.recording.output_dir),
            session_id: session_id.clone(),
        }),
    };

    let api_key = std::env::var(&cfg.live.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        warn!("{} is not set; the endpoint will reject us", cfg.live.api_key_env);
    }

    // Opening the output device handshakes with an audio thread; keep that
    // off the async executor.
    let playback_rate = cfg.audio.playback_sample_rate;
    let sink = match tokio::task::spawn_blocking(move || CpalSpeaker::new(playback_rate)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            error!("Failed to open audio output: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to open audio output: {e}"),
                }),
            )
                .into_response();
        }
        Err(e) => {
            error!("Audio output task failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to open audio output".to_string(),
                }),
            )
                .into_response();
        }
    };

    let deps = SessionDeps {
        capture: audio::default_backend(CaptureConfig {
            preferred_sample_rate: cfg.audio.capture_sample_rate,
            preferred_channels: 1,
        }),
        transport: Box::new(WebSocketTransport::new(cfg.live.endpoint.clone(), api_key)),
        sink: Box::new(sink),
    };

    let session = Arc::new(VoiceSession::new(session_config, deps));

    // Keep the session either way: a failed start still surfaces its error
    // through the status endpoint.
    {
        let mut slot = state.session.write().await;
        *slot = Some(Arc::clone(&session));
    }

    if let Err(e) = session.start().await {
        error!("Failed to start consultation: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response();
    }

    info!("Consultation started: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id,
            state: session.state().await,
            message: "Consultation started".to_string(),
        }),
    )
        .into_response()
}

/// POST /voice/session/stop
/// Stop the running consultation
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    let session = {
        let current = state.session.read().await;
        current.clone()
    };

    match session {
        Some(session) => {
            info!("Stopping consultation: {}", session.session_id());
            let snapshot = session.stop().await;
            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    session_id: session.session_id().to_string(),
                    message: "Consultation ended".to_string(),
                    snapshot,
                }),
            )
                .into_response()
        }
        None => {
            error!("No consultation to stop");
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "No consultation session".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /voice/session/status
/// Observable state for the UI
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let session = {
        let current = state.session.read().await;
        current.clone()
    };

    let snapshot = match session {
        Some(session) => Some(session.snapshot().await),
        None => None,
    };

    (
        StatusCode::OK,
        Json(StatusResponse {
            session: snapshot,
            quick_asks: state.config.ui.quick_asks.clone(),
        }),
    )
        .into_response()
}

/// GET /voice/session/transcript
/// Finalized conversation log (accumulated so far)
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let session = {
        let current = state.session.read().await;
        current.clone()
    };

    match session {
        Some(session) => (StatusCode::OK, Json(session.transcript().await)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No consultation session".to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
