use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::pcm;
use crate::audio::RecorderConfig;
use crate::live::SessionSetup;

/// Configuration for a consultation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "consult-7f3a...")
    pub session_id: String,

    /// Outbound microphone rate (the endpoint expects 16 kHz)
    pub capture_sample_rate: u32,

    /// Inbound model audio rate (the endpoint sends 24 kHz)
    pub playback_sample_rate: u32,

    /// Samples per outbound frame
    pub frame_samples: usize,

    /// How long after the last user partial the "user speaking" indicator
    /// stays lit
    pub user_speech_debounce: Duration,

    /// Endpoint setup: model, voice, language, persona
    pub setup: SessionSetup,

    /// Persist the caller's audio to WAV chunks when set
    #[serde(skip)]
    pub recording: Option<RecorderConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("consult-{}", uuid::Uuid::new_v4()),
            capture_sample_rate: pcm::CAPTURE_SAMPLE_RATE,
            playback_sample_rate: pcm::PLAYBACK_SAMPLE_RATE,
            frame_samples: 4096,
            user_speech_debounce: Duration::from_millis(1500),
            setup: SessionSetup::default(),
            recording: None,
        }
    }
}
