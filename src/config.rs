use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioSettings,
    pub live: LiveSettings,
    pub recording: RecordingSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Outbound microphone rate expected by the endpoint
    pub capture_sample_rate: u32,
    /// Inbound model audio rate
    pub playback_sample_rate: u32,
    /// Samples per outbound frame
    pub frame_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// WebSocket URL of the streaming speech endpoint
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    /// Consultation language, templated into the advisor persona
    pub language: String,
    /// Prebuilt voice name
    pub voice: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub enabled: bool,
    pub output_dir: String,
    pub chunk_duration_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// Suggested openers shown by the UI while the line is quiet
    pub quick_asks: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            audio: AudioSettings::default(),
            live: LiveSettings::default(),
            recording: RecordingSettings::default(),
            ui: UiSettings::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "mitra-voice".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8317,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16_000,
            playback_sample_rate: 24_000,
            frame_samples: 4096,
        }
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent"
                .to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            language: "English".to_string(),
            voice: "Puck".to_string(),
        }
    }
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: "recordings".to_string(),
            chunk_duration_secs: 300,
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            quick_asks: vec![
                "How to make Jeevamrut?".to_string(),
                "Pests on my wheat crop".to_string(),
                "Natural soil tips".to_string(),
                "Current market rates".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
