use serde::{Deserialize, Serialize};

/// One inbound message from the streaming speech endpoint.
///
/// Any subset of the nested fields may be present on a given message; each
/// is handled independently and defensively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    /// Model audio for the current turn.
    pub model_turn: Option<ModelTurn>,
    /// Incremental transcription of the user's speech.
    pub input_transcription: Option<TranscriptionDelta>,
    /// Incremental transcription of the model's speech.
    pub output_transcription: Option<TranscriptionDelta>,
    /// The model finished its response turn.
    pub turn_complete: bool,
    /// The model's speech was cut off by user speech (barge-in).
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    /// Base64-encoded PCM bytes.
    pub data: String,
    /// e.g. `audio/pcm;rate=24000`
    pub mime_type: String,
}

/// A cumulative transcription fragment, not a replacement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionDelta {
    pub text: String,
}

/// Outbound realtime audio, one message per captured frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeInput {
    pub media: MediaChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    /// Base64-encoded PCM bytes.
    pub data: String,
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

impl RealtimeInput {
    pub fn audio(data: String, sample_rate: u32) -> Self {
        Self {
            media: MediaChunk {
                data,
                mime_type: format!("audio/pcm;rate={sample_rate}"),
            },
        }
    }
}

/// Connection setup sent before any audio flows.
///
/// Carries the consultation persona: model, voice, language, and the
/// advisory system instruction. Audio responses plus input and output
/// transcription are always requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSetup {
    pub model: String,
    pub language: String,
    pub voice: String,
    pub system_instruction: String,
}

impl SessionSetup {
    /// Serialize to the endpoint's setup envelope.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "setup": {
                "model": self.model,
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": self.voice }
                        }
                    }
                },
                "systemInstruction": {
                    "parts": [{ "text": self.system_instruction }]
                },
                "inputAudioTranscription": {},
                "outputAudioTranscription": {}
            }
        })
    }
}

impl Default for SessionSetup {
    fn default() -> Self {
        let language = "English".to_string();
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            system_instruction: advisor_instruction(&language),
            language,
            voice: "Puck".to_string(),
        }
    }
}

/// The consultation persona, templated with the caller's language.
pub fn advisor_instruction(language: &str) -> String {
    format!(
        "You are a wise and warm agricultural advisor. Respond ONLY in \
         {language} using simple, conversational language. Always address \
         the farmer with respect. First offer a natural, zero-budget \
         solution; then provide a scientific alternative as a backup. Use \
         regional farming terms in {language}. Agriculture is hard work; \
         be empathetic."
    )
}
