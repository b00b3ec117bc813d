//! Live API protocol types
//!
//! JSON message shapes for the bidirectional live session over WebSocket.
//!
//! # Protocol Overview
//!
//! 1. Connect to the live endpoint with the API key as a query parameter
//! 2. Send `setup` with model, generation config, system instruction, tools
//! 3. Receive `setupComplete`
//! 4. Stream media via `realtimeInput` (base64 chunks with mime tags)
//! 5. Receive `serverContent` (inline audio, transcriptions, interruption and
//!    turn-completion flags) and `toolCall` requests
//! 6. Answer every tool call with a `toolResponse` keyed by the call id
//!
//! Audio in: PCM16 LE mono 16 kHz. Audio out: PCM16 LE mono 24 kHz. Video:
//! JPEG snapshots. All media base64-encoded.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::codec;

/// Live API WebSocket endpoint (API key appended as `?key=`)
pub const LIVE_API_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default live model
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Mime tag for microphone audio sent to the remote
pub const AUDIO_INPUT_MIME: &str = "audio/pcm;rate=16000";

/// Mime prefix for audio received from the remote (24 kHz)
pub const AUDIO_OUTPUT_MIME_PREFIX: &str = "audio/pcm";

/// Mime tag for camera snapshots
pub const IMAGE_MIME: &str = "image/jpeg";

/// Name of the single tool the session exposes: save a user fact to memory
pub const SAVE_MEMORY_TOOL: &str = "save_memory";

// ============================================================================
// Client messages (sent TO the live API)
// ============================================================================

/// Messages sent from client to the live API.
///
/// Externally tagged: each variant serializes as a single-key object, which
/// is exactly the wire shape (`{"setup": {...}}`, `{"realtimeInput": {...}}`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupConfig),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Build a `realtimeInput` chunk from 16 kHz mono PCM samples.
    pub fn audio_chunk(samples: &[i16]) -> Self {
        let bytes = codec::i16_to_bytes(samples);
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: AUDIO_INPUT_MIME.to_string(),
                data: codec::encode_base64(&bytes),
            }],
        })
    }

    /// Build a `realtimeInput` chunk from an encoded JPEG snapshot.
    pub fn video_chunk(jpeg: &[u8]) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: IMAGE_MIME.to_string(),
                data: codec::encode_base64(jpeg),
            }],
        })
    }

    /// Build a `toolResponse` answering the given calls.
    pub fn tool_response(responses: Vec<FunctionResponse>) -> Self {
        Self::ToolResponse(ToolResponse {
            function_responses: responses,
        })
    }
}

/// Session configuration sent as the first message after connecting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub tools: Vec<Tool>,
    /// Request transcription of the user's speech (full-utterance snapshots)
    pub input_audio_transcription: EmptyConfig,
    /// Request transcription of the model's speech (incremental deltas)
    pub output_audio_transcription: EmptyConfig,
}

impl SetupConfig {
    /// Standard audio-out session: the given system prompt, one memory tool,
    /// and the chosen prebuilt voice.
    pub fn new(model: &str, system_prompt: &str, voice_name: &str) -> Self {
        Self {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice_name.to_string(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![Part {
                    text: Some(system_prompt.to_string()),
                    inline_data: None,
                }],
            },
            tools: vec![Tool {
                function_declarations: vec![save_memory_declaration()],
            }],
            input_audio_transcription: EmptyConfig {},
            output_audio_transcription: EmptyConfig {},
        }
    }
}

/// Declaration for the save-memory tool the remote may invoke.
fn save_memory_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: SAVE_MEMORY_TOOL.to_string(),
        description: "Save a short fact about the user to long-term memory. \
                      Use when the user shares something worth remembering."
            .to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "fact": {
                    "type": "STRING",
                    "description": "The fact to remember, phrased as a short sentence."
                }
            },
            "required": ["fact"]
        }),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Marker for "enable with defaults" config sections.
#[derive(Debug, Clone, Serialize)]
pub struct EmptyConfig {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Answer to one remote function invocation, keyed by the call's id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: serde_json::Value,
}

// ============================================================================
// Server messages (received FROM the live API)
// ============================================================================

/// One inbound message. The live API sends objects with exactly one of these
/// fields set; unknown fields are ignored so future message types do not
/// break deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub tool_call: Option<ToolCallMsg>,
    pub go_away: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    /// Remote stopped its utterance early (user barged in): flush playback
    pub interrupted: bool,
    /// Remote finished its turn
    pub turn_complete: bool,
    /// Full-utterance snapshot of the user's speech so far
    pub input_transcription: Option<Transcription>,
    /// Incremental delta of the model's speech
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelTurn {
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<Blob>,
}

impl ServerPart {
    /// Decoded PCM bytes if this part carries inline audio.
    pub fn audio_bytes(&self) -> Option<Vec<u8>> {
        let blob = self.inline_data.as_ref()?;
        if !blob.mime_type.starts_with(AUDIO_OUTPUT_MIME_PREFIX) {
            return None;
        }
        match codec::decode_base64(&blob.data) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("Discarding undecodable audio part: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transcription {
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallMsg {
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}
