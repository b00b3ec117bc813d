//! Realtime live-conversation module
//!
//! Everything needed for a bidirectional audio+video session with the live
//! API: wire protocol types, the WebSocket transport, the session state
//! machine, the capture pipeline, and the controller that wires them all
//! together.
//!
//! # Architecture
//!
//! ```text
//! Microphone ──channel──▶ CapturePipeline ──▶ LiveClient (WebSocket)
//!                                                   │
//!                              Camera ─1 Hz JPEG────┘
//!                                                   │
//!                                                   ▼
//!                        SessionController dispatch (in arrival order)
//!                          ├─ tool calls  → memory + synchronous response
//!                          ├─ inline audio → PlaybackScheduler
//!                          ├─ interrupted → flush playback
//!                          └─ transcripts → transcript buffers
//! ```
//!
//! # Teardown
//!
//! `stop()` is idempotent and never fails: every release step is guarded
//! independently, and stale callbacks are dropped by session-id checks.

mod client;
mod controller;
mod protocol;
mod state;
mod streamer;
mod transcript;

pub use client::{LiveClient, TransportEvent};
pub use controller::{
    CameraFactory, CaptureDevice, CaptureFactory, ControllerConfig, LiveHandle, Phase,
    SessionController, SessionUpdate, SinkFactory,
};
pub use protocol::{
    ClientMessage, FunctionCall, FunctionResponse, ServerContent, ServerMessage, SetupConfig,
    ToolCallMsg, AUDIO_INPUT_MIME, DEFAULT_MODEL, IMAGE_MIME, SAVE_MEMORY_TOOL,
};
pub use state::{reduce, Effect, Event, State};
pub use streamer::{run_video_snapshots, CapturePipeline, FrameSource, CAPTURE_TARGET_RATE};
pub use transcript::TranscriptBuffers;

/// Errors surfaced to the user from a live session.
///
/// Each variant maps to a distinct user-facing message; all of them end the
/// session via a full teardown.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveError {
    /// Microphone, camera, or speaker unavailable or permission denied.
    DeviceAccess(String),
    /// API key or model entity rejected.
    Auth(String),
    /// Rate limit reached; no automatic retry.
    QuotaExhausted(String),
    /// Any other transport failure.
    Connectivity(String),
}

impl std::fmt::Display for LiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveError::DeviceAccess(e) => {
                write!(f, "Microphone or camera unavailable: {}. Check permissions and try again.", e)
            }
            LiveError::Auth(_) => {
                write!(
                    f,
                    "The live service rejected your credentials. Re-select your API key and try again."
                )
            }
            LiveError::QuotaExhausted(_) => {
                write!(f, "Rate limit reached. Wait a moment before starting a new conversation.")
            }
            LiveError::Connectivity(e) => {
                write!(f, "Could not reach the live service: {}", e)
            }
        }
    }
}

impl std::error::Error for LiveError {}

/// Classify a transport error by message content.
///
/// The live API reports failures as free-form close/error messages, so the
/// taxonomy is keyed on substrings: credential problems invite re-selecting
/// the key, quota exhaustion tells the user to wait, everything else is a
/// generic connectivity failure.
pub fn classify_transport_error(message: &str) -> LiveError {
    let lower = message.to_lowercase();

    if lower.contains("api key")
        || lower.contains("api_key")
        || lower.contains("unauthorized")
        || lower.contains("unauthenticated")
        || lower.contains("401")
        || lower.contains("403")
        || lower.contains("not found")
        || lower.contains("not_found")
    {
        LiveError::Auth(message.to_string())
    } else if lower.contains("429")
        || lower.contains("quota")
        || lower.contains("resource_exhausted")
        || lower.contains("rate limit")
    {
        LiveError::QuotaExhausted(message.to_string())
    } else {
        LiveError::Connectivity(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth_errors() {
        assert!(matches!(
            classify_transport_error("Invalid API key provided"),
            LiveError::Auth(_)
        ));
        assert!(matches!(
            classify_transport_error("model entity was not found"),
            LiveError::Auth(_)
        ));
        assert!(matches!(
            classify_transport_error("HTTP 403 Forbidden"),
            LiveError::Auth(_)
        ));
    }

    #[test]
    fn test_classify_quota_errors() {
        assert!(matches!(
            classify_transport_error("status 429: too many requests"),
            LiveError::QuotaExhausted(_)
        ));
        assert!(matches!(
            classify_transport_error("RESOURCE_EXHAUSTED"),
            LiveError::QuotaExhausted(_)
        ));
    }

    #[test]
    fn test_classify_everything_else_as_connectivity() {
        assert!(matches!(
            classify_transport_error("connection reset by peer"),
            LiveError::Connectivity(_)
        ));
        assert!(matches!(
            classify_transport_error(""),
            LiveError::Connectivity(_)
        ));
    }

    #[test]
    fn test_error_messages_are_distinct() {
        let auth = LiveError::Auth("x".into()).to_string();
        let quota = LiveError::QuotaExhausted("x".into()).to_string();
        let conn = LiveError::Connectivity("x".into()).to_string();
        let device = LiveError::DeviceAccess("x".into()).to_string();

        assert_ne!(auth, quota);
        assert_ne!(auth, conn);
        assert_ne!(quota, conn);
        assert_ne!(device, conn);
    }
}
