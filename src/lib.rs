//! NIA live conversation client
//!
//! A companion-chat client with a realtime audio+video conversation mode:
//! microphone audio and camera snapshots stream up to a generative live API,
//! spoken replies stream back down and are scheduled for gap-free playback.
//! The remote can interrupt itself when the user barges in, transcribe both
//! sides of the conversation, and save facts about the user through a tool
//! call.
//!
//! Layering:
//! - [`codec`]: pure byte/base64/PCM transforms
//! - [`audio`]: CPAL capture and the mixing playback sink
//! - [`live`]: wire protocol, transport, state machine, session controller
//! - [`memory`], [`prompt`], [`settings`]: persisted user state and the
//!   per-session system prompt built from it

pub mod audio;
pub mod codec;
pub mod live;
pub mod memory;
pub mod prompt;
pub mod settings;

pub use live::{
    ControllerConfig, LiveError, LiveHandle, Phase, SessionController, SessionUpdate,
};
pub use memory::MemoryStore;
pub use settings::AppSettings;
