//! Command-line entry point
//!
//! Starts one live conversation on the default microphone and speakers and
//! prints both transcripts as they stream in. Ctrl-C ends the conversation
//! gracefully. Requires `GEMINI_API_KEY` in the environment (or a `.env`
//! file).

use tracing_subscriber::EnvFilter;

use nia_live::audio::{start_capture, CpalSink, PlaybackSink};
use nia_live::live::CaptureDevice;
use nia_live::{
    AppSettings, ControllerConfig, MemoryStore, Phase, SessionController, SessionUpdate,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_key = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => {
            eprintln!("GEMINI_API_KEY is not set. Export it or add it to a .env file.");
            std::process::exit(1);
        }
    };

    let settings = match nia_live::settings::default_settings_path() {
        Some(path) => nia_live::settings::load_settings(&path),
        None => AppSettings::default(),
    };

    let memory = match MemoryStore::default_path() {
        Some(path) => MemoryStore::load_from(path),
        None => {
            eprintln!("Could not determine a config directory.");
            std::process::exit(1);
        }
    };
    if !memory.is_empty() {
        println!("Loaded {} remembered facts.", memory.len());
    }

    let config = ControllerConfig {
        api_key,
        settings,
        sink_factory: Box::new(|| {
            CpalSink::open().map(|sink| Box::new(sink) as Box<dyn PlaybackSink>)
        }),
        capture_factory: Box::new(|blocks_tx| {
            start_capture(blocks_tx).map(|handle| Box::new(handle) as Box<dyn CaptureDevice>)
        }),
        // No camera wired into the command line; sessions run audio-only
        camera_factory: Box::new(|| Ok(None)),
    };

    let (controller, handle, mut updates) = SessionController::new(config, memory);
    let controller_task = tokio::spawn(controller.run());

    println!("Starting live conversation (Ctrl-C to end)...");
    handle.start().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nEnding conversation...");
                handle.stop().await;
            }
            update = updates.recv() => match update {
                Some(SessionUpdate::Phase(Phase::Connecting)) => {
                    println!("Connecting...");
                }
                Some(SessionUpdate::Phase(Phase::Connected)) => {
                    println!("Connected. Say something!");
                }
                Some(SessionUpdate::Phase(Phase::Closing)) => {}
                Some(SessionUpdate::Phase(Phase::Idle)) => {
                    // The session ended, cleanly or not
                    break;
                }
                Some(SessionUpdate::UserTranscript(text)) => {
                    println!("you: {}", text);
                }
                Some(SessionUpdate::NiaTranscript(text)) => {
                    println!("nia: {}", text);
                }
                Some(SessionUpdate::MemorySaved(fact)) => {
                    println!("(remembered: {})", fact);
                }
                Some(SessionUpdate::Error(error)) => {
                    eprintln!("{}", error);
                }
                None => break,
            }
        }
    }

    drop(handle);
    let _ = controller_task.await;
    println!("Goodbye.");
}
