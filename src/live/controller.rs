//! Session controller
//!
//! Owns the session state machine and executes its effects: opening devices
//! and the transport, starting the media pipelines, dispatching inbound
//! server messages, and tearing everything down. All of it runs on one task,
//! so inbound events are processed strictly in arrival order and no locking
//! is needed around the scheduler or transcripts.
//!
//! Effects can produce follow-up events (a failed connect produces
//! `ConnectFailed`); those are fed back through the reducer via a local
//! queue rather than recursion.

use std::collections::VecDeque;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audio::{AudioError, CaptureHandle, PlaybackScheduler, PlaybackSink};
use crate::codec;
use crate::memory::MemoryStore;
use crate::prompt::build_system_prompt;
use crate::settings::AppSettings;

use super::client::{LiveClient, TransportEvent};
use super::protocol::{
    ClientMessage, FunctionCall, FunctionResponse, ServerMessage, SetupConfig, SAVE_MEMORY_TOOL,
};
use super::state::{reduce, Effect, Event, State};
use super::streamer::{run_video_snapshots, CapturePipeline, FrameSource};
use super::transcript::TranscriptBuffers;
use super::LiveError;

/// An open microphone. Dropping it releases the device.
pub trait CaptureDevice: Send {
    /// Native rate of the blocks it produces.
    fn sample_rate(&self) -> u32;
}

impl CaptureDevice for CaptureHandle {
    fn sample_rate(&self) -> u32 {
        CaptureHandle::sample_rate(self)
    }
}

pub type SinkFactory = Box<dyn Fn() -> Result<Box<dyn PlaybackSink>, AudioError> + Send>;
pub type CaptureFactory =
    Box<dyn Fn(mpsc::Sender<Vec<i16>>) -> Result<Box<dyn CaptureDevice>, AudioError> + Send>;
/// Returns `Ok(None)` when no camera is configured (session runs audio-only)
/// and `Err` when a configured camera is denied or unavailable.
pub type CameraFactory = Box<dyn Fn() -> Result<Option<Box<dyn FrameSource>>, String> + Send>;

/// Everything the controller needs to open sessions.
pub struct ControllerConfig {
    pub api_key: String,
    pub settings: AppSettings,
    pub sink_factory: SinkFactory,
    pub capture_factory: CaptureFactory,
    pub camera_factory: CameraFactory,
}

/// Coarse lifecycle phase, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
    Closing,
}

impl From<&State> for Phase {
    fn from(state: &State) -> Self {
        match state {
            State::Idle => Phase::Idle,
            State::Connecting { .. } => Phase::Connecting,
            State::Connected { .. } => Phase::Connected,
            State::Closing { .. } => Phase::Closing,
        }
    }
}

/// Updates surfaced to the frontend.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Phase(Phase),
    /// Full-utterance snapshot of the user's speech
    UserTranscript(String),
    /// NIA's transcript accumulated so far this turn
    NiaTranscript(String),
    /// A fact was saved to memory during the conversation
    MemorySaved(String),
    Error(LiveError),
}

/// Messages driving the controller task.
enum ControllerMsg {
    Lifecycle(Event),
    Inbound { id: Uuid, event: TransportEvent },
}

/// Cloneable handle for starting and stopping conversations.
#[derive(Clone)]
pub struct LiveHandle {
    msg_tx: mpsc::Sender<ControllerMsg>,
}

impl LiveHandle {
    /// Request a new live conversation. No-op if one is already running.
    pub async fn start(&self) {
        let _ = self
            .msg_tx
            .send(ControllerMsg::Lifecycle(Event::StartRequested))
            .await;
    }

    /// End the current conversation. Idempotent.
    pub async fn stop(&self) {
        let _ = self
            .msg_tx
            .send(ControllerMsg::Lifecycle(Event::StopRequested))
            .await;
    }
}

/// Resources held while a session is connecting or connected.
struct SessionResources {
    outbound: mpsc::Sender<ClientMessage>,
    client: Option<LiveClient>,
    scheduler: PlaybackScheduler,
    capture: Option<Box<dyn CaptureDevice>>,
    camera: Option<Box<dyn FrameSource>>,
    /// Handed to the capture pipeline at BeginStreaming
    blocks_rx: Option<mpsc::Receiver<Vec<i16>>>,
    /// Handed to the event pump at BeginStreaming
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
    tasks: Vec<JoinHandle<()>>,
    transcripts: TranscriptBuffers,
}

pub struct SessionController {
    state: State,
    config: ControllerConfig,
    memory: MemoryStore,
    resources: Option<SessionResources>,
    msg_tx: mpsc::Sender<ControllerMsg>,
    msg_rx: mpsc::Receiver<ControllerMsg>,
    updates_tx: mpsc::Sender<SessionUpdate>,
}

impl SessionController {
    pub fn new(
        config: ControllerConfig,
        memory: MemoryStore,
    ) -> (Self, LiveHandle, mpsc::Receiver<SessionUpdate>) {
        let (msg_tx, msg_rx) = mpsc::channel(100);
        let (updates_tx, updates_rx) = mpsc::channel(100);

        let controller = Self {
            state: State::default(),
            config,
            memory,
            resources: None,
            msg_tx: msg_tx.clone(),
            msg_rx,
            updates_tx,
        };

        (controller, LiveHandle { msg_tx }, updates_rx)
    }

    /// Run until every `LiveHandle` is dropped.
    pub async fn run(mut self) {
        while let Some(msg) = self.msg_rx.recv().await {
            match msg {
                ControllerMsg::Lifecycle(event) => self.apply(event).await,
                ControllerMsg::Inbound { id, event } => self.handle_inbound(id, event).await,
            }
        }
        // Handles gone: release whatever is still held
        self.teardown();
        log::debug!("Session controller exiting");
    }

    fn session_id(&self) -> Option<Uuid> {
        match &self.state {
            State::Idle => None,
            State::Connecting { session_id } => Some(*session_id),
            State::Connected { session_id, .. } => Some(*session_id),
            State::Closing { session_id } => Some(*session_id),
        }
    }

    /// Feed an event through the reducer and execute the resulting effects.
    /// Effects may produce follow-up events; those are queued, not recursed.
    async fn apply(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            log::debug!("Event: {:?} in {:?}", event, Phase::from(&self.state));
            let (next, effects) = reduce(&self.state, event);
            self.state = next;

            for effect in effects {
                for follow_up in self.execute(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn handle_inbound(&mut self, id: Uuid, event: TransportEvent) {
        // Stale callbacks from a previous session are dropped here
        if self.session_id() != Some(id) {
            log::trace!("Dropping transport event from stale session {}", id);
            return;
        }

        match event {
            TransportEvent::Message(msg) => {
                if matches!(self.state, State::Connected { .. }) {
                    self.dispatch_server_message(id, msg).await;
                }
            }
            TransportEvent::Error(message) => {
                self.apply(Event::TransportError { id, message }).await;
            }
            TransportEvent::Closed => {
                self.apply(Event::TransportClosed { id }).await;
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Vec<Event> {
        match effect {
            Effect::OpenTransport { id } => match self.open_session().await {
                Ok(resources) => {
                    self.resources = Some(resources);
                    vec![Event::TransportOpen { id }]
                }
                Err(error) => {
                    log::error!("Failed to open session: {}", error);
                    vec![Event::ConnectFailed { id, error }]
                }
            },

            Effect::BeginStreaming { id } => {
                self.begin_streaming(id);
                vec![]
            }

            Effect::Teardown { id } => {
                self.teardown();
                vec![Event::TeardownComplete { id }]
            }

            Effect::NotifyUser { error } => {
                log::error!("Session error: {}", error);
                self.push_update(SessionUpdate::Error(error));
                vec![]
            }

            Effect::EmitState => {
                self.push_update(SessionUpdate::Phase(Phase::from(&self.state)));
                vec![]
            }
        }
    }

    /// Open devices and the transport for a new session.
    ///
    /// Nothing is stored on the controller until every step succeeds;
    /// partially acquired resources are released by drop on the error path.
    async fn open_session(&mut self) -> Result<SessionResources, LiveError> {
        let (blocks_tx, blocks_rx) = mpsc::channel::<Vec<i16>>(64);

        let capture = (self.config.capture_factory)(blocks_tx)
            .map_err(|e| LiveError::DeviceAccess(e.to_string()))?;

        let camera = (self.config.camera_factory)().map_err(LiveError::DeviceAccess)?;

        let sink =
            (self.config.sink_factory)().map_err(|e| LiveError::DeviceAccess(e.to_string()))?;
        let scheduler = PlaybackScheduler::new(sink);

        let settings = &self.config.settings;
        let prompt = build_system_prompt(&settings.language, &self.memory);
        let setup = SetupConfig::new(&settings.model, &prompt, &settings.voice);

        let mut client = LiveClient::connect(&self.config.api_key, setup).await?;
        let events_rx = client.take_events();
        let outbound = client.sender();

        Ok(SessionResources {
            outbound,
            client: Some(client),
            scheduler,
            capture: Some(capture),
            camera,
            blocks_rx: Some(blocks_rx),
            events_rx,
            tasks: Vec::new(),
            transcripts: TranscriptBuffers::new(),
        })
    }

    /// Start the media pipelines and the inbound event pump.
    fn begin_streaming(&mut self, id: Uuid) {
        let Some(resources) = self.resources.as_mut() else {
            log::warn!("BeginStreaming with no session resources");
            return;
        };

        if let Some(events_rx) = resources.events_rx.take() {
            let msg_tx = self.msg_tx.clone();
            resources.tasks.push(tokio::spawn(pump_events(
                id,
                events_rx,
                msg_tx,
            )));
        }

        if let Some(blocks_rx) = resources.blocks_rx.take() {
            let source_rate = resources
                .capture
                .as_ref()
                .map(|c| c.sample_rate())
                .unwrap_or(super::streamer::CAPTURE_TARGET_RATE);
            let pipeline = CapturePipeline::new(blocks_rx, resources.outbound.clone(), source_rate);
            resources.tasks.push(tokio::spawn(pipeline.run()));
        }

        if let Some(camera) = resources.camera.take() {
            resources
                .tasks
                .push(tokio::spawn(run_video_snapshots(
                    camera,
                    resources.outbound.clone(),
                )));
        }

        log::info!("Live session {} streaming", id);
    }

    /// Release everything the session holds. Every step is independently
    /// guarded; failures are logged and never propagate.
    fn teardown(&mut self) {
        let Some(mut resources) = self.resources.take() else {
            return;
        };

        for task in resources.tasks.drain(..) {
            task.abort();
        }

        if let Some(client) = resources.client.take() {
            client.close();
        }

        resources.scheduler.flush();

        // Releases the microphone
        resources.capture.take();

        log::info!("Live session resources released");
    }

    /// Handle one inbound server message, in the order the transport
    /// requires: tool responses first, then media, then transcripts.
    async fn dispatch_server_message(&mut self, id: Uuid, msg: ServerMessage) {
        if let Some(tool_call) = msg.tool_call {
            let (responses, saved_facts) =
                tool_responses_for(&tool_call.function_calls, &mut self.memory);

            // Only announce facts the store actually took; duplicates are
            // acknowledged on the wire but produce no update
            for fact in saved_facts {
                self.push_update(SessionUpdate::MemorySaved(fact));
            }

            // The transport requires a response per call before any later
            // event is considered delivered
            if let Some(resources) = self.resources.as_ref() {
                if resources
                    .outbound
                    .send(ClientMessage::tool_response(responses))
                    .await
                    .is_err()
                {
                    log::warn!("Could not send tool response (transport gone)");
                }
            }
        }

        if let Some(content) = msg.server_content {
            let mut user_text = None;
            let mut nia_text = None;

            if let Some(resources) = self.resources.as_mut() {
                if let Some(turn) = content.model_turn {
                    for part in &turn.parts {
                        if let Some(bytes) = part.audio_bytes() {
                            let samples = codec::pcm16_to_f32(&bytes);
                            resources.scheduler.enqueue(samples);
                        }
                    }
                }

                if content.interrupted {
                    log::debug!("Remote interrupted; flushing playback");
                    resources.scheduler.flush();
                }

                if let Some(transcription) = content.input_transcription {
                    resources.transcripts.set_user(&transcription.text);
                    user_text = Some(resources.transcripts.user().to_string());
                }
                if let Some(transcription) = content.output_transcription {
                    resources.transcripts.append_nia(&transcription.text);
                    nia_text = Some(resources.transcripts.nia().to_string());
                }

                if content.turn_complete {
                    resources.transcripts.clear_nia();
                }
            }

            if let Some(text) = user_text {
                self.push_update(SessionUpdate::UserTranscript(text));
            }
            if let Some(text) = nia_text {
                self.push_update(SessionUpdate::NiaTranscript(text));
            }
        }

        if msg.go_away.is_some() {
            // The server is about to drop us; end the session cleanly
            log::info!("Server sent goAway; closing session");
            self.apply(Event::TransportClosed { id }).await;
        }
    }

    fn push_update(&self, update: SessionUpdate) {
        // A slow frontend never stalls event dispatch
        if self.updates_tx.try_send(update).is_err() {
            log::trace!("Update dropped (frontend not keeping up)");
        }
    }
}

/// Forward transport events to the controller, tagged with their session id.
async fn pump_events(
    id: Uuid,
    mut events_rx: mpsc::Receiver<TransportEvent>,
    msg_tx: mpsc::Sender<ControllerMsg>,
) {
    while let Some(event) = events_rx.recv().await {
        if msg_tx
            .send(ControllerMsg::Inbound { id, event })
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Answer every function call in a batch, mutating memory for save requests.
///
/// Returns the responses together with the facts the store actually accepted.
/// A duplicate fact still gets a "Saved." response (it is in memory either
/// way) but is not reported as newly saved.
fn tool_responses_for(
    calls: &[FunctionCall],
    memory: &mut MemoryStore,
) -> (Vec<FunctionResponse>, Vec<String>) {
    let mut saved = Vec::new();

    let responses = calls
        .iter()
        .map(|call| {
            let response = if call.name == SAVE_MEMORY_TOOL {
                match call.args.get("fact").and_then(|v| v.as_str()) {
                    Some(fact) if !fact.trim().is_empty() => {
                        if memory.save_fact(fact) {
                            saved.push(fact.trim().to_string());
                        }
                        json!({ "output": "Saved." })
                    }
                    _ => json!({ "error": "Missing 'fact' argument." }),
                }
            } else {
                log::warn!("Unknown tool call: {}", call.name);
                json!({ "error": format!("Unknown tool: {}", call.name) })
            };

            FunctionResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response,
            }
        })
        .collect();

    (responses, saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::mock::MockSink;
    use crate::live::protocol::{Blob, ModelTurn, ServerContent, ServerPart, ToolCallMsg, Transcription};
    use std::time::Instant;

    struct FakeMic;
    impl CaptureDevice for FakeMic {
        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    fn test_memory() -> MemoryStore {
        let dir = std::env::temp_dir().join(format!("nia-ctrl-{}", Uuid::new_v4()));
        MemoryStore::load_from(dir.join("memories.json"))
    }

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            api_key: "test-key".to_string(),
            settings: AppSettings::default(),
            sink_factory: Box::new(|| Ok(Box::new(MockSink::default()))),
            capture_factory: Box::new(|_tx| Ok(Box::new(FakeMic) as Box<dyn CaptureDevice>)),
            camera_factory: Box::new(|| Ok(None)),
        }
    }

    /// Controller wired into a fake Connected session, plus handles into its
    /// scheduler sink and outbound channel.
    fn connected_controller() -> (
        SessionController,
        Uuid,
        MockSink,
        mpsc::Receiver<ClientMessage>,
        mpsc::Receiver<SessionUpdate>,
    ) {
        let (controller, _handle, updates_rx) = SessionController::new(test_config(), test_memory());
        let mut controller = controller;

        let id = Uuid::new_v4();
        controller.state = State::Connected {
            session_id: id,
            started_at: Instant::now(),
        };

        let sink = MockSink::default();
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let (_blocks_tx, blocks_rx) = mpsc::channel(16);
        controller.resources = Some(SessionResources {
            outbound: outbound_tx,
            client: None,
            scheduler: PlaybackScheduler::new(Box::new(sink.clone())),
            capture: Some(Box::new(FakeMic)),
            camera: None,
            blocks_rx: Some(blocks_rx),
            events_rx: None,
            tasks: Vec::new(),
            transcripts: TranscriptBuffers::new(),
        });

        (controller, id, sink, outbound_rx, updates_rx)
    }

    fn audio_message(samples: &[i16]) -> ServerMessage {
        let bytes = codec::i16_to_bytes(samples);
        ServerMessage {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn {
                    parts: vec![ServerPart {
                        text: None,
                        inline_data: Some(Blob {
                            mime_type: "audio/pcm;rate=24000".to_string(),
                            data: codec::encode_base64(&bytes),
                        }),
                    }],
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_memory_tool_saves_and_acknowledges() {
        let mut memory = test_memory();
        let calls = vec![FunctionCall {
            id: "fc-1".to_string(),
            name: SAVE_MEMORY_TOOL.to_string(),
            args: json!({"fact": "has a dog named Rex"}),
        }];

        let (responses, saved) = tool_responses_for(&calls, &mut memory);

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, "fc-1");
        assert_eq!(responses[0].response["output"], "Saved.");
        assert_eq!(saved, vec!["has a dog named Rex".to_string()]);
        assert_eq!(memory.facts().next(), Some("has a dog named Rex"));
    }

    #[test]
    fn test_duplicate_fact_acknowledged_but_not_reported_saved() {
        let mut memory = test_memory();
        let call = FunctionCall {
            id: "fc-1".to_string(),
            name: SAVE_MEMORY_TOOL.to_string(),
            args: json!({"fact": "has a dog named Rex"}),
        };

        let (_, saved) = tool_responses_for(std::slice::from_ref(&call), &mut memory);
        assert_eq!(saved.len(), 1);

        let (responses, saved) = tool_responses_for(&[call], &mut memory);

        // The fact is in memory either way, so the tool call still succeeds
        assert_eq!(responses[0].response["output"], "Saved.");
        assert!(saved.is_empty());
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_unknown_tool_gets_error_response() {
        let mut memory = test_memory();
        let calls = vec![FunctionCall {
            id: "fc-2".to_string(),
            name: "launch_rocket".to_string(),
            args: json!({}),
        }];

        let (responses, saved) = tool_responses_for(&calls, &mut memory);

        assert_eq!(responses.len(), 1);
        assert!(responses[0].response["error"]
            .as_str()
            .unwrap()
            .contains("launch_rocket"));
        assert!(saved.is_empty());
        assert!(memory.is_empty());
    }

    #[test]
    fn test_save_memory_without_fact_is_an_error() {
        let mut memory = test_memory();
        let calls = vec![FunctionCall {
            id: "fc-3".to_string(),
            name: SAVE_MEMORY_TOOL.to_string(),
            args: json!({}),
        }];

        let (responses, saved) = tool_responses_for(&calls, &mut memory);
        assert!(responses[0].response.get("error").is_some());
        assert!(saved.is_empty());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_inline_audio_is_scheduled() {
        let (mut controller, id, sink, _outbound_rx, _updates_rx) = connected_controller();

        controller
            .dispatch_server_message(id, audio_message(&[100, 200, 300]))
            .await;

        let spawned = sink.spawned.lock().unwrap();
        assert_eq!(spawned.len(), 1);
    }

    #[tokio::test]
    async fn test_interruption_flushes_scheduled_audio() {
        let (mut controller, id, sink, _outbound_rx, _updates_rx) = connected_controller();

        controller
            .dispatch_server_message(id, audio_message(&[1, 2, 3, 4]))
            .await;
        controller
            .dispatch_server_message(id, audio_message(&[5, 6, 7, 8]))
            .await;

        let interrupt = ServerMessage {
            server_content: Some(ServerContent {
                interrupted: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        controller.dispatch_server_message(id, interrupt).await;

        let spawned = sink.spawned.lock().unwrap();
        assert_eq!(spawned.len(), 2);
        assert!(spawned
            .iter()
            .all(|r| r.stopped.load(std::sync::atomic::Ordering::SeqCst)));

        // Cursor reset: next chunk schedules at the current clock
        drop(spawned);
        let resources = controller.resources.as_mut().unwrap();
        assert_eq!(resources.scheduler.cursor(), 0.0);
        assert_eq!(resources.scheduler.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_tool_response_goes_out_on_the_transport() {
        let (mut controller, id, _sink, mut outbound_rx, _updates_rx) = connected_controller();

        let msg = ServerMessage {
            tool_call: Some(ToolCallMsg {
                function_calls: vec![FunctionCall {
                    id: "fc-9".to_string(),
                    name: SAVE_MEMORY_TOOL.to_string(),
                    args: json!({"fact": "enjoys hiking"}),
                }],
            }),
            ..Default::default()
        };
        controller.dispatch_server_message(id, msg).await;

        match outbound_rx.try_recv() {
            Ok(ClientMessage::ToolResponse(response)) => {
                assert_eq!(response.function_responses[0].id, "fc-9");
            }
            other => panic!("Expected a tool response, got {:?}", other.is_ok()),
        }
        assert_eq!(controller.memory.facts().next(), Some("enjoys hiking"));
    }

    #[tokio::test]
    async fn test_repeated_save_announces_once() {
        let (mut controller, id, _sink, mut outbound_rx, mut updates_rx) = connected_controller();

        for call_id in ["fc-10", "fc-11"] {
            let msg = ServerMessage {
                tool_call: Some(ToolCallMsg {
                    function_calls: vec![FunctionCall {
                        id: call_id.to_string(),
                        name: SAVE_MEMORY_TOOL.to_string(),
                        args: json!({"fact": "plays the cello"}),
                    }],
                }),
                ..Default::default()
            };
            controller.dispatch_server_message(id, msg).await;
        }

        // Both calls are answered on the wire
        assert!(outbound_rx.try_recv().is_ok());
        assert!(outbound_rx.try_recv().is_ok());

        // But the duplicate produces no saved-memory update
        let mut announced = 0;
        while let Ok(update) = updates_rx.try_recv() {
            if matches!(update, SessionUpdate::MemorySaved(_)) {
                announced += 1;
            }
        }
        assert_eq!(announced, 1);
        assert_eq!(controller.memory.len(), 1);
    }

    #[tokio::test]
    async fn test_transcript_flow() {
        let (mut controller, id, _sink, _outbound_rx, mut updates_rx) = connected_controller();

        // User transcripts overwrite
        for text in ["hel", "hello there"] {
            let msg = ServerMessage {
                server_content: Some(ServerContent {
                    input_transcription: Some(Transcription {
                        text: text.to_string(),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            };
            controller.dispatch_server_message(id, msg).await;
        }

        // Model transcripts append
        for text in ["Hi", "! How are you?"] {
            let msg = ServerMessage {
                server_content: Some(ServerContent {
                    output_transcription: Some(Transcription {
                        text: text.to_string(),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            };
            controller.dispatch_server_message(id, msg).await;
        }

        let mut last_user = None;
        let mut last_nia = None;
        while let Ok(update) = updates_rx.try_recv() {
            match update {
                SessionUpdate::UserTranscript(t) => last_user = Some(t),
                SessionUpdate::NiaTranscript(t) => last_nia = Some(t),
                _ => {}
            }
        }
        assert_eq!(last_user.as_deref(), Some("hello there"));
        assert_eq!(last_nia.as_deref(), Some("Hi! How are you?"));

        // Turn completion clears NIA's buffer
        let msg = ServerMessage {
            server_content: Some(ServerContent {
                turn_complete: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        controller.dispatch_server_message(id, msg).await;
        assert_eq!(controller.resources.as_ref().unwrap().transcripts.nia(), "");
    }

    #[tokio::test]
    async fn test_go_away_ends_the_session() {
        let (mut controller, id, _sink, _outbound_rx, _updates_rx) = connected_controller();

        let msg = ServerMessage {
            go_away: Some(json!({})),
            ..Default::default()
        };
        controller.dispatch_server_message(id, msg).await;

        // Teardown ran to completion and we are back in Idle
        assert!(matches!(controller.state, State::Idle));
        assert!(controller.resources.is_none());
    }

    #[tokio::test]
    async fn test_stale_inbound_events_are_dropped() {
        let (mut controller, _id, sink, _outbound_rx, _updates_rx) = connected_controller();

        let stale_id = Uuid::new_v4();
        controller
            .handle_inbound(
                stale_id,
                TransportEvent::Message(audio_message(&[1, 2, 3])),
            )
            .await;

        assert!(sink.spawned.lock().unwrap().is_empty());

        // A stale error does not kill the live session either
        controller
            .handle_inbound(stale_id, TransportEvent::Error("boom".to_string()))
            .await;
        assert!(matches!(controller.state, State::Connected { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_tears_down_and_notifies() {
        let (mut controller, id, _sink, _outbound_rx, mut updates_rx) = connected_controller();

        controller
            .handle_inbound(id, TransportEvent::Error("status 429".to_string()))
            .await;

        assert!(matches!(controller.state, State::Idle));
        assert!(controller.resources.is_none());

        let mut saw_quota = false;
        while let Ok(update) = updates_rx.try_recv() {
            if matches!(update, SessionUpdate::Error(LiveError::QuotaExhausted(_))) {
                saw_quota = true;
            }
        }
        assert!(saw_quota);
    }

    #[tokio::test]
    async fn test_device_failure_surfaces_as_device_access() {
        let mut config = test_config();
        config.capture_factory = Box::new(|_tx| Err(AudioError::NoInputDevice));
        let (mut controller, _handle, mut updates_rx) =
            SessionController::new(config, test_memory());

        controller.apply(Event::StartRequested).await;

        assert!(matches!(controller.state, State::Idle));
        let mut saw_device_error = false;
        while let Ok(update) = updates_rx.try_recv() {
            if matches!(update, SessionUpdate::Error(LiveError::DeviceAccess(_))) {
                saw_device_error = true;
            }
        }
        assert!(saw_device_error);
    }
}
