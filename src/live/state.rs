//! Live session state machine
//!
//! This module implements the session lifecycle using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new state and a list of effects to execute.
//!
//! Every session gets a fresh UUID when it starts connecting; transport
//! callbacks carry the id of the session they belong to, and the reducer
//! drops events whose id no longer matches the active session.

use std::time::Instant;
use uuid::Uuid;

use super::{classify_transport_error, LiveError};

/// Internal state of the live session lifecycle.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    Connecting {
        session_id: Uuid,
    },
    Connected {
        session_id: Uuid,
        started_at: Instant,
    },
    /// Teardown in flight. Resources are being released; the session always
    /// ends in `Idle` once `TeardownComplete` arrives.
    Closing {
        session_id: Uuid,
    },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Events that can trigger state transitions.
/// These come from the user (start/stop) and from the transport tasks.
#[derive(Debug, Clone)]
pub enum Event {
    /// User asked to start a live conversation
    StartRequested,
    /// User asked to end the conversation
    StopRequested,

    // Transport events (id prevents stale callbacks from acting)
    /// Connection established and setup completed
    TransportOpen {
        id: Uuid,
    },
    /// Initial connection failed (already classified by the client)
    ConnectFailed {
        id: Uuid,
        error: LiveError,
    },
    /// The transport errored mid-session; raw message from the wire
    TransportError {
        id: Uuid,
        message: String,
    },
    /// The transport closed without an error (remote hangup, goAway)
    TransportClosed {
        id: Uuid,
    },
    /// All session resources have been released
    TeardownComplete {
        id: Uuid,
    },
}

/// Effects to be executed after a state transition.
/// The controller runs these and feeds resulting events back in.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Open devices and the WebSocket transport for a new session
    OpenTransport { id: Uuid },
    /// Start the capture and video pipelines on the established session
    BeginStreaming { id: Uuid },
    /// Release transport, devices, and playback for the session
    Teardown { id: Uuid },
    /// Surface an error message to the user
    NotifyUser { error: LiveError },
    /// Signal to emit session state to the frontend
    EmitState,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale session IDs
/// - Always emit EmitState after state changes
/// - A start request while connecting or connected is a no-op
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    // Helper: extract current session_id (if any)
    let current_id: Option<Uuid> = match state {
        Idle => None,
        Connecting { session_id } => Some(*session_id),
        Connected { session_id, .. } => Some(*session_id),
        Closing { session_id } => Some(*session_id),
    };

    // Helper: check if event's ID is stale (doesn't match current session)
    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, StartRequested) => {
            let id = Uuid::new_v4();
            (
                Connecting { session_id: id },
                vec![OpenTransport { id }, EmitState],
            )
        }
        // Stop with nothing running is a no-op
        (Idle, StopRequested) => (Idle, vec![]),

        // -----------------
        // Connecting
        // -----------------
        (Connecting { session_id }, TransportOpen { id }) if *session_id == id => (
            Connected {
                session_id: id,
                started_at: Instant::now(),
            },
            vec![BeginStreaming { id }, EmitState],
        ),
        (Connecting { session_id }, ConnectFailed { id, error }) if *session_id == id => (
            Idle,
            // Teardown in case devices opened before the connection failed
            vec![Teardown { id }, NotifyUser { error }, EmitState],
        ),
        (Connecting { session_id }, StopRequested) => (
            Closing {
                session_id: *session_id,
            },
            vec![Teardown { id: *session_id }, EmitState],
        ),

        // -----------------
        // Connected
        // -----------------
        (Connected { session_id, .. }, StopRequested) => (
            Closing {
                session_id: *session_id,
            },
            vec![Teardown { id: *session_id }, EmitState],
        ),
        (Connected { session_id, .. }, TransportError { id, message }) if *session_id == id => (
            Closing { session_id: id },
            vec![
                Teardown { id },
                NotifyUser {
                    error: classify_transport_error(&message),
                },
                EmitState,
            ],
        ),
        // Clean remote close ends the session without an error notice
        (Connected { session_id, .. }, TransportClosed { id }) if *session_id == id => (
            Closing { session_id: id },
            vec![Teardown { id }, EmitState],
        ),

        // -----------------
        // Closing
        // -----------------
        (Closing { session_id }, TeardownComplete { id }) if *session_id == id => {
            (Idle, vec![EmitState])
        }
        // Teardown already in flight; stop again is a no-op
        (Closing { .. }, StopRequested) => (state.clone(), vec![]),

        // A start while connecting, connected, or closing is a no-op
        (Connecting { .. } | Connected { .. } | Closing { .. }, StartRequested) => {
            (state.clone(), vec![])
        }

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, TransportOpen { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, ConnectFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, TransportError { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, TransportClosed { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, TeardownComplete { id }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}
