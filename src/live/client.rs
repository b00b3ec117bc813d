//! Live API WebSocket client
//!
//! Manages the transport lifecycle for one realtime session.
//!
//! # Connection Flow
//!
//! 1. `connect()` - Establish WebSocket, send `setup`, wait for `setupComplete`
//! 2. `sender()` - Clone the outbound channel for streaming media
//! 3. `take_events()` - Get the ordered inbound event stream
//! 4. `close()` - Clean shutdown
//!
//! Initial connection retries 3 times with exponential backoff (1s, 2s, 4s).
//! A session that drops afterwards is never reconnected automatically; the
//! user starts a new one.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async_with_config, tungstenite::Message};

use super::protocol::{ClientMessage, ServerMessage, SetupConfig, LIVE_API_URL};
use super::LiveError;

/// Connection timeout for the WebSocket handshake
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for waiting for setupComplete
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum retry attempts for the initial connection
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry)
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Inbound transport events, delivered strictly in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(ServerMessage),
    Error(String),
    Closed,
}

/// Handle to an active live session transport.
///
/// Outbound messages go through an mpsc channel drained by a writer task, so
/// the capture pipeline and the controller can both hold senders. Inbound
/// messages arrive on a single ordered channel.
pub struct LiveClient {
    outbound_tx: mpsc::Sender<ClientMessage>,
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl LiveClient {
    /// Connect to the live API and complete setup.
    pub async fn connect(api_key: &str, setup: SetupConfig) -> Result<Self, LiveError> {
        if api_key.is_empty() {
            return Err(LiveError::Auth("API key is not configured".to_string()));
        }

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                log::info!(
                    "Retrying live connection in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
            }

            match Self::try_connect(api_key, setup.clone()).await {
                Ok(client) => return Ok(client),
                // Credential and quota failures will not improve on retry
                Err(e @ (LiveError::Auth(_) | LiveError::QuotaExhausted(_))) => return Err(e),
                Err(e) => {
                    log::warn!("Connection attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LiveError::Connectivity("Max retries exceeded".to_string())))
    }

    /// Single connection attempt (no retries).
    async fn try_connect(api_key: &str, setup: SetupConfig) -> Result<Self, LiveError> {
        let url = format!("{}?key={}", LIVE_API_URL, api_key);

        log::info!("Connecting to live API...");

        let (ws_stream, _response) = timeout(
            CONNECTION_TIMEOUT,
            connect_async_with_config(
                &url, None, false, // disable_nagle (we want low latency)
            ),
        )
        .await
        .map_err(|_| LiveError::Connectivity("Connection timeout".to_string()))?
        .map_err(|e| super::classify_transport_error(&e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        // Send setup and wait for setupComplete before exposing the session
        let setup_json = serde_json::to_string(&ClientMessage::Setup(setup))
            .map_err(|e| LiveError::Connectivity(e.to_string()))?;
        write
            .send(Message::Text(setup_json))
            .await
            .map_err(|e| super::classify_transport_error(&e.to_string()))?;

        log::info!("Setup sent, waiting for setupComplete...");

        timeout(SETUP_TIMEOUT, async {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) if msg.setup_complete.is_some() => return Ok(()),
                            Ok(_) => {
                                log::debug!("Ignoring message while waiting for setupComplete")
                            }
                            Err(e) => log::warn!("Failed to parse message: {}", e),
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        // The live API may frame JSON as binary
                        match serde_json::from_slice::<ServerMessage>(&bytes) {
                            Ok(msg) if msg.setup_complete.is_some() => return Ok(()),
                            Ok(_) => {}
                            Err(e) => log::warn!("Failed to parse binary message: {}", e),
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "Connection closed before setup".to_string());
                        return Err(super::classify_transport_error(&reason));
                    }
                    Err(e) => {
                        return Err(super::classify_transport_error(&e.to_string()));
                    }
                    _ => {} // Ignore ping/pong
                }
            }
            Err(LiveError::Connectivity("Stream ended".to_string()))
        })
        .await
        .map_err(|_| LiveError::Connectivity("Setup timeout".to_string()))??;

        log::info!("Live session established");

        // Outbound: writer task drains the channel into the socket. It needs
        // no handle; it exits on its own once every sender is dropped.
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(100);
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        log::warn!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    log::warn!("Outbound send failed: {}", e);
                    break;
                }
            }
            // Channel closed: session teardown
            if let Err(e) = write.close().await {
                log::debug!("WebSocket close: {}", e);
            }
            log::debug!("Writer task exiting");
        });

        // Inbound: reader task preserves arrival order on one channel
        let (events_tx, events_rx) = mpsc::channel::<TransportEvent>(100);
        let reader_task = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                let event = match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text)
                    {
                        Ok(msg) => TransportEvent::Message(msg),
                        Err(e) => {
                            log::warn!("Failed to parse message: {}", e);
                            continue;
                        }
                    },
                    Ok(Message::Binary(bytes)) => {
                        match serde_json::from_slice::<ServerMessage>(&bytes) {
                            Ok(msg) => TransportEvent::Message(msg),
                            Err(e) => {
                                log::warn!("Failed to parse binary message: {}", e);
                                continue;
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        match frame {
                            // Abnormal close reasons surface as errors so the
                            // controller can classify them
                            Some(f) if !f.reason.is_empty() => {
                                let _ = events_tx
                                    .send(TransportEvent::Error(f.reason.to_string()))
                                    .await;
                            }
                            _ => {
                                let _ = events_tx.send(TransportEvent::Closed).await;
                            }
                        }
                        break;
                    }
                    Err(e) => {
                        let _ = events_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                    _ => continue, // Ignore ping/pong
                };
                if events_tx.send(event).await.is_err() {
                    log::debug!("Event channel closed");
                    break;
                }
            }
            let _ = events_tx.send(TransportEvent::Closed).await;
            log::debug!("Reader task exiting");
        });

        Ok(Self {
            outbound_tx,
            events_rx: Some(events_rx),
            reader_task,
        })
    }

    /// Clone the outbound sender for streaming media from other tasks.
    pub fn sender(&self) -> mpsc::Sender<ClientMessage> {
        self.outbound_tx.clone()
    }

    /// Take ownership of the inbound event receiver. Returns `None` if
    /// already taken.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.take()
    }

    /// Shut the transport down. Best-effort; never fails.
    ///
    /// Consuming the client drops the outbound sender, which ends the writer
    /// task and closes the socket; the reader task is aborted in `Drop`.
    /// Capture pipelines holding cloned senders keep the writer alive until
    /// they exit too.
    pub fn close(self) {
        log::info!("Live transport closing");
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_empty_api_key() {
        let setup = SetupConfig::new("models/test", "prompt", "Aoede");
        let result = LiveClient::connect("", setup).await;
        assert!(matches!(result, Err(LiveError::Auth(_))));
    }

    #[tokio::test]
    #[ignore] // Requires a valid API key and network access
    async fn test_live_connection() {
        let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY required");
        let setup = SetupConfig::new(
            super::super::protocol::DEFAULT_MODEL,
            "You are a test assistant.",
            "Aoede",
        );

        let client = LiveClient::connect(&api_key, setup).await;
        assert!(client.is_ok(), "Connection failed: {:?}", client.err());
        client.unwrap().close();
    }
}
