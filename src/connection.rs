//! Connection Manager
//!
//! Owns the WebSocket lifecycle: authenticate, dial, flush subscriptions,
//! pump frames and heartbeats, detect loss, and reconnect with backoff.
//!
//! ```text
//! Idle → Authenticating → Dialing → Ready ⇄ Reconnecting
//!                                     ↓
//!                                 Draining → Stopped
//! ```
//!
//! The reader side pushes raw frames into the bounded queue and stamps the
//! liveness clock; the writer side serializes control messages in the order
//! they were enqueued and ticks the provider heartbeat. Loss of inbound
//! traffic for two heartbeat intervals, a socket error, or a server close
//! all funnel into the reconnect path, which re-fetches the auth token and
//! replays every registered subscription.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthClient, AuthError, CLIENT_INFORMATION};
use crate::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
use crate::provider::{ControlMessage, ProviderProfile, WireVariant};
use crate::queue::FrameQueue;
use crate::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::stats::Counters;
use crate::subscription::SubscriptionRegistry;

type WsSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<TcpStream>>,
    Message,
>;

/// Equities feeds require this header to get the v2 record layout.
const EQUITIES_FORMAT_HEADER: (&str, &str) = ("UseNewEquitiesFormat", "v2");

// =============================================================================
// State
// =============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, not started.
    Idle,
    /// Fetching an auth token.
    Authenticating,
    /// Opening the WebSocket.
    Dialing,
    /// Connected; frames flowing.
    Ready,
    /// Stop requested; workers draining the queue.
    Draining,
    /// Waiting out a backoff delay before redialing.
    Reconnecting,
    /// Terminal.
    Stopped,
}

/// Shared, cheaply readable connection state.
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<RwLock<ConnectionState>>);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(RwLock::new(ConnectionState::Idle)))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        let mut current = self.0.write();
        if *current != state {
            tracing::debug!(from = ?*current, to = ?state, "connection state change");
            *current = state;
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.0.read()
    }
}

// =============================================================================
// Events & errors
// =============================================================================

/// Lifecycle notifications surfaced to the client owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// Socket open and subscriptions flushed.
    Connected,
    /// Connection lost; reconnect pending or in progress.
    Disconnected,
    /// Backoff delay started for the given attempt.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// The reconnect budget is exhausted; the client has stopped.
    ReconnectsExhausted,
    /// Authentication was rejected; the client has stopped.
    AuthFailed,
    /// Replay consumed all capture files.
    ReplayComplete,
}

/// Errors raised by the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// WebSocket-level failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Authentication failure (fatal when the key is rejected).
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The server closed the connection or the stream ended.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// No inbound traffic for two heartbeat intervals.
    #[error("heartbeat timed out")]
    HeartbeatTimeout,

    /// Reconnect attempts exhausted.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted {
        /// Attempts consumed.
        attempts: u32,
    },
}

impl ConnectionError {
    /// Errors that no amount of reconnecting will fix.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Auth(auth) => auth.is_fatal(),
            Self::ReconnectExhausted { .. } => true,
            _ => false,
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Configuration shared by the connection manager.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionConfig {
    pub(crate) heartbeat: HeartbeatConfig,
    pub(crate) reconnect: ReconnectConfig,
}

/// Drives one socket at a time, reconnecting across failures, until
/// cancelled or a fatal error surfaces.
pub(crate) struct ConnectionManager {
    profile: ProviderProfile,
    config: ConnectionConfig,
    auth: Arc<AuthClient>,
    registry: Arc<SubscriptionRegistry>,
    queue: FrameQueue,
    counters: Arc<Counters>,
    state: SharedState,
    control_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ControlMessage>>,
    events: mpsc::UnboundedSender<ClientEvent>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        profile: ProviderProfile,
        config: ConnectionConfig,
        auth: Arc<AuthClient>,
        registry: Arc<SubscriptionRegistry>,
        queue: FrameQueue,
        counters: Arc<Counters>,
        state: SharedState,
        control_rx: mpsc::UnboundedReceiver<ControlMessage>,
        events: mpsc::UnboundedSender<ClientEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            profile,
            config,
            auth,
            registry,
            queue,
            counters,
            state,
            control_rx: tokio::sync::Mutex::new(control_rx),
            events,
            cancel,
        }
    }

    /// Run the connect/reconnect loop until cancelled or fatal.
    pub(crate) async fn run(self: Arc<Self>) -> Result<(), ConnectionError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let mut first_attempt = true;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            // Rotate the token on every reconnect; the first dial may use
            // the token fetched during start().
            if !first_attempt {
                self.auth.invalidate();
            }
            first_attempt = false;

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    tracing::info!("connection closed gracefully");
                    return Ok(());
                }
                Err(error) if error.is_fatal() => {
                    tracing::error!(error = %error, "fatal connection error");
                    if matches!(error, ConnectionError::Auth(_)) {
                        let _ = self.events.send(ClientEvent::AuthFailed);
                    }
                    self.state.set(ConnectionState::Stopped);
                    return Err(error);
                }
                Err(error) => {
                    tracing::warn!(error = %error, "connection error");
                    let _ = self.events.send(ClientEvent::Disconnected);
                    self.state.set(ConnectionState::Reconnecting);

                    let Some(delay) = policy.next_delay() else {
                        let attempts = policy.attempt_count();
                        let _ = self.events.send(ClientEvent::ReconnectsExhausted);
                        self.state.set(ConnectionState::Stopped);
                        return Err(ConnectionError::ReconnectExhausted { attempts });
                    };

                    let attempt = policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "reconnecting after backoff"
                    );
                    let _ = self.events.send(ClientEvent::Reconnecting { attempt });

                    tokio::select! {
                        () = self.cancel.cancelled() => return Ok(()),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Authenticate, dial, and pump one connection to completion.
    async fn connect_and_run(
        &self,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), ConnectionError> {
        self.state.set(ConnectionState::Authenticating);
        let token = self.auth.token().await?;

        self.state.set(ConnectionState::Dialing);
        let url = self.profile.socket_url(&token);
        tracing::info!(provider = self.profile.provider().as_str(), "dialing feed");

        let mut request = url.into_client_request()?;
        request.headers_mut().insert(
            "Client-Information",
            HeaderValue::from_static(CLIENT_INFORMATION),
        );
        if self.profile.wire_variant() == WireVariant::Equities {
            request.headers_mut().insert(
                EQUITIES_FORMAT_HEADER.0,
                HeaderValue::from_static(EQUITIES_FORMAT_HEADER.1),
            );
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        self.state.set(ConnectionState::Ready);
        policy.reset();
        self.flush_subscriptions(&mut write).await?;
        let _ = self.events.send(ClientEvent::Connected);

        // Liveness watchdog for this connection.
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(8);
        let heartbeat_cancel = self.cancel.child_token();
        let monitor = HeartbeatMonitor::new(
            self.config.heartbeat.clone(),
            Arc::clone(&heartbeat_state),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        tokio::spawn(monitor.run());

        let mut control_rx = self.control_rx.lock().await;

        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break Ok(());
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendHeartbeat) => {
                            let message = self.profile.heartbeat_message();
                            write.send(to_ws_message(message)).await?;
                        }
                        Some(HeartbeatEvent::Timeout) | None => {
                            break Err(ConnectionError::HeartbeatTimeout);
                        }
                    }
                }
                control = control_rx.recv() => {
                    match control {
                        Some(message) => write.send(to_ws_message(message)).await?,
                        // Control channel closed: the client is gone.
                        None => break Ok(()),
                    }
                }
                inbound = read.next() => {
                    match inbound {
                        Some(Ok(Message::Binary(frame))) => {
                            heartbeat_state.record_inbound();
                            self.counters
                                .data_messages
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            self.queue.push_frame(frame);
                        }
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_inbound();
                            self.counters
                                .text_messages
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            tracing::debug!(message = %text, "control message from server");
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            heartbeat_state.record_inbound();
                            write.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_inbound();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "server sent close");
                            break Err(ConnectionError::ConnectionClosed);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(error)) => break Err(error.into()),
                        None => break Err(ConnectionError::ConnectionClosed),
                    }
                }
            }
        };

        heartbeat_cancel.cancel();
        result
    }

    /// Re-emit a join for every registered channel in first-join order.
    async fn flush_subscriptions(&self, write: &mut WsSink) -> Result<(), ConnectionError> {
        for channel in self.registry.snapshot() {
            let message = self.profile.encode_join(&channel);
            write.send(to_ws_message(message)).await?;
            tracing::info!(channel = %channel, "joined channel");
        }
        Ok(())
    }
}

fn to_ws_message(message: ControlMessage) -> Message {
    match message {
        ControlMessage::Text(text) => Message::Text(text.into()),
        ControlMessage::Binary(bytes) => Message::Binary(bytes.into()),
    }
}
