//! Heartbeat & Liveness Watchdog
//!
//! The streaming servers expect a keepalive payload on a fixed cadence and
//! are considered dead when nothing arrives inbound for two intervals. The
//! watchdog ticks at the heartbeat interval, asks the writer to send the
//! provider-specific payload, and raises a timeout when the inbound side
//! has gone quiet.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Heartbeat cadence configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between keepalive sends. Liveness timeout is twice this.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Inbound silence longer than this marks the connection dead.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.interval * 2
    }
}

/// Events emitted by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Time to send the keepalive payload.
    SendHeartbeat,
    /// Inbound side went silent for two intervals; reconnect.
    Timeout,
}

/// Inbound-activity clock shared between the reader and the watchdog.
#[derive(Debug)]
pub struct HeartbeatState {
    last_inbound: RwLock<Instant>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create state anchored at "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_inbound: RwLock::new(Instant::now()),
        }
    }

    /// Record that any inbound frame arrived.
    pub fn record_inbound(&self) {
        *self.last_inbound.write() = Instant::now();
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_inbound.read().elapsed()
    }

    /// Re-anchor for a new connection.
    pub fn reset(&self) {
        *self.last_inbound.write() = Instant::now();
    }
}

/// Watchdog that drives keepalives and detects dead connections.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a new monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or a timeout is raised.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so the initial
        // heartbeat goes out one interval after connect.
        interval.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.tick().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<(), ()> {
        let silence = self.state.silence();
        if silence > self.config.timeout() {
            tracing::warn!(
                silence_ms = silence.as_millis(),
                timeout_ms = self.config.timeout().as_millis(),
                "no inbound traffic for two heartbeat intervals"
            );
            let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
            return Err(());
        }

        if self.event_tx.send(HeartbeatEvent::SendHeartbeat).await.is_err() {
            tracing::debug!("heartbeat channel closed");
            return Err(());
        }

        Ok(())
    }
}
