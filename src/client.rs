//! Public Client API
//!
//! One [`Client`] owns one feed connection (or one replay run), a bounded
//! event queue, and a pool of decoder workers. Several clients with
//! disjoint configuration can coexist in a process; there is no global
//! state.
//!
//! ```no_run
//! use std::sync::Arc;
//! use intrinio_realtime::{Callbacks, Client, Config, Provider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::new("YOUR_API_KEY", Provider::Opra);
//! let callbacks = Callbacks {
//!     on_trade: Some(Arc::new(|trade, backlog| {
//!         println!("{trade:?} (backlog {backlog})");
//!     })),
//!     ..Callbacks::default()
//! };
//!
//! let client = Client::new(config, callbacks)?;
//! client.join_firehose();
//! client.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthClient;
use crate::config::{Config, ConfigError};
use crate::connection::{
    ClientEvent, ConnectionConfig, ConnectionManager, ConnectionState, SharedState,
};
use crate::csv::CsvSink;
use crate::error::ClientError;
use crate::provider::{ControlMessage, ProviderProfile};
use crate::queue::{FrameQueue, FrameReceiver};
use crate::replay::ReplayEngine;
use crate::stats::{ClientStats, Counters};
use crate::subscription::SubscriptionRegistry;
use crate::worker::{
    Callbacks, QuoteHandler, RawHandler, RefreshHandler, TradeHandler, UnusualActivityHandler,
    WorkerContext, spawn_decode_error_logger, spawn_workers,
};

/// Budget for draining the queue and joining workers on `stop()`.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resources consumed exactly once by `start()`.
struct Startup {
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    queue: FrameQueue,
    receiver: FrameReceiver,
}

/// Handles to the running tasks, reclaimed by `stop()`.
struct Runtime {
    workers: Vec<JoinHandle<()>>,
    supervisor: JoinHandle<()>,
    decode_error_logger: JoinHandle<()>,
    csv: Option<Arc<CsvSink>>,
}

/// Real-time (or replay) market-data client.
pub struct Client {
    config: Config,
    profile: ProviderProfile,
    auth: Arc<AuthClient>,
    registry: Arc<SubscriptionRegistry>,
    callbacks: Arc<RwLock<Callbacks>>,
    counters: Arc<Counters>,
    state: SharedState,
    cancel: CancellationToken,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
    startup: Mutex<Option<Startup>>,
    runtime: Mutex<Option<Runtime>>,
}

impl Client {
    /// Build a client. Initial `symbols` from the config are registered and
    /// joined once connected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is invalid (missing
    /// API key, worker count under the feed floor, `Manual` without an IP,
    /// CSV output without a path).
    pub fn new(config: Config, callbacks: Callbacks) -> Result<Self, ConfigError> {
        config.validate()?;

        let profile = ProviderProfile::new(
            config.provider,
            config.delayed,
            config.manual_ip_address.clone(),
        );
        let auth = Arc::new(AuthClient::new(profile.clone(), config.api_key.clone()));

        let registry = Arc::new(SubscriptionRegistry::new());
        for symbol in &config.symbols {
            registry.join(symbol);
        }

        let counters = Counters::new();
        let (queue, receiver) = FrameQueue::new(config.effective_queue_size(), Arc::clone(&counters));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tracing::info!(
            provider = config.provider.as_str(),
            delayed = config.delayed,
            workers = config.num_threads,
            queue_size = config.effective_queue_size(),
            log_level = ?config.log_level,
            debug = config.debug,
            replay = config.replay.is_some(),
            "client configured"
        );

        Ok(Self {
            config,
            profile,
            auth,
            registry,
            callbacks: Arc::new(RwLock::new(callbacks)),
            counters,
            state: SharedState::new(),
            cancel: CancellationToken::new(),
            control_tx,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            startup: Mutex::new(Some(Startup {
                control_rx,
                queue,
                receiver,
            })),
            runtime: Mutex::new(None),
        })
    }

    /// Start streaming (or replaying).
    ///
    /// Performs the first token fetch inline so an invalid API key fails
    /// fast, before any socket is dialed; afterwards the connection loop
    /// runs in the background and reconnects on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyStarted`] on a second call, a fatal
    /// [`ClientError::Auth`] when the key is rejected, or a replay setup
    /// failure.
    pub async fn start(&self) -> Result<(), ClientError> {
        let Some(startup) = self.startup.lock().take() else {
            return Err(ClientError::AlreadyStarted);
        };

        let is_replay = self.config.replay.is_some();
        let skip_auth = is_replay
            && self
                .config
                .replay
                .as_ref()
                .is_some_and(|r| !r.local_files.is_empty());

        if !skip_auth {
            self.state.set(ConnectionState::Authenticating);
            match self.auth.token().await {
                Ok(_) => {}
                Err(error) if error.is_fatal() => {
                    let _ = self.event_tx.send(ClientEvent::AuthFailed);
                    self.state.set(ConnectionState::Stopped);
                    return Err(error.into());
                }
                Err(error) => {
                    // Transient; the background loop retries with backoff.
                    tracing::warn!(error = %error, "initial auth attempt failed");
                }
            }
        }

        let csv = self.create_csv_sink()?;

        let (decode_error_tx, decode_error_rx) = mpsc::unbounded_channel();
        let decode_error_logger = spawn_decode_error_logger(decode_error_rx);

        let context = WorkerContext {
            receiver: startup.receiver,
            callbacks: Arc::clone(&self.callbacks),
            counters: Arc::clone(&self.counters),
            wire_variant: self.profile.wire_variant(),
            bypass_parsing: self.config.bypass_parsing,
            csv: csv.clone(),
            decode_error_tx,
            lifecycle_tx: self.event_tx.clone(),
        };
        let workers = spawn_workers(self.config.num_threads, context);

        let supervisor = if let Some(replay) = self.config.replay.clone() {
            let engine = ReplayEngine::new(
                self.profile.clone(),
                replay,
                self.config.api_key.clone(),
                startup.queue,
                Arc::clone(&self.counters),
                self.state.clone(),
                self.cancel.clone(),
            );
            tokio::spawn(async move {
                if let Err(error) = engine.run().await {
                    tracing::error!(error = %error, "replay failed");
                }
            })
        } else {
            let manager = Arc::new(ConnectionManager::new(
                self.profile.clone(),
                ConnectionConfig {
                    heartbeat: self.config.heartbeat.clone(),
                    reconnect: self.config.reconnect.clone(),
                },
                Arc::clone(&self.auth),
                Arc::clone(&self.registry),
                startup.queue,
                Arc::clone(&self.counters),
                self.state.clone(),
                startup.control_rx,
                self.event_tx.clone(),
                self.cancel.clone(),
            ));
            tokio::spawn(async move {
                if let Err(error) = manager.run().await {
                    tracing::error!(error = %error, "connection loop terminated");
                }
            })
        };

        *self.runtime.lock() = Some(Runtime {
            workers,
            supervisor,
            decode_error_logger,
            csv,
        });

        Ok(())
    }

    fn create_csv_sink(&self) -> Result<Option<Arc<CsvSink>>, ClientError> {
        let Some(replay) = &self.config.replay else {
            return Ok(None);
        };
        if !replay.write_to_csv {
            return Ok(None);
        }
        // Validation guarantees the path is present.
        let Some(path) = &replay.csv_file_path else {
            return Ok(None);
        };
        let sink = CsvSink::create(path).map_err(crate::replay::ReplayError::Io)?;
        Ok(Some(Arc::new(sink)))
    }

    /// Stop the client: close the socket, stop the workers after the queue
    /// drains (bounded by a 5 s timeout), and release every resource.
    /// Idempotent.
    pub async fn stop(&self) {
        if self.state.get() == ConnectionState::Stopped && self.runtime.lock().is_none() {
            return;
        }

        self.state.set(ConnectionState::Draining);
        self.cancel.cancel();

        // Never started: nothing to drain.
        drop(self.startup.lock().take());

        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            // The supervisor owns the last queue producer; once it exits the
            // workers drain to completion.
            let _ = tokio::time::timeout(STOP_DRAIN_TIMEOUT, runtime.supervisor).await;

            let drained =
                tokio::time::timeout(STOP_DRAIN_TIMEOUT, async {
                    for worker in runtime.workers {
                        let _ = worker.await;
                    }
                })
                .await;
            if drained.is_err() {
                tracing::warn!(
                    timeout_secs = STOP_DRAIN_TIMEOUT.as_secs(),
                    "workers did not drain in time"
                );
            }

            runtime.decode_error_logger.abort();

            if let Some(csv) = runtime.csv
                && let Err(error) = csv.flush()
            {
                tracing::error!(error = %error, "failed to flush CSV sink");
            }
        }

        self.state.set(ConnectionState::Stopped);
        tracing::info!("client stopped");
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Join one or more channels. New channels are joined on the wire
    /// immediately when connected, otherwise replayed on (re)connect.
    pub fn join<I, S>(&self, channels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for channel in channels {
            let channel = channel.as_ref();
            if self.registry.join(channel) && self.state.get() == ConnectionState::Ready {
                let _ = self.control_tx.send(self.profile.encode_join(channel));
            }
        }
    }

    /// Join the firehose channel for this provider (every symbol's stream).
    pub fn join_firehose(&self) {
        if !self.registry.set_firehose() {
            tracing::warn!("firehose channel already joined");
        }
        self.join([self.profile.firehose_channel()]);
    }

    /// Leave one or more channels. Leaving an unknown channel is a no-op.
    pub fn leave<I, S>(&self, channels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for channel in channels {
            let channel = channel.as_ref();
            if self.registry.leave(channel) && self.state.get() == ConnectionState::Ready {
                let _ = self.control_tx.send(self.profile.encode_leave(channel));
            }
        }
    }

    /// Leave the firehose channel.
    pub fn leave_firehose(&self) {
        if self.registry.clear_firehose() {
            self.leave([self.profile.firehose_channel()]);
        }
    }

    /// Leave every joined channel.
    pub fn leave_all(&self) {
        let channels = self.registry.leave_all();
        if self.state.get() == ConnectionState::Ready {
            for channel in channels {
                let _ = self.control_tx.send(self.profile.encode_leave(&channel));
            }
        }
    }

    /// Channels currently registered, in first-join order.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.registry.snapshot()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Snapshot of the client counters.
    #[must_use]
    pub fn stats(&self) -> ClientStats {
        self.counters.snapshot()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Take the lifecycle event receiver. Yields `None` after the first
    /// call; one consumer owns the stream.
    #[must_use]
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.event_rx.lock().take()
    }

    // =========================================================================
    // Runtime callback reassignment
    // =========================================================================

    /// Replace the trade callback. Safe mid-stream.
    pub fn set_on_trade(&self, handler: Option<TradeHandler>) {
        self.callbacks.write().on_trade = handler;
    }

    /// Replace the quote callback. Safe mid-stream.
    pub fn set_on_quote(&self, handler: Option<QuoteHandler>) {
        self.callbacks.write().on_quote = handler;
    }

    /// Replace the refresh callback. Safe mid-stream.
    pub fn set_on_refresh(&self, handler: Option<RefreshHandler>) {
        self.callbacks.write().on_refresh = handler;
    }

    /// Replace the unusual-activity callback. Safe mid-stream.
    pub fn set_on_unusual_activity(&self, handler: Option<UnusualActivityHandler>) {
        self.callbacks.write().on_unusual_activity = handler;
    }

    /// Replace the raw-frame callback. Safe mid-stream.
    pub fn set_on_raw(&self, handler: Option<RawHandler>) {
        self.callbacks.write().on_raw = handler;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("provider", &self.config.provider)
            .field("state", &self.state.get())
            .field("channels", &self.registry.len())
            .finish_non_exhaustive()
    }
}
