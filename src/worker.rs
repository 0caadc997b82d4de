//! Decoder Workers & Callback Dispatch
//!
//! N workers pull raw frames off the bounded queue, run the frame decoder,
//! and hand typed events to the registered callbacks. Each frame is decoded
//! whole by one worker, preserving intra-frame record order. Callbacks run
//! on worker tasks; a panicking callback is caught and logged, never
//! propagated. Callback slots sit behind a read-write lock so they can be
//! reassigned mid-stream.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::{self, DecodeError};
use crate::connection::ClientEvent;
use crate::csv::CsvSink;
use crate::events::{
    OptionsRefresh, OptionsUnusualActivity, Quote, StreamEvent, Trade,
};
use crate::provider::WireVariant;
use crate::queue::{FrameReceiver, QueueItem};
use crate::stats::Counters;

/// Handler for trade prints. The second argument is the approximate queue
/// backlog at delivery time.
pub type TradeHandler = Arc<dyn Fn(Trade, usize) + Send + Sync>;
/// Handler for quote updates.
pub type QuoteHandler = Arc<dyn Fn(Quote, usize) + Send + Sync>;
/// Handler for options refresh snapshots.
pub type RefreshHandler = Arc<dyn Fn(OptionsRefresh, usize) + Send + Sync>;
/// Handler for options unusual-activity events.
pub type UnusualActivityHandler = Arc<dyn Fn(OptionsUnusualActivity, usize) + Send + Sync>;
/// Handler for raw frames when parsing is bypassed.
pub type RawHandler = Arc<dyn Fn(Bytes, usize) + Send + Sync>;

/// Callback slots. All optional: an event whose slot is empty is dropped
/// silently but still counted.
#[derive(Default, Clone)]
pub struct Callbacks {
    /// Trade prints (equities or options).
    pub on_trade: Option<TradeHandler>,
    /// Quote updates (equities or options).
    pub on_quote: Option<QuoteHandler>,
    /// Options open-interest/OHLC snapshots.
    pub on_refresh: Option<RefreshHandler>,
    /// Options unusual-activity events.
    pub on_unusual_activity: Option<UnusualActivityHandler>,
    /// Raw frames, delivered instead of decoded events when
    /// `bypass_parsing` is set.
    pub on_raw: Option<RawHandler>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_trade", &self.on_trade.is_some())
            .field("on_quote", &self.on_quote.is_some())
            .field("on_refresh", &self.on_refresh.is_some())
            .field("on_unusual_activity", &self.on_unusual_activity.is_some())
            .field("on_raw", &self.on_raw.is_some())
            .finish()
    }
}

/// Everything one worker needs; cheap to clone per task.
pub(crate) struct WorkerContext {
    pub(crate) receiver: FrameReceiver,
    pub(crate) callbacks: Arc<RwLock<Callbacks>>,
    pub(crate) counters: Arc<Counters>,
    pub(crate) wire_variant: WireVariant,
    pub(crate) bypass_parsing: bool,
    pub(crate) csv: Option<Arc<CsvSink>>,
    pub(crate) decode_error_tx: mpsc::UnboundedSender<DecodeError>,
    pub(crate) lifecycle_tx: mpsc::UnboundedSender<ClientEvent>,
}

impl Clone for WorkerContext {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            callbacks: Arc::clone(&self.callbacks),
            counters: Arc::clone(&self.counters),
            wire_variant: self.wire_variant,
            bypass_parsing: self.bypass_parsing,
            csv: self.csv.clone(),
            decode_error_tx: self.decode_error_tx.clone(),
            lifecycle_tx: self.lifecycle_tx.clone(),
        }
    }
}

/// Spawn `count` workers. They run until the queue closes and drains.
pub(crate) fn spawn_workers(count: usize, context: WorkerContext) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|index| {
            let context = context.clone();
            tokio::spawn(async move {
                tracing::debug!(index, "worker started");
                worker_loop(&context).await;
                tracing::debug!(index, "worker stopped");
            })
        })
        .collect()
}

/// Spawn the task that drains decode errors to the log. Keeping this off
/// the worker path means a storm of bad frames slows decoding, not the
/// reader.
pub(crate) fn spawn_decode_error_logger(
    mut rx: mpsc::UnboundedReceiver<DecodeError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(error) = rx.recv().await {
            tracing::warn!(error = %error, "protocol error while decoding frame");
        }
    })
}

async fn worker_loop(context: &WorkerContext) {
    while let Some(item) = context.receiver.recv().await {
        match item {
            QueueItem::Frame(frame) => {
                context.counters.queue_depth.fetch_sub(1, Ordering::Relaxed);
                let backlog = context.counters.queue_depth.load(Ordering::Relaxed);
                handle_frame(context, &frame, backlog);
            }
            QueueItem::EndOfStream => {
                let _ = context.lifecycle_tx.send(ClientEvent::ReplayComplete);
            }
        }
    }
}

fn handle_frame(context: &WorkerContext, frame: &Bytes, backlog: usize) {
    if context.bypass_parsing {
        context
            .counters
            .events_dispatched
            .fetch_add(1, Ordering::Relaxed);
        let callback = context.callbacks.read().on_raw.clone();
        if let Some(callback) = callback {
            invoke(|| callback(frame.clone(), backlog));
        }
        return;
    }

    let decoded = codec::decode_frame(context.wire_variant, frame);

    if !decoded.errors.is_empty() {
        context
            .counters
            .decode_errors
            .fetch_add(decoded.errors.len() as u64, Ordering::Relaxed);
        for error in decoded.errors {
            let _ = context.decode_error_tx.send(error);
        }
    }

    for event in decoded.events {
        context
            .counters
            .events_dispatched
            .fetch_add(1, Ordering::Relaxed);

        if let Some(csv) = &context.csv
            && let Err(error) = csv.write_event(&event)
        {
            tracing::error!(error = %error, "failed to append CSV row");
        }

        dispatch(context, event, backlog);
    }
}

fn dispatch(context: &WorkerContext, event: StreamEvent, backlog: usize) {
    // Clone the slot under the read lock, call outside it, so a callback
    // can reassign slots without deadlocking.
    match event {
        StreamEvent::EquitiesTrade(trade) => {
            let callback = context.callbacks.read().on_trade.clone();
            if let Some(callback) = callback {
                invoke(|| callback(Trade::Equities(trade), backlog));
            }
        }
        StreamEvent::OptionsTrade(trade) => {
            let callback = context.callbacks.read().on_trade.clone();
            if let Some(callback) = callback {
                invoke(|| callback(Trade::Options(trade), backlog));
            }
        }
        StreamEvent::EquitiesQuote(quote) => {
            let callback = context.callbacks.read().on_quote.clone();
            if let Some(callback) = callback {
                invoke(|| callback(Quote::Equities(quote), backlog));
            }
        }
        StreamEvent::OptionsQuote(quote) => {
            let callback = context.callbacks.read().on_quote.clone();
            if let Some(callback) = callback {
                invoke(|| callback(Quote::Options(quote), backlog));
            }
        }
        StreamEvent::OptionsRefresh(refresh) => {
            let callback = context.callbacks.read().on_refresh.clone();
            if let Some(callback) = callback {
                invoke(|| callback(refresh, backlog));
            }
        }
        StreamEvent::OptionsUnusualActivity(activity) => {
            let callback = context.callbacks.read().on_unusual_activity.clone();
            if let Some(callback) = callback {
                invoke(|| callback(activity, backlog));
            }
        }
        StreamEvent::Raw(bytes) => {
            let callback = context.callbacks.read().on_raw.clone();
            if let Some(callback) = callback {
                invoke(|| callback(bytes, backlog));
            }
        }
    }
}

/// Recover boundary around user callbacks.
fn invoke(callback: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::error!("user callback panicked; worker continues");
    }
}
