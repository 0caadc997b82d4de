//! Bounded Event Queue
//!
//! Single bounded FIFO between the socket reader (or replay merger) and the
//! decoder workers. Frames enter in receive order; each frame is decoded
//! atomically by exactly one worker, so intra-frame record order is
//! preserved. Cross-frame ordering is only guaranteed with one worker.
//!
//! Overflow policy: the incoming frame is dropped, `dropped_frames` is
//! incremented, and an error is logged at most once per interval so a
//! saturated feed cannot flood the logs.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::stats::Counters;

/// Minimum gap between queue-overflow log lines.
const OVERFLOW_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// One unit of work for the decoder workers.
#[derive(Debug, Clone)]
pub(crate) enum QueueItem {
    /// A raw binary frame from the wire or a capture file.
    Frame(Bytes),
    /// Replay exhausted all capture files.
    EndOfStream,
}

/// Producer half of the bounded queue. Cloneable; the queue closes when all
/// producers drop.
#[derive(Clone)]
pub(crate) struct FrameQueue {
    tx: mpsc::Sender<QueueItem>,
    counters: Arc<Counters>,
    last_overflow_log: Arc<Mutex<Option<Instant>>>,
}

impl FrameQueue {
    /// Create a queue with the given capacity. Returns the producer and the
    /// shared consumer handle.
    pub(crate) fn new(capacity: usize, counters: Arc<Counters>) -> (Self, FrameReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                counters,
                last_overflow_log: Arc::new(Mutex::new(None)),
            },
            FrameReceiver {
                rx: Arc::new(tokio::sync::Mutex::new(rx)),
            },
        )
    }

    /// Enqueue a frame, dropping it if the queue is full.
    pub(crate) fn push_frame(&self, frame: Bytes) {
        match self.tx.try_send(QueueItem::Frame(frame)) {
            Ok(()) => {
                self.counters.queue_depth.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped_frames.fetch_add(1, Ordering::Relaxed);
                self.log_overflow();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("event queue closed; frame discarded");
            }
        }
    }

    /// Enqueue an item with backpressure. Used by replay, which must not
    /// drop frames.
    pub(crate) async fn push_blocking(&self, item: QueueItem) -> bool {
        let is_frame = matches!(item, QueueItem::Frame(_));
        if self.tx.send(item).await.is_err() {
            return false;
        }
        if is_frame {
            self.counters.queue_depth.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    fn log_overflow(&self) {
        let mut last = self.last_overflow_log.lock();
        let now = Instant::now();
        let due = last.is_none_or(|t| now.duration_since(t) >= OVERFLOW_LOG_INTERVAL);
        if due {
            *last = Some(now);
            let dropped = self.counters.dropped_frames.load(Ordering::Relaxed);
            tracing::error!(dropped_total = dropped, "event queue is full, dropping new frames");
        }
    }
}

/// Consumer half of the queue, shared by all workers. The inner mutex makes
/// each frame land at exactly one worker.
#[derive(Clone)]
pub(crate) struct FrameReceiver {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueueItem>>>,
}

impl FrameReceiver {
    /// Receive the next item; `None` once the queue is closed and drained.
    pub(crate) async fn recv(&self) -> Option<QueueItem> {
        self.rx.lock().await.recv().await
    }
}
