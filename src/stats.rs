//! Client Counters
//!
//! Per-client atomic counters behind `Client::stats()`. No globals; every
//! client owns its own set.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Shared mutable counters updated by the reader, queue, and workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) data_messages: AtomicU64,
    pub(crate) text_messages: AtomicU64,
    pub(crate) dropped_frames: AtomicU64,
    pub(crate) decode_errors: AtomicU64,
    pub(crate) events_dispatched: AtomicU64,
    pub(crate) queue_depth: AtomicUsize,
}

impl Counters {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn snapshot(&self) -> ClientStats {
        ClientStats {
            data_messages: self.data_messages.load(Ordering::Relaxed),
            text_messages: self.text_messages.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// A coherent snapshot of client counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Binary data frames received from the socket or replay files.
    pub data_messages: u64,
    /// Text (control/ack) frames received.
    pub text_messages: u64,
    /// Frames dropped because the event queue was full.
    pub dropped_frames: u64,
    /// Protocol errors recorded by the decoder.
    pub decode_errors: u64,
    /// Decoded events handed to the dispatch layer (including events whose
    /// callback slot was empty).
    pub events_dispatched: u64,
    /// Approximate queue depth at snapshot time.
    pub queue_depth: usize,
}
