//! Subscription Registry
//!
//! Canonical set of joined channels, deduplicated by channel string and
//! kept in first-join order so reconnects replay joins deterministically.
//! Mutations are thread-safe; the connection manager reads a snapshot on
//! every (re)connect and emits a join for each entry.

use std::collections::HashSet;

use parking_lot::RwLock;

#[derive(Debug, Default)]
struct RegistryState {
    /// Channels in first-join order.
    ordered: Vec<String>,
    /// Dedupe index over `ordered`.
    members: HashSet<String>,
    /// Options firehose joined.
    firehose: bool,
}

/// Thread-safe registry of currently-joined channels.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel. Returns `true` if the channel was not already present.
    pub fn join(&self, channel: &str) -> bool {
        let mut state = self.state.write();
        if state.members.contains(channel) {
            return false;
        }
        state.members.insert(channel.to_string());
        state.ordered.push(channel.to_string());
        true
    }

    /// Remove a channel. Returns `true` if it was present; removing an
    /// unknown channel is a no-op.
    pub fn leave(&self, channel: &str) -> bool {
        let mut state = self.state.write();
        if !state.members.remove(channel) {
            return false;
        }
        state.ordered.retain(|c| c != channel);
        true
    }

    /// Remove every channel and clear the firehose flag. Returns the
    /// channels that were joined, in first-join order.
    pub fn leave_all(&self) -> Vec<String> {
        let mut state = self.state.write();
        state.members.clear();
        state.firehose = false;
        std::mem::take(&mut state.ordered)
    }

    /// Mark the firehose as joined. Returns `true` on the first call.
    pub fn set_firehose(&self) -> bool {
        let mut state = self.state.write();
        let was = state.firehose;
        state.firehose = true;
        !was
    }

    /// Clear the firehose flag. Returns `true` if it was set.
    pub fn clear_firehose(&self) -> bool {
        let mut state = self.state.write();
        let was = state.firehose;
        state.firehose = false;
        was
    }

    /// Whether the firehose is joined.
    #[must_use]
    pub fn firehose(&self) -> bool {
        self.state.read().firehose
    }

    /// Whether a channel is joined.
    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.state.read().members.contains(channel)
    }

    /// Snapshot of joined channels in first-join order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.state.read().ordered.clone()
    }

    /// Number of joined channels (firehose excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().ordered.len()
    }

    /// Whether no channels are joined and the firehose is off.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.read();
        state.ordered.is_empty() && !state.firehose
    }
}
