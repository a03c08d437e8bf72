//! Subscription Types
//!
//! Domain types for tracking the downstream clients attached to a shared
//! stream.
//!
//! # Design
//!
//! - A [`ClientHandle`] is the write side of one client session: a
//!   non-blocking, best-effort text sink.
//! - A [`SubscriberSet`] keys handles by [`SubscriberId`] so add and remove
//!   are O(1) and a broadcast is linear in the subscriber count.
//!
//! Removal is idempotent: removing an id that is not present is a no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

// =============================================================================
// Types
// =============================================================================

/// Unique identity of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of a best-effort send to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame was queued for the client.
    Queued,
    /// Client buffer was full; frame dropped.
    Dropped,
    /// Client session is gone; frame ignored.
    Closed,
}

// =============================================================================
// Client Handle
// =============================================================================

/// Write side of a downstream client session.
///
/// Frames are queued on a bounded channel drained by the session task.
/// Sending never blocks and never fails: a full buffer drops the frame and
/// a closed session turns the send into a no-op.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<str>>,
}

impl ClientHandle {
    /// Create a handle and the receiver its session task drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: SubscriberId::new(),
                tx,
            },
            rx,
        )
    }

    /// Identity of this client.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Queue a text frame for the client.
    pub fn send_text(&self, text: Arc<str>) -> SendOutcome {
        match self.tx.try_send(text) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => SendOutcome::Dropped,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Whether the session side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// Subscriber Set
// =============================================================================

/// Tally of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames queued.
    pub queued: usize,
    /// Frames dropped on full buffers.
    pub dropped: usize,
    /// Subscribers whose session was already closed.
    pub closed: usize,
}

/// Set of clients attached to one stream.
#[derive(Debug, Default)]
pub struct SubscriberSet {
    clients: HashMap<SubscriberId, ClientHandle>,
}

impl SubscriberSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client. Returns `false` if the id was already present.
    pub fn insert(&mut self, client: ClientHandle) -> bool {
        self.clients.insert(client.id(), client).is_none()
    }

    /// Remove a client. Returns `false` if the id was not present.
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Whether the id is present.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Drop every client, closing their channels. Returns how many left.
    pub fn clear(&mut self) -> usize {
        let count = self.clients.len();
        self.clients.clear();
        count
    }

    /// Number of clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send one frame to every client, best-effort.
    pub fn broadcast(&self, text: &Arc<str>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for client in self.clients.values() {
            match client.send_text(Arc::clone(text)) {
                SendOutcome::Queued => report.queued += 1,
                SendOutcome::Dropped => report.dropped += 1,
                SendOutcome::Closed => report.closed += 1,
            }
        }
        report
    }
}
