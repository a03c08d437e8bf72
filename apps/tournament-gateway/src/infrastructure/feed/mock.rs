//! Mock feed connector for testing.
//!
//! Every `connect` opens an in-process connection whose frames are pushed
//! by the test through a [`MockFeedHandle`]. Connect attempts can be made
//! to fail, and every connection remembers whether it was closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use super::codec::KlineCodec;
use crate::application::ports::{FeedConnection, FeedConnector, FeedError, FeedMessage};
use crate::domain::streaming::StreamKey;

/// A frame injected into a mock connection.
#[derive(Debug, Clone)]
pub enum MockFrame {
    /// Raw text, decoded with the Binance kline codec.
    Text(String),
    /// Transport failure.
    Error(String),
    /// Clean close from the upstream side.
    Close,
}

/// Test-side handle of one mock connection.
#[derive(Debug, Clone)]
pub struct MockFeedHandle {
    key: StreamKey,
    tx: mpsc::UnboundedSender<MockFrame>,
    closed: Arc<AtomicBool>,
}

impl MockFeedHandle {
    /// Key the connection was opened for.
    #[must_use]
    pub const fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Push a frame. Returns `false` if the connection is gone.
    pub fn push(&self, frame: MockFrame) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Push a text frame.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.push(MockFrame::Text(text.into()))
    }

    /// Whether the relay closed this connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct MockState {
    connections: Vec<MockFeedHandle>,
}

/// In-process [`FeedConnector`] driven by tests.
#[derive(Debug, Default)]
pub struct MockFeedConnector {
    state: Mutex<MockState>,
    attempts: AtomicUsize,
    failures_remaining: AtomicUsize,
    changed: Notify,
}

impl MockFeedConnector {
    /// Create a connector whose connects always succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Connect attempts so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful connections so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Handles of every successful connection, in order.
    #[must_use]
    pub fn connections(&self) -> Vec<MockFeedHandle> {
        self.state.lock().connections.clone()
    }

    /// Latest connection opened for `key`.
    #[must_use]
    pub fn latest(&self, key: &StreamKey) -> Option<MockFeedHandle> {
        self.state
            .lock()
            .connections
            .iter()
            .rev()
            .find(|c| &c.key == key)
            .cloned()
    }

    /// Wait until at least `count` connections have been opened.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.changed.notified();
                if self.connection_count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    /// Wait until at least `count` connect attempts have been made.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.changed.notified();
                if self.attempts() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl FeedConnector for MockFeedConnector {
    async fn connect(&self, key: &StreamKey) -> Result<Box<dyn FeedConnection>, FeedError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            self.changed.notify_waiters();
            return Err(FeedError::ConnectionFailed(format!(
                "mock connect refused for {key}"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        self.state.lock().connections.push(MockFeedHandle {
            key: key.clone(),
            tx,
            closed: Arc::clone(&closed),
        });
        self.changed.notify_waiters();

        Ok(Box::new(MockFeedConnection {
            rx,
            closed,
            codec: KlineCodec::new(),
        }))
    }
}

struct MockFeedConnection {
    rx: mpsc::UnboundedReceiver<MockFrame>,
    closed: Arc<AtomicBool>,
    codec: KlineCodec,
}

#[async_trait]
impl FeedConnection for MockFeedConnection {
    async fn next_message(&mut self) -> Result<Option<FeedMessage>, FeedError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }

        match self.rx.recv().await {
            Some(MockFrame::Text(text)) => Ok(Some(match self.codec.decode(&text) {
                Ok(Some(kline)) => FeedMessage::Update(kline),
                Ok(None) => FeedMessage::Ignored,
                Err(e) => FeedMessage::Malformed(e.to_string()),
            })),
            Some(MockFrame::Error(message)) => Err(FeedError::Transport(message)),
            Some(MockFrame::Close) => Ok(None),
            // Test dropped every handle; keep the connection idle.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}
