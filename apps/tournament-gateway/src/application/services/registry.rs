//! Stream Registry
//!
//! Process-wide map from [`StreamKey`] to the live [`Stream`] for that key.
//!
//! # Invariants
//!
//! - At most one stream per key, and only while it has subscribers.
//! - A stream is created (and its upstream feed started) by the first
//!   subscriber and removed by the last one.
//! - The registry lock is always taken before a stream's lock, never the
//!   other way round.
//!
//! Subscribers are held through a [`Subscription`] guard: dropping it
//! detaches the client exactly once, however the session ends.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::reconnect::ReconnectConfig;
use super::stream::{Detached, Stream, StreamStats};
use super::upstream::{FeedState, UpstreamFeed};
use crate::application::ports::FeedConnector;
use crate::domain::streaming::{Kline, ServerFrame, StreamKey};
use crate::domain::subscription::{ClientHandle, SubscriberId};
use crate::infrastructure::metrics;

/// Default per-client outbound buffer, in frames.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// Tunables for the relay.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Upstream reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Per-client outbound buffer, in frames.
    pub client_buffer: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            client_buffer: DEFAULT_CLIENT_BUFFER,
        }
    }
}

/// Aggregate counters for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySummary {
    /// Registered streams.
    pub active: usize,
    /// Subscribers across all streams.
    pub subscribers: usize,
    /// Streams whose upstream connection is open.
    pub upstream_connected: usize,
}

pub(crate) struct RegistryInner {
    streams: Mutex<HashMap<StreamKey, Arc<Stream>>>,
    pub(crate) connector: Arc<dyn FeedConnector>,
    pub(crate) settings: RelaySettings,
    next_stream_id: AtomicU64,
}

impl RegistryInner {
    /// Whether `stream` is still the registered stream for its key.
    pub(crate) fn is_registered(&self, stream: &Stream) -> bool {
        self.streams
            .lock()
            .get(stream.key())
            .is_some_and(|current| current.id() == stream.id())
    }

    /// Remove `stream` whose upstream was given up on, ending the sessions
    /// of the clients still attached. The next subscriber for the key
    /// opens a fresh stream.
    pub(crate) fn evict(&self, stream: &Stream) {
        let mut streams = self.streams.lock();

        if streams
            .get(stream.key())
            .is_some_and(|current| current.id() == stream.id())
        {
            streams.remove(stream.key());
        }
        let released = stream.abandon();

        metrics::set_active_streams(streams.len());
        drop(streams);

        for _ in 0..released {
            metrics::subscriber_detached();
        }
        tracing::warn!(stream = %stream.key(), released, "Stream evicted, upstream abandoned");
    }

    fn detach(&self, stream: &Stream, subscriber: SubscriberId) {
        let mut streams = self.streams.lock();

        match stream.detach(subscriber) {
            Detached::NotPresent => return,
            Detached::Remaining(remaining) => {
                tracing::debug!(stream = %stream.key(), %subscriber, remaining, "Subscriber detached");
            }
            Detached::Emptied => {
                if streams
                    .get(stream.key())
                    .is_some_and(|current| current.id() == stream.id())
                {
                    streams.remove(stream.key());
                }
                tracing::info!(stream = %stream.key(), "Last subscriber left, stream closed");
            }
        }

        metrics::set_active_streams(streams.len());
        drop(streams);
        metrics::subscriber_detached();
    }
}

/// Shared registry of live streams.
///
/// Cheap to clone; all clones share the same map.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.stream_count())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl StreamRegistry {
    /// Create an empty registry opening upstream feeds through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn FeedConnector>, settings: RelaySettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                streams: Mutex::new(HashMap::new()),
                connector,
                settings,
                next_stream_id: AtomicU64::new(1),
            }),
        }
    }

    /// Relay tunables.
    #[must_use]
    pub fn settings(&self) -> &RelaySettings {
        &self.inner.settings
    }

    /// Attach `client` to the stream for `symbol`/`interval`, creating the
    /// stream and starting its upstream feed if none exists.
    ///
    /// The client receives a `hello` frame echoing the raw request values,
    /// then a `snapshot` if the stream has one, before any live update.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "dropping the subscription detaches the client immediately"]
    pub fn subscribe(&self, client: ClientHandle, symbol: &str, interval: &str) -> Subscription {
        let key = StreamKey::new(symbol, interval);
        let hello = ServerFrame::hello(symbol, interval);
        let subscriber_id = client.id();

        let mut streams = self.inner.streams.lock();

        let stream = if let Some(existing) = streams.get(&key) {
            Arc::clone(existing)
        } else {
            let id = self.inner.next_stream_id.fetch_add(1, Ordering::Relaxed);
            let stream = Arc::new(Stream::new(id, key.clone()));
            streams.insert(key.clone(), Arc::clone(&stream));
            metrics::set_active_streams(streams.len());

            tracing::info!(stream = %key, id, "Opening shared stream");
            tokio::spawn(UpstreamFeed::new(Arc::clone(&self.inner), Arc::clone(&stream)).run());
            stream
        };

        let subscribers = stream.attach(client, &hello);
        drop(streams);

        metrics::subscriber_attached();
        tracing::debug!(stream = %key, subscriber = %subscriber_id, subscribers, "Subscriber attached");

        Subscription {
            registry: Arc::clone(&self.inner),
            stream,
            subscriber_id,
            active: true,
        }
    }

    /// Number of registered streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.inner.streams.lock().len()
    }

    /// Whether a stream is registered for `key`.
    #[must_use]
    pub fn contains(&self, key: &StreamKey) -> bool {
        self.inner.streams.lock().contains_key(key)
    }

    /// Subscribers of the stream for `key`, if registered.
    #[must_use]
    pub fn subscriber_count(&self, key: &StreamKey) -> Option<usize> {
        let stream = self.inner.streams.lock().get(key).cloned()?;
        Some(stream.subscriber_count())
    }

    /// Cached update of the stream for `key`, if registered and populated.
    #[must_use]
    pub fn last_payload(&self, key: &StreamKey) -> Option<Kline> {
        let stream = self.inner.streams.lock().get(key).cloned()?;
        stream.last_payload()
    }

    /// Registered stream for `key`.
    #[must_use]
    pub fn stream(&self, key: &StreamKey) -> Option<Arc<Stream>> {
        self.inner.streams.lock().get(key).cloned()
    }

    /// Per-stream statistics, sorted by key.
    #[must_use]
    pub fn stats(&self) -> Vec<StreamStats> {
        let mut stats: Vec<_> = self.snapshot().iter().map(|s| s.stats()).collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }

    /// Aggregate counters.
    #[must_use]
    pub fn summary(&self) -> RegistrySummary {
        let streams = self.snapshot();
        RegistrySummary {
            active: streams.len(),
            subscribers: streams.iter().map(|s| s.subscriber_count()).sum(),
            upstream_connected: streams
                .iter()
                .filter(|s| s.feed_state() == FeedState::Open)
                .count(),
        }
    }

    fn snapshot(&self) -> Vec<Arc<Stream>> {
        self.inner.streams.lock().values().cloned().collect()
    }
}

/// Guard keeping one client attached to a stream.
///
/// Dropping the guard (or calling [`Subscription::close`]) detaches the
/// client; the last detach closes the stream and its upstream connection.
pub struct Subscription {
    registry: Arc<RegistryInner>,
    stream: Arc<Stream>,
    subscriber_id: SubscriberId,
    active: bool,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", self.stream.key())
            .field("subscriber_id", &self.subscriber_id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Key of the stream this client is attached to.
    #[must_use]
    pub fn key(&self) -> &StreamKey {
        self.stream.key()
    }

    /// Identity of the attached client.
    #[must_use]
    pub const fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    /// The stream this client is attached to.
    #[must_use]
    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }

    /// Detach now.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.active) {
            self.registry.detach(&self.stream, self.subscriber_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::ports::{FeedConnection, FeedError, FeedMessage};

    /// Connection that stays open until closed.
    struct IdleConnection;

    #[async_trait]
    impl FeedConnection for IdleConnection {
        async fn next_message(&mut self) -> Result<Option<FeedMessage>, FeedError> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    struct IdleConnector;

    #[async_trait]
    impl FeedConnector for IdleConnector {
        async fn connect(&self, _key: &StreamKey) -> Result<Box<dyn FeedConnection>, FeedError> {
            Ok(Box::new(IdleConnection))
        }
    }

    fn registry() -> StreamRegistry {
        StreamRegistry::new(Arc::new(IdleConnector), RelaySettings::default())
    }

    fn client() -> (ClientHandle, mpsc::Receiver<Arc<str>>) {
        ClientHandle::channel(16)
    }

    #[tokio::test]
    async fn first_subscriber_creates_stream() {
        let registry = registry();
        let (c, _rx) = client();

        let sub = registry.subscribe(c, "BTCUSDT", "1m");

        assert_eq!(sub.key().as_str(), "btcusdt@1m");
        assert!(registry.contains(sub.key()));
        assert_eq!(registry.stream_count(), 1);
    }

    #[tokio::test]
    async fn equivalent_requests_share_one_stream() {
        let registry = registry();
        let (a, _rx_a) = client();
        let (b, _rx_b) = client();

        let sub_a = registry.subscribe(a, "BTCUSDT", "1m");
        let sub_b = registry.subscribe(b, " btcusdt ", "1m");

        assert_eq!(registry.stream_count(), 1);
        assert!(Arc::ptr_eq(sub_a.stream(), sub_b.stream()));
        assert_eq!(registry.subscriber_count(sub_a.key()), Some(2));
    }

    #[tokio::test]
    async fn last_drop_removes_stream() {
        let registry = registry();
        let (a, _rx_a) = client();
        let (b, _rx_b) = client();

        let sub_a = registry.subscribe(a, "ethusdt", "5m");
        let sub_b = registry.subscribe(b, "ethusdt", "5m");
        let key = sub_a.key().clone();
        let stream = Arc::clone(sub_a.stream());

        drop(sub_a);
        assert_eq!(registry.subscriber_count(&key), Some(1));

        sub_b.close();
        assert!(!registry.contains(&key));
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn resubscribe_after_close_gets_fresh_stream() {
        let registry = registry();
        let (a, _rx_a) = client();
        let first = registry.subscribe(a, "solusdt", "1m");
        let first_stream = Arc::clone(first.stream());
        drop(first);

        let (b, _rx_b) = client();
        let second = registry.subscribe(b, "solusdt", "1m");

        assert!(!Arc::ptr_eq(&first_stream, second.stream()));
        assert!(second.stream().id() > first_stream.id());
        assert!(!second.stream().is_closed());
    }

    #[tokio::test]
    async fn subscriber_receives_hello_with_raw_values() {
        let registry = registry();
        let (c, mut rx) = client();

        let _sub = registry.subscribe(c, "BTCUSDT", "1m");

        let text = rx.recv().await.unwrap();
        let frame: ServerFrame = serde_json::from_str(&text).unwrap();
        assert_eq!(frame, ServerFrame::hello("BTCUSDT", "1m"));
    }

    #[tokio::test]
    async fn summary_counts_streams_and_subscribers() {
        let registry = registry();
        let (a, _rx_a) = client();
        let (b, _rx_b) = client();
        let (c, _rx_c) = client();

        let _s1 = registry.subscribe(a, "btcusdt", "1m");
        let _s2 = registry.subscribe(b, "btcusdt", "1m");
        let _s3 = registry.subscribe(c, "ethusdt", "1m");

        let summary = registry.summary();
        assert_eq!(summary.active, 2);
        assert_eq!(summary.subscribers, 3);

        let stats = registry.stats();
        assert_eq!(stats[0].key, "btcusdt@1m");
        assert_eq!(stats[1].key, "ethusdt@1m");
    }
}
