//! Shared Stream
//!
//! One [`Stream`] binds the upstream feed for a key to the clients attached
//! to it and caches the last update for late joiners.
//!
//! All mutations of the subscriber set and the cached payload happen under
//! one short, non-async lock, so a join (greeting plus snapshot) and a live
//! delivery never interleave, and nothing is delivered once the last
//! subscriber has left.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::upstream::FeedState;
use crate::domain::streaming::{Kline, ServerFrame, StreamKey};
use crate::domain::subscription::{BroadcastReport, ClientHandle, SubscriberId, SubscriberSet};
use crate::infrastructure::metrics;

/// Generation number distinguishing successive streams for the same key.
pub type StreamId = u64;

/// Outcome of detaching a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// The subscriber was not attached.
    NotPresent,
    /// The subscriber left; this many remain.
    Remaining(usize),
    /// The last subscriber left; the stream is now closed.
    Emptied,
}

/// Point-in-time view of a stream, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    /// Normalized key.
    pub key: String,
    /// Attached subscribers.
    pub subscribers: usize,
    /// Upstream connection state.
    pub feed_state: FeedState,
    /// Whether a snapshot is cached.
    pub has_snapshot: bool,
    /// Updates received since the stream was created.
    pub updates_received: u64,
    /// Reconnection attempts since the stream was created.
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct StreamState {
    subscribers: SubscriberSet,
    last_payload: Option<Kline>,
    closed: bool,
}

/// Multiplexing unit: one upstream feed, N subscribers, one cached update.
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    key: StreamKey,
    state: Mutex<StreamState>,
    feed_state: RwLock<FeedState>,
    updates_received: AtomicU64,
    reconnects: AtomicU64,
    cancel: CancellationToken,
}

impl Stream {
    pub(crate) fn new(id: StreamId, key: StreamKey) -> Self {
        Self {
            id,
            key,
            state: Mutex::new(StreamState::default()),
            feed_state: RwLock::new(FeedState::Connecting),
            updates_received: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Generation number of this stream.
    #[must_use]
    pub const fn id(&self) -> StreamId {
        self.id
    }

    /// Normalized key.
    #[must_use]
    pub const fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Attach a client: greet it, replay the snapshot if any, then add it
    /// to the fan-out set.
    pub(crate) fn attach(&self, client: ClientHandle, hello: &ServerFrame) -> usize {
        let mut state = self.state.lock();

        send_frame(&client, hello);
        if let Some(last) = &state.last_payload {
            send_frame(
                &client,
                &ServerFrame::Snapshot {
                    data: last.clone(),
                },
            );
        }

        state.subscribers.insert(client);
        state.subscribers.len()
    }

    /// Detach a client. Closing the stream when it was the last one.
    pub(crate) fn detach(&self, id: SubscriberId) -> Detached {
        let mut state = self.state.lock();

        if !state.subscribers.remove(id) {
            return Detached::NotPresent;
        }

        if !state.subscribers.is_empty() {
            return Detached::Remaining(state.subscribers.len());
        }

        state.closed = true;
        self.cancel.cancel();
        Detached::Emptied
    }

    /// Close the stream with clients still attached, dropping their
    /// handles so each session sees its channel end.
    ///
    /// Returns the number of clients let go.
    pub(crate) fn abandon(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let released = state.subscribers.clear();
        self.cancel.cancel();
        released
    }

    /// Cache `kline` and deliver it to every subscriber.
    ///
    /// Returns `None` when the stream is closed.
    pub fn publish(&self, kline: Kline) -> Option<BroadcastReport> {
        self.updates_received.fetch_add(1, Ordering::Relaxed);

        let text = match ServerFrame::Kline(kline.clone()).to_json() {
            Ok(json) => Arc::<str>::from(json),
            Err(e) => {
                tracing::warn!(stream = %self.key, error = %e, "Failed to encode kline frame");
                return Some(BroadcastReport::default());
            }
        };

        let mut state = self.state.lock();
        if state.closed {
            return None;
        }

        state.last_payload = Some(kline);
        let report = state.subscribers.broadcast(&text);
        drop(state);

        record_report(&report);
        Some(report)
    }

    /// Tell every subscriber that an upstream frame could not be parsed.
    ///
    /// Returns `None` when the stream is closed.
    pub fn broadcast_error(&self, message: &str) -> Option<BroadcastReport> {
        let text = match ServerFrame::parse_error(message).to_json() {
            Ok(json) => Arc::<str>::from(json),
            Err(e) => {
                tracing::warn!(stream = %self.key, error = %e, "Failed to encode error frame");
                return Some(BroadcastReport::default());
            }
        };

        let state = self.state.lock();
        if state.closed {
            return None;
        }

        let report = state.subscribers.broadcast(&text);
        drop(state);

        record_report(&report);
        Some(report)
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Whether `id` is attached.
    #[must_use]
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.state.lock().subscribers.contains(id)
    }

    /// Last cached update.
    #[must_use]
    pub fn last_payload(&self) -> Option<Kline> {
        self.state.lock().last_payload.clone()
    }

    /// Whether the last subscriber has left.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Current upstream connection state.
    #[must_use]
    pub fn feed_state(&self) -> FeedState {
        *self.feed_state.read()
    }

    pub(crate) fn set_feed_state(&self, state: FeedState) {
        *self.feed_state.write() = state;
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Resolves once the stream has been closed.
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Point-in-time view for health reporting.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        let state = self.state.lock();
        StreamStats {
            key: self.key.to_string(),
            subscribers: state.subscribers.len(),
            feed_state: self.feed_state(),
            has_snapshot: state.last_payload.is_some(),
            updates_received: self.updates_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

fn send_frame(client: &ClientHandle, frame: &ServerFrame) {
    match frame.to_json() {
        Ok(json) => {
            client.send_text(json.into());
        }
        Err(e) => {
            tracing::warn!(subscriber = %client.id(), error = %e, "Failed to encode frame");
        }
    }
}

fn record_report(report: &BroadcastReport) {
    metrics::record_frames_sent(report.queued as u64);
    metrics::record_frames_dropped(report.dropped as u64);
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use tokio::sync::mpsc;

    use super::*;

    fn kline(close: &str) -> Kline {
        Kline {
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            open_time: 1,
            close_time: 2,
            open: Decimal::ONE,
            high: Decimal::TWO,
            low: Decimal::ONE,
            close: Decimal::from_str(close).unwrap(),
            volume: Decimal::TEN,
            is_final: false,
        }
    }

    fn frames(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<ServerFrame> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn stream() -> Stream {
        Stream::new(1, StreamKey::new("BTCUSDT", "1m"))
    }

    #[test]
    fn join_without_payload_gets_hello_only() {
        let stream = stream();
        let (client, mut rx) = ClientHandle::channel(8);

        stream.attach(client, &ServerFrame::hello("BTCUSDT", "1m"));

        let received = frames(&mut rx);
        assert_eq!(received, vec![ServerFrame::hello("BTCUSDT", "1m")]);
    }

    #[test]
    fn join_with_payload_gets_hello_then_snapshot() {
        let stream = stream();
        stream.publish(kline("50000.5"));

        let (client, mut rx) = ClientHandle::channel(8);
        stream.attach(client, &ServerFrame::hello("btcusdt", "1m"));

        let received = frames(&mut rx);
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0], ServerFrame::Hello { .. }));
        assert_eq!(
            received[1],
            ServerFrame::Snapshot {
                data: kline("50000.5")
            }
        );
    }

    #[test]
    fn publish_overwrites_snapshot_and_fans_out() {
        let stream = stream();
        let (a, mut rx_a) = ClientHandle::channel(8);
        let (b, mut rx_b) = ClientHandle::channel(8);
        stream.attach(a, &ServerFrame::hello("BTCUSDT", "1m"));
        stream.attach(b, &ServerFrame::hello("BTCUSDT", "1m"));
        frames(&mut rx_a);
        frames(&mut rx_b);

        let report = stream.publish(kline("1.5")).unwrap();
        stream.publish(kline("2.5"));

        assert_eq!(report.queued, 2);
        assert_eq!(stream.last_payload(), Some(kline("2.5")));

        let expected = vec![
            ServerFrame::Kline(kline("1.5")),
            ServerFrame::Kline(kline("2.5")),
        ];
        assert_eq!(frames(&mut rx_a), expected);
        assert_eq!(frames(&mut rx_b), expected);
    }

    #[test]
    fn detach_reports_remaining_then_emptied() {
        let stream = stream();
        let (a, _rx_a) = ClientHandle::channel(8);
        let (b, _rx_b) = ClientHandle::channel(8);
        let (id_a, id_b) = (a.id(), b.id());
        stream.attach(a, &ServerFrame::hello("BTCUSDT", "1m"));
        stream.attach(b, &ServerFrame::hello("BTCUSDT", "1m"));

        assert_eq!(stream.detach(id_a), Detached::Remaining(1));
        assert_eq!(stream.detach(id_a), Detached::NotPresent);
        assert!(!stream.is_closed());

        assert_eq!(stream.detach(id_b), Detached::Emptied);
        assert!(stream.is_closed());
        assert!(stream.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn abandon_closes_every_client_channel() {
        let stream = stream();
        let (a, mut rx_a) = ClientHandle::channel(8);
        let (b, mut rx_b) = ClientHandle::channel(8);
        let id_a = a.id();
        stream.attach(a, &ServerFrame::hello("BTCUSDT", "1m"));
        stream.attach(b, &ServerFrame::hello("BTCUSDT", "1m"));
        frames(&mut rx_a);
        frames(&mut rx_b);

        assert_eq!(stream.abandon(), 2);

        assert!(stream.is_closed());
        assert!(stream.cancel.is_cancelled());
        assert_eq!(stream.subscriber_count(), 0);
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());
        assert_eq!(stream.detach(id_a), Detached::NotPresent);
        assert!(stream.publish(kline("4")).is_none());
    }

    #[test]
    fn closed_stream_refuses_delivery() {
        let stream = stream();
        let (client, _rx) = ClientHandle::channel(8);
        let id = client.id();
        stream.attach(client, &ServerFrame::hello("BTCUSDT", "1m"));
        stream.detach(id);

        assert!(stream.publish(kline("3")).is_none());
        assert!(stream.broadcast_error("bad").is_none());
        assert!(stream.last_payload().is_none());
    }

    #[test]
    fn parse_error_reaches_every_subscriber() {
        let stream = stream();
        let (a, mut rx_a) = ClientHandle::channel(8);
        let (b, mut rx_b) = ClientHandle::channel(8);
        stream.attach(a, &ServerFrame::hello("BTCUSDT", "1m"));
        stream.attach(b, &ServerFrame::hello("BTCUSDT", "1m"));
        frames(&mut rx_a);
        frames(&mut rx_b);

        stream.broadcast_error("expected value at line 1 column 1");

        let expected = vec![ServerFrame::parse_error("expected value at line 1 column 1")];
        assert_eq!(frames(&mut rx_a), expected);
        assert_eq!(frames(&mut rx_b), expected);
    }

    #[test]
    fn stats_reflect_state() {
        let stream = stream();
        let (client, _rx) = ClientHandle::channel(8);
        stream.attach(client, &ServerFrame::hello("BTCUSDT", "1m"));
        stream.publish(kline("4"));
        stream.record_reconnect();
        stream.set_feed_state(FeedState::Open);

        let stats = stream.stats();
        assert_eq!(stats.key, "btcusdt@1m");
        assert_eq!(stats.subscribers, 1);
        assert_eq!(stats.feed_state, FeedState::Open);
        assert!(stats.has_snapshot);
        assert_eq!(stats.updates_received, 1);
        assert_eq!(stats.reconnects, 1);
    }
}
