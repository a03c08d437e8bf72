//! Upstream Feed Task
//!
//! Drives the upstream connection of one [`Stream`]: connect, pump
//! messages into the stream, and reconnect after a fixed delay while
//! subscribers remain.
//!
//! The task stops as soon as the stream is closed (its cancellation token
//! fires) or when it finds that the registry entry for its key now belongs
//! to a different stream. It never inserts into the registry; once the
//! reconnect cap is exhausted it evicts its own stream.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::reconnect::ReconnectPolicy;
use super::registry::RegistryInner;
use super::stream::Stream;
use crate::application::ports::{FeedConnection, FeedError, FeedMessage};
use crate::infrastructure::metrics;

/// Upstream connection state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    /// Connection attempt in progress.
    Connecting,
    /// Connected and receiving.
    Open,
    /// Upstream closed cleanly; waiting to reconnect.
    ClosedClean,
    /// Upstream failed; waiting to reconnect.
    ClosedError,
}

enum PumpExit {
    /// Upstream closed cleanly.
    Clean,
    /// Connection failed.
    Error(FeedError),
    /// The stream was closed.
    Cancelled,
}

enum Step {
    Message(Result<Option<FeedMessage>, FeedError>),
    Cancelled,
}

/// Feed task for one stream.
pub(crate) struct UpstreamFeed {
    registry: Arc<RegistryInner>,
    stream: Arc<Stream>,
    policy: ReconnectPolicy,
}

impl UpstreamFeed {
    pub(crate) fn new(registry: Arc<RegistryInner>, stream: Arc<Stream>) -> Self {
        let policy = ReconnectPolicy::new(registry.settings.reconnect.clone());
        Self {
            registry,
            stream,
            policy,
        }
    }

    /// Run until the stream closes or reconnection is abandoned.
    pub(crate) async fn run(mut self) {
        let key = self.stream.key().clone();
        tracing::debug!(stream = %key, id = self.stream.id(), "Upstream feed task started");

        loop {
            self.stream.set_feed_state(FeedState::Connecting);

            let connected = tokio::select! {
                biased;
                () = self.stream.cancelled() => break,
                result = self.registry.connector.connect(&key) => result,
            };

            let exit = match connected {
                Ok(mut connection) => {
                    if !self.registry.is_registered(&self.stream) {
                        connection.close().await;
                        break;
                    }

                    tracing::info!(stream = %key, "Upstream connected");
                    self.policy.reset();
                    self.stream.set_feed_state(FeedState::Open);
                    metrics::upstream_opened();

                    let exit = self.pump(connection.as_mut()).await;
                    metrics::upstream_closed();
                    exit
                }
                Err(e) => PumpExit::Error(e),
            };

            match exit {
                PumpExit::Cancelled => break,
                PumpExit::Clean => {
                    tracing::info!(stream = %key, "Upstream closed");
                    self.stream.set_feed_state(FeedState::ClosedClean);
                }
                PumpExit::Error(e) => {
                    tracing::warn!(stream = %key, error = %e, "Upstream error");
                    self.stream.set_feed_state(FeedState::ClosedError);
                }
            }

            if !self.should_reconnect() {
                break;
            }

            let Some(delay) = self.policy.next_delay() else {
                tracing::error!(
                    stream = %key,
                    attempts = self.policy.attempt_count(),
                    "Max reconnection attempts exceeded"
                );
                self.registry.evict(&self.stream);
                break;
            };

            tracing::info!(
                stream = %key,
                delay_ms = delay.as_millis(),
                attempt = self.policy.attempt_count(),
                "Reconnecting upstream"
            );

            tokio::select! {
                biased;
                () = self.stream.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            if !self.should_reconnect() {
                break;
            }

            self.stream.record_reconnect();
            metrics::record_reconnect();
        }

        tracing::debug!(stream = %key, id = self.stream.id(), "Upstream feed task stopped");
    }

    async fn pump(&self, connection: &mut dyn FeedConnection) -> PumpExit {
        loop {
            let step = tokio::select! {
                biased;
                () = self.stream.cancelled() => Step::Cancelled,
                message = connection.next_message() => Step::Message(message),
            };

            match step {
                Step::Cancelled => {
                    connection.close().await;
                    return PumpExit::Cancelled;
                }
                Step::Message(Ok(Some(FeedMessage::Update(kline)))) => {
                    metrics::record_update_received();
                    let started = Instant::now();
                    if self.stream.publish(kline).is_none() {
                        connection.close().await;
                        return PumpExit::Cancelled;
                    }
                    metrics::record_fanout_duration(started.elapsed());
                }
                Step::Message(Ok(Some(FeedMessage::Malformed(reason)))) => {
                    tracing::warn!(stream = %self.stream.key(), error = %reason, "Failed to parse upstream frame");
                    metrics::record_parse_error();
                    self.stream.broadcast_error(&reason);
                }
                Step::Message(Ok(Some(FeedMessage::Ignored))) => {
                    tracing::trace!(stream = %self.stream.key(), "Ignored upstream frame");
                }
                Step::Message(Ok(None)) => return PumpExit::Clean,
                Step::Message(Err(e)) => {
                    connection.close().await;
                    return PumpExit::Error(e);
                }
            }
        }
    }

    fn should_reconnect(&self) -> bool {
        !self.stream.is_closed()
            && self.stream.subscriber_count() > 0
            && self.registry.is_registered(&self.stream)
    }
}
