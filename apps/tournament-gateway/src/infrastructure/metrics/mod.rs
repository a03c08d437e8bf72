//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: updates received upstream, frames sent, dropped and
//!   parse failures
//! - **Streams**: active shared streams, attached subscribers and live
//!   upstream connections
//! - **Reconnects**: upstream reconnection attempts
//! - **Latency**: time to fan one update out to all subscribers
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port. Recording before
//! [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and return its handle.
///
/// Subsequent calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

const UPDATES_RECEIVED: &str = "price_relay_updates_received_total";
const FRAMES_SENT: &str = "price_relay_frames_sent_total";
const FRAMES_DROPPED: &str = "price_relay_frames_dropped_total";
const PARSE_ERRORS: &str = "price_relay_parse_errors_total";
const RECONNECTS: &str = "price_relay_reconnects_total";
const ACTIVE_STREAMS: &str = "price_relay_active_streams";
const SUBSCRIBERS: &str = "price_relay_subscribers";
const UPSTREAM_CONNECTIONS: &str = "price_relay_upstream_connections";
const FANOUT_SECONDS: &str = "price_relay_fanout_seconds";

fn register_metrics() {
    describe_counter!(UPDATES_RECEIVED, "Kline updates received from upstream feeds");
    describe_counter!(FRAMES_SENT, "Frames queued to downstream subscribers");
    describe_counter!(
        FRAMES_DROPPED,
        "Frames dropped because a subscriber buffer was full"
    );
    describe_counter!(PARSE_ERRORS, "Upstream frames that failed to parse");
    describe_counter!(RECONNECTS, "Upstream reconnection attempts");

    describe_gauge!(ACTIVE_STREAMS, "Shared streams currently registered");
    describe_gauge!(SUBSCRIBERS, "Downstream subscribers currently attached");
    describe_gauge!(UPSTREAM_CONNECTIONS, "Upstream feed connections currently open");

    describe_histogram!(
        FANOUT_SECONDS,
        "Time to deliver one upstream update to every subscriber"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an update received from an upstream feed.
pub fn record_update_received() {
    counter!(UPDATES_RECEIVED).increment(1);
}

/// Record frames queued to subscribers.
pub fn record_frames_sent(count: u64) {
    if count > 0 {
        counter!(FRAMES_SENT).increment(count);
    }
}

/// Record frames dropped on full subscriber buffers.
pub fn record_frames_dropped(count: u64) {
    if count > 0 {
        counter!(FRAMES_DROPPED).increment(count);
    }
}

/// Record an upstream frame that failed to parse.
pub fn record_parse_error() {
    counter!(PARSE_ERRORS).increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!(RECONNECTS).increment(1);
}

/// Update the number of registered streams.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_streams(count: usize) {
    gauge!(ACTIVE_STREAMS).set(count as f64);
}

/// A subscriber attached.
pub fn subscriber_attached() {
    gauge!(SUBSCRIBERS).increment(1.0);
}

/// A subscriber detached.
pub fn subscriber_detached() {
    gauge!(SUBSCRIBERS).decrement(1.0);
}

/// An upstream connection opened.
pub fn upstream_opened() {
    gauge!(UPSTREAM_CONNECTIONS).increment(1.0);
}

/// An upstream connection closed.
pub fn upstream_closed() {
    gauge!(UPSTREAM_CONNECTIONS).decrement(1.0);
}

/// Record fan-out duration for one update.
pub fn record_fanout_duration(duration: Duration) {
    histogram!(FANOUT_SECONDS).record(duration.as_secs_f64());
}
