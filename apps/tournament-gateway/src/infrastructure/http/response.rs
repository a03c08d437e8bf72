//! HTTP response DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::services::StreamStats;

/// Error body of client and provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

impl ErrorResponse {
    /// Create an error body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Error body of a failed order placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalErrorResponse {
    /// Always `Internal error`.
    pub error: String,
    /// Underlying failure.
    pub details: String,
}

impl InternalErrorResponse {
    /// Wrap an underlying failure.
    #[must_use]
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            error: "Internal error".to_string(),
            details: details.into(),
        }
    }
}

/// Response of `GET /price`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceResponse {
    /// Requested symbol.
    pub symbol: String,
    /// Provider that priced it.
    pub provider: String,
    /// Last traded price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Response of `GET /price/last-bar`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastBarResponse {
    /// Requested symbol.
    pub symbol: String,
    /// Provider that priced it.
    pub provider: String,
    /// Close of the latest one-minute bar.
    #[serde(with = "rust_decimal::serde::float")]
    pub last: Decimal,
    /// High of the latest one-minute bar.
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    /// Low of the latest one-minute bar.
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
}

/// Response of a filled `POST /tournament/order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Always `filled`.
    pub status: String,
    /// Traded symbol.
    pub symbol: String,
    /// Provider that priced the order.
    pub provider: String,
    /// Execution price.
    #[serde(with = "rust_decimal::serde::float")]
    pub executed_price: Decimal,
    /// Order row returned by the booking procedure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Relay statistics.
    pub streams: StreamsStatus,
}

/// Relay section of the health response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamsStatus {
    /// Registered streams.
    pub active: usize,
    /// Subscribers across all streams.
    pub subscribers: usize,
    /// Streams with an open upstream connection.
    pub upstream_connected: usize,
    /// Per-stream detail.
    pub details: Vec<StreamStats>,
}
