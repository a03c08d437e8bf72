//! Market Data Streaming Types
//!
//! Core domain types for the shared price stream: the normalized stream
//! key, the normalized kline update, and the frames sent to subscribers.
//! These types are codec-agnostic; the upstream wire format lives in the
//! feed adapters.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Stream Key
// =============================================================================

/// Separator between symbol and interval in a stream key.
pub const KEY_SEPARATOR: char = '@';

/// Normalized `(symbol, interval)` identifier addressing one shared stream.
///
/// The symbol is trimmed and lowercased, the interval is trimmed. Two
/// requests that differ only in case or surrounding whitespace resolve to
/// the same key.
///
/// ```rust
/// use tournament_gateway::domain::streaming::StreamKey;
///
/// let a = StreamKey::new(" BTCUSDT ", "1m");
/// let b = StreamKey::new("btcusdt", " 1m ");
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "btcusdt@1m");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    key: String,
    split: usize,
}

impl StreamKey {
    /// Build a key from raw request values.
    #[must_use]
    pub fn new(symbol: &str, interval: &str) -> Self {
        let symbol = symbol.trim().to_lowercase();
        let interval = interval.trim();
        let split = symbol.len();

        let mut key = String::with_capacity(split + 1 + interval.len());
        key.push_str(&symbol);
        key.push(KEY_SEPARATOR);
        key.push_str(interval);

        Self { key, split }
    }

    /// The full key, e.g. `btcusdt@1m`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The normalized (lowercase) symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.key[..self.split]
    }

    /// The normalized interval.
    #[must_use]
    pub fn interval(&self) -> &str {
        &self.key[self.split + 1..]
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

// =============================================================================
// Kline
// =============================================================================

/// Normalized market update for one interval of one symbol.
///
/// Prices and volume are kept as decimals internally and emitted as JSON
/// numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kline {
    /// Symbol as echoed by the upstream feed (e.g. `BTCUSDT`).
    pub symbol: String,
    /// Interval as echoed by the upstream feed (e.g. `1m`).
    pub interval: String,
    /// Interval open time (Unix milliseconds).
    pub open_time: i64,
    /// Interval close time (Unix milliseconds).
    pub close_time: i64,
    /// Open price.
    #[serde(with = "rust_decimal::serde::float")]
    pub open: Decimal,
    /// High price.
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    /// Low price.
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
    /// Close (last) price.
    #[serde(with = "rust_decimal::serde::float")]
    pub close: Decimal,
    /// Base asset volume.
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    /// Whether this interval has closed.
    pub is_final: bool,
}

// =============================================================================
// Server Frames
// =============================================================================

/// Source tag attached to errors caused by an unparseable upstream frame.
pub const PARSE_ERROR_SOURCE: &str = "binance_parse";

/// Greeting text carried by the `hello` frame.
pub const GREETING: &str = "Charty shared price stream connected";

/// Error text sent when a subscription request lacks symbol or interval.
pub const MISSING_PARAMS_MESSAGE: &str = "symbol and interval query params are required";

/// A frame sent to a downstream subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once, immediately after subscribing.
    Hello {
        /// Symbol as requested by the client.
        symbol: String,
        /// Interval as requested by the client.
        interval: String,
        /// Greeting text.
        message: String,
    },
    /// Last known update, sent once on join when one exists.
    Snapshot {
        /// The cached update.
        data: Kline,
    },
    /// Live update.
    Kline(Kline),
    /// Error notification.
    Error {
        /// Origin of the error, absent for request validation errors.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        /// Human-readable description.
        message: String,
    },
}

impl ServerFrame {
    /// Greeting for a client that asked for `symbol`/`interval`.
    #[must_use]
    pub fn hello(symbol: &str, interval: &str) -> Self {
        Self::Hello {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            message: GREETING.to_string(),
        }
    }

    /// Error frame for an upstream frame that failed to parse.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::Error {
            source: Some(PARSE_ERROR_SOURCE.to_string()),
            message: message.into(),
        }
    }

    /// Error frame for a rejected subscription request.
    #[must_use]
    pub fn missing_params() -> Self {
        Self::Error {
            source: None,
            message: MISSING_PARAMS_MESSAGE.to_string(),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (non-finite decimal
    /// conversion is the only realistic cause).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
