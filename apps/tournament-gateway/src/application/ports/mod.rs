//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following the
//! Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`FeedConnector`] / [`FeedConnection`]: upstream kline feed for one key
//! - [`PriceProvider`]: REST price lookup on an exchange
//! - [`OrderGateway`]: remote procedure that books a tournament order

use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{Kline, StreamKey};

// =============================================================================
// Upstream Feed
// =============================================================================

/// One decoded message from an upstream feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// A normalized kline update.
    Update(Kline),
    /// A frame that could not be parsed; carries the reason.
    Malformed(String),
    /// A well-formed frame that carries no kline (control or other events).
    Ignored,
}

/// Errors raised by an upstream feed connection.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Transport-level failure on an open connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// The feed URL could not be built for the key.
    #[error("invalid feed url: {0}")]
    InvalidUrl(String),
}

/// A live connection to the upstream feed for one key.
#[async_trait]
pub trait FeedConnection: Send {
    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` when the upstream closed cleanly.
    async fn next_message(&mut self) -> Result<Option<FeedMessage>, FeedError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Factory for upstream connections.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open a connection emitting updates for `key`.
    async fn connect(&self, key: &StreamKey) -> Result<Box<dyn FeedConnection>, FeedError>;
}

// =============================================================================
// Price Provider
// =============================================================================

/// Latest one-minute bar summary, used for stop-loss and liquidation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBar {
    /// Close price of the bar.
    #[serde(with = "rust_decimal::serde::float")]
    pub last: Decimal,
    /// High of the bar.
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    /// Low of the bar.
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
}

/// Errors raised by price providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The exchange answered with a non-success status.
    #[error("{provider} error: {status} {message}")]
    Api {
        /// Provider name.
        provider: String,
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Request could not be sent or the body could not be read.
    #[error("network error: {0}")]
    Network(String),

    /// The returned price was missing or not a finite number.
    #[error("{provider} returned invalid price for {symbol}")]
    InvalidPrice {
        /// Provider name.
        provider: String,
        /// Requested symbol.
        symbol: String,
    },

    /// The klines endpoint returned no rows.
    #[error("empty kline for {0}")]
    EmptyKline(String),

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// REST price lookup on one exchange.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Last traded price for `symbol`.
    async fn last_price(&self, symbol: &str) -> Result<Decimal, ProviderError>;

    /// Latest one-minute bar for `symbol`.
    async fn last_bar_1m(&self, symbol: &str) -> Result<LastBar, ProviderError>;
}

// =============================================================================
// Order Gateway
// =============================================================================

/// Tournament entry identifier, kept in the JSON type the client sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    /// Numeric id.
    Number(serde_json::Number),
    /// Textual id, e.g. a UUID.
    Text(String),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => fmt::Display::fmt(n, f),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<u64> for EntryId {
    fn from(id: u64) -> Self {
        Self::Number(id.into())
    }
}

/// Parameters of a tournament order, priced at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentOrder {
    /// Tournament entry placing the order.
    pub entry_id: EntryId,
    /// Traded symbol.
    pub symbol: String,
    /// Order side as sent by the client.
    pub side: String,
    /// Notional size in USD.
    pub size_usd: Decimal,
    /// Price the order was filled at.
    pub executed_price: Decimal,
}

/// Errors raised by the order gateway.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// Gateway is not configured.
    #[error("order gateway not configured: {0}")]
    NotConfigured(String),

    /// The procedure call returned a non-success status.
    #[error("RPC error: {status} {reason} - {body}")]
    Rpc {
        /// HTTP status code.
        status: u16,
        /// Reason phrase.
        reason: String,
        /// Response body.
        body: String,
    },

    /// Request could not be sent or the body could not be read.
    #[error("network error: {0}")]
    Network(String),
}

/// Remote procedure booking tournament orders.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Book `order` and return the procedure's JSON result.
    async fn place_tournament_order(
        &self,
        order: &TournamentOrder,
    ) -> Result<serde_json::Value, OrderError>;
}
