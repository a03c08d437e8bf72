#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Tournament Gateway - Shared Price Stream Relay
//!
//! An HTTP/WebSocket service for trading tournaments. Its core keeps one
//! Binance kline connection per `(symbol, interval)` and multiplexes it to
//! every WebSocket client that asked for that key.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Stream keys, normalized klines, subscriber frames and sets
//! - **Application**: Ports and the relay services
//!   - `ports`: upstream feed, price provider, order gateway
//!   - `services`: stream registry, streams, upstream feed task, reconnect
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Binance kline WebSocket connector and codec
//!   - `rest`: Binance REST price providers, Supabase order RPC
//!   - `http`: axum router, client sessions, health and metrics
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                        ┌──────────────────────────┐
//! Binance btcusdt@1m ───►│ Stream btcusdt@1m        │──► Client 1
//!                        │  last payload, N clients │──► Client 2
//!                        └──────────────────────────┘
//!                        ┌──────────────────────────┐
//! Binance ethusdt@5m ───►│ Stream ethusdt@5m        │──► Client 3
//!                        └──────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no I/O.
pub mod domain;

/// Application layer - Ports and relay services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{Kline, ServerFrame, StreamKey};
pub use domain::subscription::{ClientHandle, SubscriberId};

// Relay
pub use application::services::{
    FeedState, ReconnectConfig, RelaySettings, StreamRegistry, StreamStats, Subscription,
};

// Ports
pub use application::ports::{
    EntryId, FeedConnection, FeedConnector, FeedError, FeedMessage, LastBar, OrderError,
    OrderGateway, PriceProvider, ProviderError, TournamentOrder,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, GatewayConfig};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, ServerError, create_router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
