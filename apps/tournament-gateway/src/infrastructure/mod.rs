//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration loading.
pub mod config;

/// Upstream kline feed adapters (Binance WebSocket, mock).
pub mod feed;

/// HTTP and WebSocket API.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// REST price providers and the order RPC client.
pub mod rest;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
