//! Application Layer - Ports and relay services.
//!
//! Ports define the outbound interfaces; services implement the shared
//! price-stream relay on top of them.

/// Outbound port interfaces.
pub mod ports;

/// Relay services.
pub mod services;
