//! Domain Layer - Core streaming types.
//!
//! This layer contains the core domain types for the shared price stream
//! with no I/O. All types here are plain Rust with serialization support.

/// Stream keys, normalized klines and subscriber frames.
pub mod streaming;

/// Client handles and subscriber sets.
pub mod subscription;
