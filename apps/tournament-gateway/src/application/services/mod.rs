//! Application Services
//!
//! The shared price-stream relay: registry, streams, upstream feed tasks
//! and the reconnection policy they share.

pub mod reconnect;
pub mod registry;
pub mod stream;
pub mod upstream;

pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use registry::{RegistrySummary, RelaySettings, StreamRegistry, Subscription};
pub use stream::{Stream, StreamStats};
pub use upstream::FeedState;
