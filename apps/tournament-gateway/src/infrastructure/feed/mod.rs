//! Upstream Feed Adapters
//!
//! Implementations of [`FeedConnector`](crate::application::ports::FeedConnector):
//! the Binance kline WebSocket stream and an in-process mock for tests.

pub mod binance;
pub mod codec;
pub mod mock;

pub use binance::{BinanceFeedConnector, DEFAULT_STREAM_URL};
pub use codec::{CodecError, KlineCodec};
pub use mock::{MockFeedConnector, MockFeedHandle, MockFrame};
