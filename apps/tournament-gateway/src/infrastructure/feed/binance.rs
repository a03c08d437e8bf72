//! Binance Kline WebSocket Feed
//!
//! Opens one raw stream per key on the Binance WebSocket API.
//!
//! # Stream URL
//!
//! `{base}/{symbol}@kline_{interval}`, e.g.
//! `wss://stream.binance.com:9443/ws/btcusdt@kline_1m`.
//!
//! Binance pings every few minutes and drops connections that do not
//! answer; pings are answered inline while reading.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::codec::KlineCodec;
use crate::application::ports::{FeedConnection, FeedConnector, FeedError, FeedMessage};
use crate::domain::streaming::StreamKey;

/// Default Binance raw stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443/ws";

/// Connector for Binance kline streams.
#[derive(Debug, Clone)]
pub struct BinanceFeedConnector {
    base_url: String,
    codec: KlineCodec,
}

impl Default for BinanceFeedConnector {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_URL)
    }
}

impl BinanceFeedConnector {
    /// Create a connector for the given base endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            codec: KlineCodec::new(),
        }
    }

    /// Build the stream URL for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidUrl`] if the base URL cannot carry a path.
    pub fn stream_url(&self, key: &StreamKey) -> Result<Url, FeedError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| FeedError::InvalidUrl(e.to_string()))?;

        url.path_segments_mut()
            .map_err(|()| FeedError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(&format!("{}@kline_{}", key.symbol(), key.interval()));

        Ok(url)
    }
}

#[async_trait]
impl FeedConnector for BinanceFeedConnector {
    async fn connect(&self, key: &StreamKey) -> Result<Box<dyn FeedConnection>, FeedError> {
        let url = self.stream_url(key)?;
        tracing::info!(stream = %key, url = %url, "Connecting to Binance kline stream");

        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        Ok(Box::new(BinanceFeedConnection {
            socket,
            codec: self.codec,
            closed: false,
        }))
    }
}

/// Live Binance kline stream.
pub struct BinanceFeedConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    codec: KlineCodec,
    closed: bool,
}

#[async_trait]
impl FeedConnection for BinanceFeedConnection {
    async fn next_message(&mut self) -> Result<Option<FeedMessage>, FeedError> {
        if self.closed {
            return Ok(None);
        }

        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(match self.codec.decode(text.as_str()) {
                        Ok(Some(kline)) => FeedMessage::Update(kline),
                        Ok(None) => FeedMessage::Ignored,
                        Err(e) => FeedMessage::Malformed(e.to_string()),
                    }));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.socket
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| FeedError::Transport(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "Server sent close frame");
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(_)) => {
                    // Pong, binary and raw frames carry no market data
                }
                Some(Err(e)) => return Err(FeedError::Transport(e.to_string())),
                None => {
                    self.closed = true;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        if let Err(e) = self.socket.close(None).await {
            tracing::debug!(error = %e, "Error closing upstream socket");
        }
    }
}
