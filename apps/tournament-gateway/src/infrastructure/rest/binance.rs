//! Binance REST price provider.
//!
//! Serves `binance_com` and `binance_us`; both expose the same v3 market
//! data endpoints under different hosts.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::application::ports::{LastBar, PriceProvider, ProviderError};

/// Provider name of the global exchange.
pub const BINANCE_COM: &str = "binance_com";
/// Provider name of the US exchange.
pub const BINANCE_US: &str = "binance_us";

/// Default API host of `binance_com`.
pub const BINANCE_COM_API_URL: &str = "https://api.binance.com";
/// Default API host of `binance_us`.
pub const BINANCE_US_API_URL: &str = "https://api.binance.us";

/// Binance spot market data over REST.
#[derive(Debug, Clone)]
pub struct BinanceRestProvider {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl BinanceRestProvider {
    /// Create a provider named `name` against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self::with_client(name, base_url, client))
    }

    /// Create a provider sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(
        name: impl Into<String>,
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Registered provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, ProviderError> {
        self.client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[serde(default)]
    price: Option<Value>,
}

/// Parse a Binance numeric field, sent as a string or a number.
fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl PriceProvider for BinanceRestProvider {
    async fn last_price(&self, symbol: &str) -> Result<Decimal, ProviderError> {
        let response = self
            .get("/api/v3/ticker/price", &[("symbol", symbol)])
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: self.name.clone(),
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let ticker: TickerPrice = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        ticker
            .price
            .as_ref()
            .and_then(parse_decimal)
            .ok_or_else(|| ProviderError::InvalidPrice {
                provider: self.name.clone(),
                symbol: symbol.to_string(),
            })
    }

    async fn last_bar_1m(&self, symbol: &str) -> Result<LastBar, ProviderError> {
        let symbol = symbol.trim().to_uppercase();
        let response = self
            .get(
                "/api/v3/klines",
                &[("symbol", symbol.as_str()), ("interval", "1m"), ("limit", "1")],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: self.name.clone(),
                status: status.as_u16(),
                message: body,
            });
        }

        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let row = rows
            .first()
            .ok_or_else(|| ProviderError::EmptyKline(symbol.clone()))?;

        let field = |index: usize| {
            row.get(index).and_then(parse_decimal).ok_or_else(|| {
                ProviderError::InvalidResponse(format!("invalid kline numbers for {symbol}"))
            })
        };

        Ok(LastBar {
            high: field(2)?,
            low: field(3)?,
            last: field(4)?,
        })
    }
}
