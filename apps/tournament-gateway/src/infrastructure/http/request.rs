//! HTTP request DTOs.
//!
//! Query and body shapes are parsed leniently: absent, blank and wrongly
//! typed fields all read as missing, and validation happens in one place.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::application::ports::{EntryId, TournamentOrder};
use crate::infrastructure::rest::BINANCE_COM;

/// Symbol used when a price request names none.
pub const DEFAULT_SYMBOL: &str = "BTCUSDT";

/// Query of `GET /ws`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    /// Requested symbol.
    pub symbol: Option<String>,
    /// Requested interval.
    pub interval: Option<String>,
}

impl StreamQuery {
    /// Raw symbol and interval, if both are present and non-blank.
    #[must_use]
    pub fn validated(&self) -> Option<(&str, &str)> {
        let symbol = non_blank(self.symbol.as_deref())?;
        let interval = non_blank(self.interval.as_deref())?;
        Some((symbol, interval))
    }
}

/// Query of `GET /price` and `GET /price/last-bar`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceQuery {
    /// Requested symbol.
    pub symbol: Option<String>,
    /// Requested provider.
    pub provider: Option<String>,
}

impl PriceQuery {
    /// Requested symbol, or [`DEFAULT_SYMBOL`].
    #[must_use]
    pub fn symbol(&self) -> &str {
        non_blank(self.symbol.as_deref()).unwrap_or(DEFAULT_SYMBOL)
    }

    /// Requested provider, or `binance_com`.
    #[must_use]
    pub fn provider(&self) -> &str {
        non_blank(self.provider.as_deref()).unwrap_or(BINANCE_COM)
    }
}

/// Body of `POST /tournament/order`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderRequest {
    /// Tournament entry; a string or a number.
    #[serde(default)]
    pub entry_id: Option<Value>,
    /// Traded symbol.
    #[serde(default)]
    pub symbol: Option<Value>,
    /// Price provider name.
    #[serde(default)]
    pub provider: Option<Value>,
    /// Order side.
    #[serde(default)]
    pub side: Option<Value>,
    /// Notional size in USD; a number or a numeric string.
    #[serde(default)]
    pub size_usd: Option<Value>,
}

/// A complete order request, not yet priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidOrderRequest {
    /// Tournament entry, as sent.
    pub entry_id: EntryId,
    /// Traded symbol.
    pub symbol: String,
    /// Price provider name.
    pub provider: String,
    /// Order side.
    pub side: String,
    /// Notional size in USD, non-zero.
    pub size_usd: Decimal,
}

impl ValidOrderRequest {
    /// Attach the execution price.
    #[must_use]
    pub fn priced(self, executed_price: Decimal) -> TournamentOrder {
        TournamentOrder {
            entry_id: self.entry_id,
            symbol: self.symbol,
            side: self.side,
            size_usd: self.size_usd,
            executed_price,
        }
    }
}

impl OrderRequest {
    /// Parse a raw body. Anything that is not a JSON object reads as empty.
    #[must_use]
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// All fields, if every one is present and non-empty.
    #[must_use]
    pub fn validated(&self) -> Option<ValidOrderRequest> {
        Some(ValidOrderRequest {
            entry_id: identifier(self.entry_id.as_ref())?,
            symbol: text(self.symbol.as_ref())?,
            provider: text(self.provider.as_ref())?,
            side: text(self.side.as_ref())?,
            size_usd: amount(self.size_usd.as_ref())?,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn identifier(value: Option<&Value>) -> Option<EntryId> {
    match value? {
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(EntryId::Number(n.clone())),
        other => text(Some(other)).map(EntryId::Text),
    }
}

fn amount(value: Option<&Value>) -> Option<Decimal> {
    let amount: Decimal = match value? {
        Value::Number(n) => {
            let n = n.to_string();
            n.parse().or_else(|_| Decimal::from_scientific(&n)).ok()?
        }
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (!amount.is_zero()).then_some(amount)
}
