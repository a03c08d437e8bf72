//! Supabase RPC order gateway.
//!
//! Books tournament orders by calling the `place_tournament_order`
//! Postgres function through PostgREST:
//!
//! ```text
//! POST {SUPABASE_URL}/rest/v1/rpc/place_tournament_order
//! apikey: <service key>
//! Authorization: Bearer <service key>
//! ```
//!
//! The function returns a JSON document of the form `{"order": {...}}`.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::ports::{EntryId, OrderError, OrderGateway, TournamentOrder};
use crate::infrastructure::config::SupabaseCredentials;

/// Name of the order placement function.
pub const PLACE_ORDER_RPC: &str = "place_tournament_order";

#[derive(Debug, Serialize)]
struct PlaceOrderParams<'a> {
    p_entry_id: &'a EntryId,
    p_symbol: &'a str,
    p_side: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    p_size_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    p_executed_price: Decimal,
}

impl<'a> From<&'a TournamentOrder> for PlaceOrderParams<'a> {
    fn from(order: &'a TournamentOrder) -> Self {
        Self {
            p_entry_id: &order.entry_id,
            p_symbol: &order.symbol,
            p_side: &order.side,
            p_size_usd: order.size_usd,
            p_executed_price: order.executed_price,
        }
    }
}

/// PostgREST client for the tournament order function.
#[derive(Debug, Clone)]
pub struct SupabaseRpcClient {
    client: reqwest::Client,
    credentials: Option<SupabaseCredentials>,
}

impl SupabaseRpcClient {
    /// Create a client.
    ///
    /// Missing credentials are tolerated here; every call then fails with
    /// [`OrderError::NotConfigured`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        credentials: Option<SupabaseCredentials>,
        timeout: Duration,
    ) -> Result<Self, OrderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
        })
    }

    /// Whether credentials are present.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }
}

#[async_trait]
impl OrderGateway for SupabaseRpcClient {
    async fn place_tournament_order(
        &self,
        order: &TournamentOrder,
    ) -> Result<serde_json::Value, OrderError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            OrderError::NotConfigured("SUPABASE_URL or SUPABASE_SERVICE_KEY is not set".into())
        })?;

        let url = format!(
            "{}/rest/v1/rpc/{PLACE_ORDER_RPC}",
            credentials.url.trim_end_matches('/')
        );

        tracing::debug!(
            entry_id = %order.entry_id,
            symbol = %order.symbol,
            side = %order.side,
            rpc = PLACE_ORDER_RPC,
            "Placing tournament order"
        );

        let response = self
            .client
            .post(&url)
            .header("apikey", &credentials.service_key)
            .bearer_auth(&credentials.service_key)
            .json(&PlaceOrderParams::from(order))
            .send()
            .await
            .map_err(|e| OrderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrderError::Rpc {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| OrderError::Network(e.to_string()))
    }
}
