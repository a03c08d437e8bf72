//! HTTP Controller (Driver Adapter)
//!
//! Axum router exposing the relay, price lookup and tournament orders.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status with relay statistics
//! - `GET /healthz` - liveness probe
//! - `GET /readyz` - readiness probe
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /ws?symbol=&interval=` - shared price stream (WebSocket)
//! - `GET /price?symbol=&provider=` - last traded price
//! - `GET /price/last-bar?symbol=&provider=` - latest one-minute bar
//! - `POST /tournament/order` - price and book a tournament order

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use super::health::{health_handler, liveness_handler, metrics_handler, readiness_handler};
use super::request::{OrderRequest, PriceQuery};
use super::response::{
    ErrorResponse, InternalErrorResponse, LastBarResponse, OrderResponse, PriceResponse,
};
use super::ws::ws_handler;
use crate::application::ports::OrderGateway;
use crate::application::services::StreamRegistry;
use crate::infrastructure::rest::ProviderRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared stream registry.
    pub registry: StreamRegistry,
    /// Price providers by name.
    pub providers: Arc<ProviderRegistry>,
    /// Order booking procedure.
    pub orders: Arc<dyn OrderGateway>,
    /// Service version.
    pub version: String,
    /// Process start.
    pub started_at: Instant,
}

impl AppState {
    /// Create state starting the uptime clock now.
    #[must_use]
    pub fn new(
        registry: StreamRegistry,
        providers: ProviderRegistry,
        orders: Arc<dyn OrderGateway>,
    ) -> Self {
        Self {
            registry,
            providers: Arc::new(providers),
            orders,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("providers", &self.providers)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .route("/price", get(price_handler))
        .route("/price/last-bar", get(last_bar_handler))
        .route("/tournament/order", post(order_handler))
        .with_state(state)
}

// =============================================================================
// Price
// =============================================================================

fn unknown_provider() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("Unknown provider")),
    )
        .into_response()
}

async fn price_handler(
    State(state): State<AppState>,
    Query(query): Query<PriceQuery>,
) -> Response {
    let (symbol, provider_name) = (query.symbol(), query.provider());
    let Some(provider) = state.providers.get(provider_name) else {
        return unknown_provider();
    };

    match provider.last_price(symbol).await {
        Ok(price) => Json(PriceResponse {
            symbol: symbol.to_string(),
            provider: provider_name.to_string(),
            price,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(symbol, provider = provider_name, error = %e, "Price lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

async fn last_bar_handler(
    State(state): State<AppState>,
    Query(query): Query<PriceQuery>,
) -> Response {
    let (symbol, provider_name) = (query.symbol(), query.provider());
    let Some(provider) = state.providers.get(provider_name) else {
        return unknown_provider();
    };

    match provider.last_bar_1m(symbol).await {
        Ok(bar) => Json(LastBarResponse {
            symbol: symbol.to_string(),
            provider: provider_name.to_string(),
            last: bar.last,
            high: bar.high,
            low: bar.low,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(symbol, provider = provider_name, error = %e, "Last bar lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Tournament Orders
// =============================================================================

async fn order_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(request) = OrderRequest::from_body(&body).validated() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Missing required fields")),
        )
            .into_response();
    };

    let Some(provider) = state.providers.get(&request.provider) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!(
                "Unknown provider: {}",
                request.provider
            ))),
        )
            .into_response();
    };

    let executed_price = match provider.last_price(&request.symbol).await {
        Ok(price) => price,
        Err(e) => return internal_error(&e),
    };

    let symbol = request.symbol.clone();
    let provider_name = request.provider.clone();
    let order = request.priced(executed_price);

    let mut result = match state.orders.place_tournament_order(&order).await {
        Ok(result) => result,
        Err(e) => return internal_error(&e),
    };

    tracing::info!(
        entry_id = %order.entry_id,
        symbol = %symbol,
        side = %order.side,
        size_usd = %order.size_usd,
        executed_price = %executed_price,
        "Tournament order filled"
    );

    Json(OrderResponse {
        status: "filled".to_string(),
        symbol,
        provider: provider_name,
        executed_price,
        order: result.get_mut("order").map(serde_json::Value::take),
    })
    .into_response()
}

fn internal_error(error: &dyn std::error::Error) -> Response {
    tracing::error!(error = %error, "Tournament order failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(InternalErrorResponse::new(error.to_string())),
    )
        .into_response()
}
