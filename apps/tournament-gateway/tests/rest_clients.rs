//! REST Client Tests
//!
//! Binance price providers and the Supabase order RPC against a local
//! mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tournament_gateway::infrastructure::config::SupabaseCredentials;
use tournament_gateway::infrastructure::rest::{BinanceRestProvider, SupabaseRpcClient};
use tournament_gateway::{
    EntryId, OrderError, OrderGateway, PriceProvider, ProviderError, TournamentOrder,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn provider(server: &MockServer) -> BinanceRestProvider {
    BinanceRestProvider::new("binance_com", server.uri(), TIMEOUT).unwrap()
}

// =============================================================================
// Binance ticker
// =============================================================================

#[tokio::test]
async fn last_price_parses_ticker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/price"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"symbol": "BTCUSDT", "price": "50123.45000000"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let price = provider(&server).last_price("BTCUSDT").await.unwrap();
    assert_eq!(price, dec("50123.45"));
}

#[tokio::test]
async fn last_price_rejects_missing_price() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/ticker/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"symbol": "BTCUSDT"})))
        .mount(&server)
        .await;

    let err = provider(&server).last_price("BTCUSDT").await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::InvalidPrice { ref provider, ref symbol }
            if provider == "binance_com" && symbol == "BTCUSDT"
    ));
}

#[tokio::test]
async fn last_price_maps_http_errors() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/ticker/price"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"code":-1121}"#))
        .mount(&server)
        .await;

    let err = provider(&server).last_price("NOPE").await.unwrap_err();
    assert_eq!(err.to_string(), "binance_com error: 400 Bad Request");
}

// =============================================================================
// Binance klines
// =============================================================================

#[tokio::test]
async fn last_bar_reads_high_low_close() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "ETHUSDT"))
        .and(query_param("interval", "1m"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[
            1_700_000_000_000_i64,
            "3000.00",
            "3010.50",
            "2995.25",
            "3005.75",
            "120.5",
            1_700_000_059_999_i64,
            "361000.0",
            42,
            "60.0",
            "180000.0",
            "0"
        ]])))
        .expect(1)
        .mount(&server)
        .await;

    let bar = provider(&server).last_bar_1m(" ethusdt ").await.unwrap();
    assert_eq!(bar.high, dec("3010.50"));
    assert_eq!(bar.low, dec("2995.25"));
    assert_eq!(bar.last, dec("3005.75"));
}

#[tokio::test]
async fn last_bar_rejects_empty_response() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = provider(&server).last_bar_1m("BTCUSDT").await.unwrap_err();
    assert!(matches!(err, ProviderError::EmptyKline(ref s) if s == "BTCUSDT"));
}

#[tokio::test]
async fn last_bar_carries_error_body() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v3/klines"))
        .respond_with(
            ResponseTemplate::new(451).set_body_string("Service unavailable from a restricted location"),
        )
        .mount(&server)
        .await;

    let err = provider(&server).last_bar_1m("BTCUSDT").await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Api { status: 451, ref message, .. }
            if message == "Service unavailable from a restricted location"
    ));
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    let provider = BinanceRestProvider::new("binance_us", "http://127.0.0.1:1", TIMEOUT).unwrap();
    let err = provider.last_price("BTCUSDT").await.unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
}

// =============================================================================
// Supabase RPC
// =============================================================================

fn order() -> TournamentOrder {
    TournamentOrder {
        entry_id: EntryId::from("entry-42"),
        symbol: "BTCUSDT".to_string(),
        side: "buy".to_string(),
        size_usd: Decimal::from(250),
        executed_price: dec("50000.5"),
    }
}

fn rpc_client(server: &MockServer) -> SupabaseRpcClient {
    let credentials = SupabaseCredentials::new(server.uri(), "service-key".to_string());
    SupabaseRpcClient::new(Some(credentials), TIMEOUT).unwrap()
}

#[tokio::test]
async fn place_order_posts_rpc_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/place_tournament_order"))
        .and(header("apikey", "service-key"))
        .and(header("authorization", "Bearer service-key"))
        .and(body_json(json!({
            "p_entry_id": "entry-42",
            "p_symbol": "BTCUSDT",
            "p_side": "buy",
            "p_size_usd": 250.0,
            "p_executed_price": 50000.5
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"order": {"id": 7}, "balance": 750})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = rpc_client(&server)
        .place_tournament_order(&order())
        .await
        .unwrap();
    assert_eq!(result["order"]["id"], 7);
}

#[tokio::test]
async fn place_order_keeps_numeric_entry_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/place_tournament_order"))
        .and(body_json(json!({
            "p_entry_id": 42,
            "p_symbol": "BTCUSDT",
            "p_side": "buy",
            "p_size_usd": 250.0,
            "p_executed_price": 50000.5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let order = TournamentOrder {
        entry_id: EntryId::from(42_u64),
        ..order()
    };
    let result = rpc_client(&server).place_tournament_order(&order).await.unwrap();
    assert_eq!(result["ok"], true);
}

#[tokio::test]
async fn place_order_maps_rpc_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("entry not active"))
        .mount(&server)
        .await;

    let err = rpc_client(&server)
        .place_tournament_order(&order())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "RPC error: 400 Bad Request - entry not active");
}

#[tokio::test]
async fn unconfigured_client_never_calls_out() {
    let client = SupabaseRpcClient::new(None, TIMEOUT).unwrap();
    assert!(!client.is_configured());

    let err = client.place_tournament_order(&order()).await.unwrap_err();
    assert!(matches!(err, OrderError::NotConfigured(_)));
}
