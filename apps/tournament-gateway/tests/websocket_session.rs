//! WebSocket Session Integration Tests
//!
//! Runs the real HTTP server on a loopback port with the mock upstream feed
//! and talks to it with a WebSocket client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use tournament_gateway::infrastructure::feed::MockFeedConnector;
use tournament_gateway::infrastructure::rest::{ProviderRegistry, SupabaseRpcClient};
use tournament_gateway::{
    AppState, HttpServer, ReconnectConfig, RelaySettings, StreamKey, StreamRegistry,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    registry: StreamRegistry,
    connector: Arc<MockFeedConnector>,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_server() -> TestServer {
    let connector = Arc::new(MockFeedConnector::new());
    let registry = StreamRegistry::new(
        connector.clone(),
        RelaySettings {
            reconnect: ReconnectConfig::fixed(Duration::from_millis(20)),
            ..RelaySettings::default()
        },
    );
    let orders = Arc::new(SupabaseRpcClient::new(None, Duration::from_secs(1)).unwrap());
    let state = AppState::new(registry.clone(), ProviderRegistry::new(), orders);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    let server = HttpServer::new(addr, state, shutdown.clone());
    tokio::spawn(server.serve(listener));

    TestServer {
        addr,
        registry,
        connector,
        shutdown,
    }
}

async fn connect(server: &TestServer, query: &str) -> Client {
    let url = format!("ws://{}/ws{query}", server.addr);
    let (client, _) = timeout(WAIT, connect_async(url))
        .await
        .expect("timed out connecting")
        .expect("websocket handshake failed");
    client
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection ended")
            .expect("read failed");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

const KLINE: &str = r#"{"e":"kline","E":1700000001000,"s":"BTCUSDT","k":{"t":1700000000000,"T":1700000059999,"s":"BTCUSDT","i":"1m","o":"50000.0","c":"50100.25","h":"50200.0","l":"49900.0","v":"3.5","x":true}}"#;

#[tokio::test]
async fn client_receives_hello_then_live_updates() {
    let server = start_server().await;
    let mut client = connect(&server, "?symbol=BTCUSDT&interval=1m").await;

    let hello = next_json(&mut client).await;
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["symbol"], "BTCUSDT");
    assert_eq!(hello["interval"], "1m");
    assert_eq!(hello["message"], "Charty shared price stream connected");

    let key = StreamKey::new("btcusdt", "1m");
    assert!(server.connector.wait_for_connections(1, WAIT).await);
    server.connector.latest(&key).unwrap().push_text(KLINE);

    let kline = next_json(&mut client).await;
    assert_eq!(kline["type"], "kline");
    assert_eq!(kline["symbol"], "BTCUSDT");
    assert_eq!(kline["interval"], "1m");
    assert_eq!(kline["openTime"], 1_700_000_000_000_i64);
    assert_eq!(kline["closeTime"], 1_700_000_059_999_i64);
    assert_eq!(kline["close"], 50100.25);
    assert_eq!(kline["isFinal"], true);
}

#[tokio::test]
async fn second_client_gets_snapshot_over_the_wire() {
    let server = start_server().await;
    let key = StreamKey::new("btcusdt", "1m");

    let mut first = connect(&server, "?symbol=BTCUSDT&interval=1m").await;
    next_json(&mut first).await;
    assert!(server.connector.wait_for_connections(1, WAIT).await);
    server.connector.latest(&key).unwrap().push_text(KLINE);
    next_json(&mut first).await;

    let mut second = connect(&server, "?symbol=btcusdt&interval=1m").await;
    assert_eq!(next_json(&mut second).await["symbol"], "btcusdt");
    let snapshot = next_json(&mut second).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["data"]["close"], 50100.25);

    assert_eq!(server.connector.connection_count(), 1);
    assert_eq!(server.registry.subscriber_count(&key), Some(2));
}

#[tokio::test]
async fn missing_params_are_rejected_and_closed() {
    let server = start_server().await;

    for query in ["", "?symbol=BTCUSDT", "?interval=1m", "?symbol=&interval=1m"] {
        let mut client = connect(&server, query).await;

        let error = next_json(&mut client).await;
        assert_eq!(error["type"], "error");
        assert_eq!(
            error["message"],
            "symbol and interval query params are required"
        );
        assert!(error.get("source").is_none());

        let closed = timeout(WAIT, async {
            loop {
                match client.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "server should close after {query:?}");
    }

    assert_eq!(server.registry.stream_count(), 0);
    assert_eq!(server.connector.attempts(), 0);
}

#[tokio::test]
async fn client_disconnect_detaches_and_tears_down() {
    let server = start_server().await;
    let key = StreamKey::new("ethusdt", "5m");

    let mut staying = connect(&server, "?symbol=ETHUSDT&interval=5m").await;
    let mut leaving = connect(&server, "?symbol=ETHUSDT&interval=5m").await;
    next_json(&mut staying).await;
    next_json(&mut leaving).await;
    assert!(server.connector.wait_for_connections(1, WAIT).await);
    assert_eq!(server.registry.subscriber_count(&key), Some(2));

    leaving.close(None).await.unwrap();
    assert!(wait_until(|| server.registry.subscriber_count(&key) == Some(1)).await);

    let upstream = server.connector.latest(&key).unwrap();
    assert!(!upstream.is_closed());

    // Dropping the socket without a close frame counts as leaving too
    drop(staying);
    assert!(wait_until(|| !server.registry.contains(&key)).await);
    assert!(wait_until(|| upstream.is_closed()).await);
}

#[tokio::test]
async fn client_messages_are_ignored() {
    let server = start_server().await;
    let key = StreamKey::new("btcusdt", "1m");

    let mut client = connect(&server, "?symbol=BTCUSDT&interval=1m").await;
    next_json(&mut client).await;
    assert!(server.connector.wait_for_connections(1, WAIT).await);

    client
        .send(Message::Text(r#"{"action":"unsubscribe"}"#.into()))
        .await
        .unwrap();

    server.connector.latest(&key).unwrap().push_text(KLINE);
    assert_eq!(next_json(&mut client).await["type"], "kline");
    assert_eq!(server.registry.subscriber_count(&key), Some(1));
}
