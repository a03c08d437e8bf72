//! Tournament Gateway Binary
//!
//! Starts the HTTP/WebSocket gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tournament-gateway
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `HOST`: Bind host (default: 0.0.0.0)
//! - `PORT`: Bind port (default: 3000)
//! - `BINANCE_STREAM_URL`: Kline stream base (default: wss://stream.binance.com:9443/ws)
//! - `RELAY_RECONNECT_DELAY_MS`: Upstream reconnect delay (default: 3000)
//! - `RELAY_RECONNECT_JITTER`: Reconnect delay jitter fraction (default: 0.0)
//! - `RELAY_MAX_RECONNECT_ATTEMPTS`: Consecutive attempts, 0 = unlimited (default: 0)
//! - `RELAY_CLIENT_BUFFER`: Frames buffered per client (default: 256)
//! - `BINANCE_COM_API_URL`, `BINANCE_US_API_URL`: REST hosts
//! - `HTTP_TIMEOUT_SECS`: Outbound HTTP timeout (default: 10)
//! - `SUPABASE_URL`, `SUPABASE_SERVICE_KEY`: Order RPC credentials
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tournament_gateway::infrastructure::feed::BinanceFeedConnector;
use tournament_gateway::infrastructure::rest::{ProviderRegistry, SupabaseRpcClient};
use tournament_gateway::infrastructure::telemetry;
use tournament_gateway::{AppState, GatewayConfig, HttpServer, StreamRegistry, init_metrics};

/// How long in-flight connections get to finish after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Tournament Gateway");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let connector = Arc::new(BinanceFeedConnector::new(config.feed.stream_url.clone()));
    let registry = StreamRegistry::new(connector, config.feed.relay_settings());

    let providers = ProviderRegistry::binance(&config.providers)?;

    if config.supabase.is_none() {
        tracing::warn!("SUPABASE_URL or SUPABASE_SERVICE_KEY is not set; orders will fail");
    }
    let orders = Arc::new(SupabaseRpcClient::new(
        config.supabase.clone(),
        config.providers.http_timeout,
    )?);

    let state = AppState::new(registry, providers, orders);
    let server = HttpServer::new(config.server.bind_addr()?, state, shutdown_token.clone());

    let mut server_handle = tokio::spawn(server.run());

    tracing::info!("Tournament Gateway ready");

    tokio::select! {
        received = shutdown_signal() => {
            tracing::info!(signal = received, "Shutdown requested, draining connections");
            shutdown_token.cancel();
        }
        result = &mut server_handle => {
            shutdown_token.cancel();
            result??;
            return Ok(());
        }
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_handle).await {
        Ok(result) => result??,
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "HTTP server did not stop in time"
        ),
    }

    tracing::info!("Tournament Gateway stopped");
    Ok(())
}

/// Load `.env` from the working directory or the nearest ancestor that has one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let Ok(cwd) = std::env::current_dir() else {
        return;
    };

    if let Some(path) = cwd
        .ancestors()
        .skip(1)
        .map(|dir| dir.join(".env"))
        .find(|path| path.is_file())
    {
        let _ = dotenvy::from_path(&path);
    }
}

/// Log the effective configuration. Credentials are redacted by their `Debug`.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        stream_url = %config.feed.stream_url,
        reconnect_delay_ms = config.feed.reconnect_delay.as_millis(),
        max_reconnect_attempts = config.feed.max_reconnect_attempts,
        client_buffer = config.feed.client_buffer,
        "Gateway configured"
    );
    tracing::debug!(
        binance_com = %config.providers.binance_com_url,
        binance_us = %config.providers.binance_us_url,
        supabase = ?config.supabase,
        "Outbound endpoints"
    );
}

/// Resolve on SIGINT or SIGTERM, naming the signal received.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
