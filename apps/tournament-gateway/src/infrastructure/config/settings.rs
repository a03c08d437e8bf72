//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.
//! Unparseable numeric values fall back to their defaults.

use std::net::SocketAddr;
use std::time::Duration;

use crate::application::services::{ReconnectConfig, RelaySettings};
use crate::infrastructure::feed::DEFAULT_STREAM_URL;
use crate::infrastructure::rest::{BINANCE_COM_API_URL, BINANCE_US_API_URL};

/// Supabase project credentials.
#[derive(Clone)]
pub struct SupabaseCredentials {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Service role key.
    pub service_key: String,
}

impl SupabaseCredentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(url: String, service_key: String) -> Self {
        Self { url, service_key }
    }
}

impl std::fmt::Debug for SupabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseCredentials")
            .field("url", &self.url)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerSettings {
    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "HOST".to_string(),
                value: self.host.clone(),
            })
    }
}

/// Upstream feed and relay settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Binance raw stream endpoint.
    pub stream_url: String,
    /// Delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Jitter applied to the reconnection delay (fraction, 0.0 = none).
    pub reconnect_jitter: f64,
    /// Maximum consecutive reconnection attempts (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Per-client outbound buffer, in frames.
    pub client_buffer: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        let relay = RelaySettings::default();
        Self {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            reconnect_delay: relay.reconnect.delay,
            reconnect_jitter: relay.reconnect.jitter_factor,
            max_reconnect_attempts: relay.reconnect.max_attempts,
            client_buffer: relay.client_buffer,
        }
    }
}

impl FeedSettings {
    /// Relay tunables derived from these settings.
    #[must_use]
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            reconnect: ReconnectConfig {
                delay: self.reconnect_delay,
                jitter_factor: self.reconnect_jitter,
                max_attempts: self.max_reconnect_attempts,
            },
            client_buffer: self.client_buffer,
        }
    }
}

/// REST price provider settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// API host of `binance_com`.
    pub binance_com_url: String,
    /// API host of `binance_us`.
    pub binance_us_url: String,
    /// Timeout of outbound HTTP requests.
    pub http_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            binance_com_url: BINANCE_COM_API_URL.to_string(),
            binance_us_url: BINANCE_US_API_URL.to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Upstream feed and relay.
    pub feed: FeedSettings,
    /// REST price providers.
    pub providers: ProviderSettings,
    /// Order RPC credentials; `None` when not configured.
    pub supabase: Option<SupabaseCredentials>,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but unusable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Self::default();

        let server = ServerSettings {
            host: env.string("HOST", &defaults.server.host),
            port: env.parse("PORT", defaults.server.port),
        };
        server.bind_addr()?;

        let reconnect_jitter = env.parse("RELAY_RECONNECT_JITTER", defaults.feed.reconnect_jitter);
        if !(0.0..=1.0).contains(&reconnect_jitter) {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_RECONNECT_JITTER".to_string(),
                value: reconnect_jitter.to_string(),
            });
        }

        let feed = FeedSettings {
            stream_url: env.string("BINANCE_STREAM_URL", &defaults.feed.stream_url),
            reconnect_delay: env
                .parse_opt::<u64>("RELAY_RECONNECT_DELAY_MS")
                .map_or(defaults.feed.reconnect_delay, Duration::from_millis),
            reconnect_jitter,
            max_reconnect_attempts: env.parse(
                "RELAY_MAX_RECONNECT_ATTEMPTS",
                defaults.feed.max_reconnect_attempts,
            ),
            client_buffer: env.parse("RELAY_CLIENT_BUFFER", defaults.feed.client_buffer),
        };

        let providers = ProviderSettings {
            binance_com_url: env.string("BINANCE_COM_API_URL", &defaults.providers.binance_com_url),
            binance_us_url: env.string("BINANCE_US_API_URL", &defaults.providers.binance_us_url),
            http_timeout: env
                .parse_opt::<u64>("HTTP_TIMEOUT_SECS")
                .map_or(defaults.providers.http_timeout, Duration::from_secs),
        };

        let supabase = match (env.get("SUPABASE_URL"), env.get("SUPABASE_SERVICE_KEY")) {
            (Some(url), Some(key)) => Some(SupabaseCredentials::new(url, key)),
            _ => None,
        };

        Ok(Self {
            server,
            feed,
            providers,
            supabase,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds an unusable value.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank value of `key`, trimmed.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.parse_opt(key).unwrap_or(default)
    }

    fn parse_opt<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }
}
