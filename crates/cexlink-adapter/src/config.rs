/*
[INPUT]:  Per-exchange settings from YAML or code, exchange defaults
[OUTPUT]: Immutable ExchangeConfig and ReconnectPolicy values
[POS]:    Configuration - one immutable config per exchange, shared by REST and WS
[UPDATE]: When adding exchange-level options or changing production defaults
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::ApiCredentials;
use crate::http::{ClientConfig, ExchangeError, RateLimitConfig, RateLimitContext, Result, RetryPolicy, exponential_backoff};
use crate::types::ExchangeId;

/// Reconnect backoff for one streaming connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_reconnect_initial_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_reconnect_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_reconnect_max_ms")]
    pub max_delay_ms: u64,
    /// Consecutive failed attempts before the connection gives up.
    #[serde(default = "default_reconnect_attempts")]
    pub max_attempts: u32,
    /// Connected time after which the attempt counter resets.
    #[serde(default = "default_stable_after_ms")]
    pub stable_after_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_reconnect_initial_ms(),
            backoff_factor: default_reconnect_factor(),
            max_delay_ms: default_reconnect_max_ms(),
            max_attempts: default_reconnect_attempts(),
            stable_after_ms: default_stable_after_ms(),
        }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        exponential_backoff(
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_factor,
            Duration::from_millis(self.max_delay_ms),
            attempt,
        )
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_millis(self.stable_after_ms)
    }
}

fn default_reconnect_initial_ms() -> u64 {
    1_000
}

fn default_reconnect_factor() -> f64 {
    2.0
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_reconnect_attempts() -> u32 {
    10
}

fn default_stable_after_ms() -> u64 {
    30_000
}

/// Immutable settings for one exchange. Deserializing fills every omitted
/// field from [`ExchangeConfig::defaults_for`] of the named exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawExchangeConfig")]
pub struct ExchangeConfig {
    pub exchange: ExchangeId,
    pub credentials: Option<ApiCredentials>,
    pub rest_url: String,
    pub ws_public_url: String,
    pub ws_private_url: String,
    pub rate_limits: RateLimitConfig,
    pub retry: RetryPolicy,
    pub reconnect: ReconnectPolicy,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Signed-request validity window (MEXC `recvWindow`).
    pub recv_window_ms: u64,
    /// Session keepalive period for listen-key style private streams.
    pub keepalive_interval_ms: u64,
    /// Capacity of the parsed-message channel of each stream.
    pub event_buffer: usize,
    /// Quote assets used to split concatenated wire symbols.
    pub quote_assets: Vec<String>,
    /// Account id some futures private channels require.
    pub user_id: Option<String>,
}

impl ExchangeConfig {
    /// Production endpoints and limits for one exchange.
    pub fn defaults_for(exchange: ExchangeId) -> Self {
        let base = Self {
            exchange,
            credentials: None,
            rest_url: String::new(),
            ws_public_url: String::new(),
            ws_private_url: String::new(),
            rate_limits: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            ping_interval_ms: 20_000,
            ping_timeout_ms: 60_000,
            request_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            recv_window_ms: 5_000,
            keepalive_interval_ms: 30 * 60 * 1000,
            event_buffer: 1024,
            quote_assets: ["USDT", "USDC", "USDE", "BTC", "ETH", "EUR"]
                .into_iter()
                .map(String::from)
                .collect(),
            user_id: None,
        };

        match exchange {
            ExchangeId::MexcSpot => Self {
                rest_url: "https://api.mexc.com".to_string(),
                ws_public_url: "wss://wbs.mexc.com/ws".to_string(),
                ws_private_url: "wss://wbs.mexc.com/ws".to_string(),
                rate_limits: RateLimitConfig {
                    default: RateLimitContext::new(20.0, 20),
                    min_interval_ms: 0,
                    ..RateLimitConfig::default()
                }
                .with_endpoint("/api/v3/order", RateLimitContext::new(10.0, 10))
                .with_endpoint("/api/v3/userDataStream", RateLimitContext::new(1.0, 2)),
                ..base
            },
            ExchangeId::GateSpot => Self {
                rest_url: "https://api.gateio.ws".to_string(),
                ws_public_url: "wss://api.gateio.ws/ws/v4/".to_string(),
                ws_private_url: "wss://api.gateio.ws/ws/v4/".to_string(),
                rate_limits: RateLimitConfig {
                    default: RateLimitContext::new(20.0, 20),
                    ..RateLimitConfig::default()
                }
                .with_endpoint("/api/v4/spot/orders", RateLimitContext::new(10.0, 10)),
                ..base
            },
            ExchangeId::GateFutures => Self {
                rest_url: "https://api.gateio.ws".to_string(),
                ws_public_url: "wss://fx-ws.gateio.ws/v4/ws/usdt".to_string(),
                ws_private_url: "wss://fx-ws.gateio.ws/v4/ws/usdt".to_string(),
                rate_limits: RateLimitConfig {
                    default: RateLimitContext::new(20.0, 20),
                    ..RateLimitConfig::default()
                }
                .with_endpoint("/api/v4/futures/usdt/orders", RateLimitContext::new(10.0, 10)),
                ..base
            },
        }
    }

    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Environment prefix used by [`ExchangeConfig::resolve_credentials`].
    pub fn env_prefix(&self) -> &'static str {
        match self.exchange {
            ExchangeId::MexcSpot => "MEXC",
            ExchangeId::GateSpot | ExchangeId::GateFutures => "GATE",
        }
    }

    /// Configured credentials, falling back to `{PREFIX}_API_KEY`/`{PREFIX}_SECRET_KEY`.
    pub fn resolve_credentials(&self) -> Result<ApiCredentials> {
        let credentials = match &self.credentials {
            Some(credentials) => credentials.clone(),
            None => ApiCredentials::from_env(self.env_prefix())?,
        };
        if !credentials.is_valid() {
            return Err(ExchangeError::Config(format!(
                "empty credentials for {}",
                self.exchange
            )));
        }
        Ok(credentials)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_millis(self.request_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rest_url.is_empty() || self.ws_public_url.is_empty() || self.ws_private_url.is_empty() {
            return Err(ExchangeError::Config(format!("missing endpoint url for {}", self.exchange)));
        }
        if self.event_buffer == 0 {
            return Err(ExchangeError::Config("event_buffer must be > 0".to_string()));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ExchangeError::Config("reconnect.max_attempts must be > 0".to_string()));
        }
        if self.ping_interval_ms == 0 || self.ping_timeout_ms < self.ping_interval_ms {
            return Err(ExchangeError::Config(
                "ping_timeout_ms must be >= ping_interval_ms > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawExchangeConfig {
    exchange: ExchangeId,
    #[serde(default)]
    credentials: Option<ApiCredentials>,
    rest_url: Option<String>,
    ws_public_url: Option<String>,
    ws_private_url: Option<String>,
    rate_limits: Option<RateLimitConfig>,
    retry: Option<RetryPolicy>,
    reconnect: Option<ReconnectPolicy>,
    ping_interval_ms: Option<u64>,
    ping_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    recv_window_ms: Option<u64>,
    keepalive_interval_ms: Option<u64>,
    event_buffer: Option<usize>,
    quote_assets: Option<Vec<String>>,
    user_id: Option<String>,
}

impl From<RawExchangeConfig> for ExchangeConfig {
    fn from(raw: RawExchangeConfig) -> Self {
        let defaults = ExchangeConfig::defaults_for(raw.exchange);
        Self {
            exchange: raw.exchange,
            credentials: raw.credentials,
            rest_url: raw.rest_url.unwrap_or(defaults.rest_url),
            ws_public_url: raw.ws_public_url.unwrap_or(defaults.ws_public_url),
            ws_private_url: raw.ws_private_url.unwrap_or(defaults.ws_private_url),
            rate_limits: raw.rate_limits.unwrap_or(defaults.rate_limits),
            retry: raw.retry.unwrap_or(defaults.retry),
            reconnect: raw.reconnect.unwrap_or(defaults.reconnect),
            ping_interval_ms: raw.ping_interval_ms.unwrap_or(defaults.ping_interval_ms),
            ping_timeout_ms: raw.ping_timeout_ms.unwrap_or(defaults.ping_timeout_ms),
            request_timeout_ms: raw.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
            connect_timeout_ms: raw.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            recv_window_ms: raw.recv_window_ms.unwrap_or(defaults.recv_window_ms),
            keepalive_interval_ms: raw
                .keepalive_interval_ms
                .unwrap_or(defaults.keepalive_interval_ms),
            event_buffer: raw.event_buffer.unwrap_or(defaults.event_buffer),
            quote_assets: raw.quote_assets.unwrap_or(defaults.quote_assets),
            user_id: raw.user_id.or(defaults.user_id),
        }
    }
}
