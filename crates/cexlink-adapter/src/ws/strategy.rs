/*
[INPUT]:  Exchange configuration, tracked symbols, raw inbound frames
[OUTPUT]: Connection targets, subscribe/unsubscribe envelopes, ParsedMessage values
[POS]:    WebSocket layer - per-exchange strategy contracts driven by ConnectionManager
[UPDATE]: When the manager needs a new hook from exchange strategies
*/

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::connection::WsConnection;
use crate::http::{ExchangeError, Result};
use crate::types::{InboundFrame, ParsedMessage, SubscriptionAction, Symbol};

const PARSE_FAIL_LOG_LIMIT: u64 = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

/// Everything needed to open one socket. Built fresh for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionContext {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub auth_required: bool,
    pub auth_params: HashMap<String, String>,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl ConnectionContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            auth_required: false,
            auth_params: HashMap::new(),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(60),
            max_reconnect_attempts: 10,
            reconnect_delay: Duration::from_secs(1),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_required = true;
        self.auth_params.insert(key.into(), value.into());
        self
    }

    pub fn with_ping(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ping_interval = interval;
        self.ping_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay = delay;
        self
    }
}

/// Intended subscription state for one symbol, replayed after reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionContext {
    pub symbol: Symbol,
    pub channels: Vec<String>,
    pub parameters: HashMap<String, String>,
    pub subscription_id: Option<String>,
}

impl SubscriptionContext {
    pub fn new(symbol: Symbol, channels: Vec<String>) -> Self {
        Self {
            symbol,
            channels,
            parameters: HashMap::new(),
            subscription_id: None,
        }
    }
}

/// Default reconnect classification: transport and protocol trouble is
/// retried, credential and configuration problems are terminal.
pub fn default_should_reconnect(error: &ExchangeError) -> bool {
    !matches!(
        error,
        ExchangeError::Authentication { .. } | ExchangeError::Config(_) | ExchangeError::Cancelled
    )
}

/// Builds the connection target and performs handshakes for one stream.
#[async_trait]
pub trait ConnectionStrategy: Send + Sync + Debug {
    /// URL and headers for the next attempt. Private streams perform any
    /// out-of-band credential exchange here, before the socket is opened.
    async fn create_connection_context(&self) -> Result<ConnectionContext>;

    /// In-band handshake. `Ok(false)` reports an expected rejection.
    async fn authenticate(&self, _conn: &mut dyn WsConnection) -> Result<bool> {
        Ok(true)
    }

    fn should_reconnect(&self, error: &ExchangeError) -> bool {
        default_should_reconnect(error)
    }

    /// Application-level ping text; `None` sends a protocol ping frame.
    fn ping_message(&self) -> Option<String> {
        None
    }

    /// How often [`ConnectionStrategy::keepalive`] must run while connected.
    fn keepalive_interval(&self) -> Option<Duration> {
        None
    }

    /// Out-of-band session keepalive (e.g. extending a listen key).
    async fn keepalive(&self) -> Result<()> {
        Ok(())
    }
}

/// Turns subscription intents into wire-ready messages. Pure: no socket access.
pub trait SubscriptionStrategy: Send + Sync + Debug {
    /// Messages for symbol-scoped channels.
    fn create_subscription_messages(
        &self,
        symbols: &[Symbol],
        action: SubscriptionAction,
    ) -> Result<Vec<String>>;

    /// Messages for account-scoped channels sent once per connection.
    fn create_account_messages(&self, _action: SubscriptionAction) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn subscription_context(&self, symbol: &Symbol) -> SubscriptionContext;

    fn should_resubscribe_on_reconnect(&self) -> bool {
        true
    }
}

/// Classifies and decodes one inbound frame. Never fails: malformed input
/// yields an `Unknown` message and bumps [`MessageParser::error_count`].
pub trait MessageParser: Send + Sync + Debug {
    fn parse_message(&self, frame: &InboundFrame) -> ParsedMessage;

    fn error_count(&self) -> u64;
}

/// Malformed-frame counter with sample-limited logging.
#[derive(Debug, Default)]
pub struct ParseErrorCounter {
    count: AtomicU64,
}

impl ParseErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Record a malformed frame and return the `Unknown` message to publish.
    pub fn record(&self, exchange: &'static str, reason: &dyn std::fmt::Display, raw: &str) -> ParsedMessage {
        let count = self.count.fetch_add(1, Ordering::Relaxed);
        if count < PARSE_FAIL_LOG_LIMIT {
            info!(
                exchange,
                sample_index = count + 1,
                sample_limit = PARSE_FAIL_LOG_LIMIT,
                error = %reason,
                bytes = raw.len(),
                "ws message parse failed"
            );
            debug!(
                exchange,
                message = %truncate_for_log(raw, RAW_LOG_MAX_BYTES),
                "ws message parse failed"
            );
        }
        ParsedMessage::unknown().with_raw(truncate_for_log(raw, RAW_LOG_MAX_BYTES))
    }
}

pub fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
