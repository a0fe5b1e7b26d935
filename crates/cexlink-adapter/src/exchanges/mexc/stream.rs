/*
[INPUT]:  ExchangeConfig, MEXC REST API (listen keys), tracked symbols
[OUTPUT]: Connection contexts and SUBSCRIPTION/UNSUBSCRIPTION envelopes
[POS]:    MEXC exchange - connection and subscription strategies
[UPDATE]: When MEXC changes stream URLs or channel names
*/

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use url::Url;

use super::rest::MexcRestApi;
use crate::config::ExchangeConfig;
use crate::http::Result;
use crate::symbol::SymbolMapper;
use crate::types::{SubscriptionAction, Symbol};
use crate::ws::{ConnectionContext, ConnectionStrategy, SubscriptionContext, SubscriptionStrategy};

pub const DEPTH_CHANNEL: &str = "spot@public.increase.depth.v3.api";
pub const DEALS_CHANNEL: &str = "spot@public.deals.v3.api";
pub const ORDERS_CHANNEL: &str = "spot@private.orders.v3.api";
pub const ACCOUNT_CHANNEL: &str = "spot@private.account.v3.api";
pub const PING_MESSAGE: &str = r#"{"method":"PING"}"#;

/// MEXC accepts at most 30 streams per subscription request.
const MAX_PARAMS_PER_MESSAGE: usize = 30;

fn base_context(config: &ExchangeConfig, url: impl Into<String>) -> ConnectionContext {
    ConnectionContext::new(url)
        .with_ping(config.ping_interval(), config.ping_timeout())
        .with_reconnect(
            config.reconnect.max_attempts,
            Duration::from_millis(config.reconnect.initial_delay_ms),
        )
}

#[derive(Debug)]
pub struct MexcPublicConnection {
    config: Arc<ExchangeConfig>,
}

impl MexcPublicConnection {
    pub fn new(config: Arc<ExchangeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionStrategy for MexcPublicConnection {
    async fn create_connection_context(&self) -> Result<ConnectionContext> {
        Ok(base_context(&self.config, self.config.ws_public_url.clone()))
    }

    fn ping_message(&self) -> Option<String> {
        Some(PING_MESSAGE.to_string())
    }
}

/// User data stream: a listen key obtained over REST authorizes the socket.
#[derive(Debug)]
pub struct MexcPrivateConnection {
    config: Arc<ExchangeConfig>,
    api: MexcRestApi,
    listen_key: Mutex<Option<String>>,
}

impl MexcPrivateConnection {
    pub fn new(config: Arc<ExchangeConfig>, api: MexcRestApi) -> Self {
        Self {
            config,
            api,
            listen_key: Mutex::new(None),
        }
    }

    fn current_listen_key(&self) -> Option<String> {
        self.listen_key.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl ConnectionStrategy for MexcPrivateConnection {
    async fn create_connection_context(&self) -> Result<ConnectionContext> {
        let listen_key = self.api.create_listen_key().await?;
        let url = Url::parse_with_params(&self.config.ws_private_url, &[("listenKey", &listen_key)])?;

        if let Ok(mut guard) = self.listen_key.lock() {
            *guard = Some(listen_key.clone());
        }
        info!("mexc user data stream session opened");

        Ok(base_context(&self.config, url.to_string()).with_auth_param("listenKey", listen_key))
    }

    fn ping_message(&self) -> Option<String> {
        Some(PING_MESSAGE.to_string())
    }

    fn keepalive_interval(&self) -> Option<Duration> {
        Some(self.config.keepalive_interval())
    }

    async fn keepalive(&self) -> Result<()> {
        match self.current_listen_key() {
            Some(listen_key) => self.api.keepalive_listen_key(&listen_key).await,
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct MexcSubscription {
    private: bool,
    mapper: Arc<dyn SymbolMapper>,
}

impl MexcSubscription {
    pub fn public(mapper: Arc<dyn SymbolMapper>) -> Self {
        Self {
            private: false,
            mapper,
        }
    }

    pub fn private(mapper: Arc<dyn SymbolMapper>) -> Self {
        Self {
            private: true,
            mapper,
        }
    }

    fn symbol_channels(&self, symbol: &Symbol) -> Vec<String> {
        if self.private {
            return Vec::new();
        }
        let wire = self.mapper.to_wire(symbol);
        vec![format!("{DEPTH_CHANNEL}@{wire}"), format!("{DEALS_CHANNEL}@{wire}")]
    }
}

fn envelope(action: SubscriptionAction, params: &[String]) -> String {
    let method = match action {
        SubscriptionAction::Subscribe => "SUBSCRIPTION",
        SubscriptionAction::Unsubscribe => "UNSUBSCRIPTION",
    };
    json!({ "method": method, "params": params }).to_string()
}

impl SubscriptionStrategy for MexcSubscription {
    fn create_subscription_messages(
        &self,
        symbols: &[Symbol],
        action: SubscriptionAction,
    ) -> Result<Vec<String>> {
        let params: Vec<String> = symbols
            .iter()
            .flat_map(|symbol| self.symbol_channels(symbol))
            .collect();
        Ok(params
            .chunks(MAX_PARAMS_PER_MESSAGE)
            .map(|chunk| envelope(action, chunk))
            .collect())
    }

    fn create_account_messages(&self, action: SubscriptionAction) -> Result<Vec<String>> {
        if !self.private {
            return Ok(Vec::new());
        }
        Ok(vec![envelope(
            action,
            &[ACCOUNT_CHANNEL.to_string(), ORDERS_CHANNEL.to_string()],
        )])
    }

    fn subscription_context(&self, symbol: &Symbol) -> SubscriptionContext {
        let channels = if self.private {
            vec![ACCOUNT_CHANNEL.to_string(), ORDERS_CHANNEL.to_string()]
        } else {
            self.symbol_channels(symbol)
        };
        SubscriptionContext::new(symbol.clone(), channels)
    }
}
