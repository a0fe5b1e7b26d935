/*
[INPUT]:  ExchangeConfig, credentials for private channels, tracked symbols
[OUTPUT]: Connection contexts and `{time, channel, event, payload, auth}` requests
[POS]:    Gate.io exchange - WebSocket v4 connection and subscription strategies
[UPDATE]: When Gate.io changes channel names or payload layouts
*/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::GateMarket;
use super::auth::channel_auth;
use crate::auth::ApiCredentials;
use crate::config::ExchangeConfig;
use crate::http::{ExchangeError, Result};
use crate::symbol::SymbolMapper;
use crate::types::{SubscriptionAction, Symbol, now_millis};
use crate::ws::{ConnectionContext, ConnectionStrategy, SubscriptionContext, SubscriptionStrategy};

pub const ORDER_BOOK_CHANNEL: &str = "order_book_update";
pub const TRADES_CHANNEL: &str = "trades";
pub const ORDERS_CHANNEL: &str = "orders";
pub const BALANCES_CHANNEL: &str = "balances";

const BOOK_INTERVAL: &str = "100ms";
const FUTURES_BOOK_LEVELS: &str = "20";

#[derive(Debug)]
pub struct GateConnection {
    market: GateMarket,
    private: bool,
    config: Arc<ExchangeConfig>,
}

impl GateConnection {
    pub fn public(market: GateMarket, config: Arc<ExchangeConfig>) -> Self {
        Self {
            market,
            private: false,
            config,
        }
    }

    pub fn private(market: GateMarket, config: Arc<ExchangeConfig>) -> Self {
        Self {
            market,
            private: true,
            config,
        }
    }
}

#[async_trait]
impl ConnectionStrategy for GateConnection {
    async fn create_connection_context(&self) -> Result<ConnectionContext> {
        let url = if self.private {
            &self.config.ws_private_url
        } else {
            &self.config.ws_public_url
        };
        let mut context = ConnectionContext::new(url.clone())
            .with_ping(self.config.ping_interval(), self.config.ping_timeout())
            .with_reconnect(
                self.config.reconnect.max_attempts,
                Duration::from_millis(self.config.reconnect.initial_delay_ms),
            );
        if self.private {
            // Private channels authenticate per request; the socket itself is anonymous.
            context = context.with_auth_param("method", "api_key");
        }
        Ok(context)
    }

    fn ping_message(&self) -> Option<String> {
        Some(
            json!({
                "time": now_millis() / 1000,
                "channel": self.market.channel("ping"),
            })
            .to_string(),
        )
    }
}

#[derive(Debug)]
pub struct GateSubscription {
    market: GateMarket,
    mapper: Arc<dyn SymbolMapper>,
    credentials: Option<ApiCredentials>,
    user_id: Option<String>,
}

impl GateSubscription {
    pub fn public(market: GateMarket, mapper: Arc<dyn SymbolMapper>) -> Self {
        Self {
            market,
            mapper,
            credentials: None,
            user_id: None,
        }
    }

    /// Futures private channels are keyed by the numeric account id, so
    /// `user_id` is mandatory there.
    pub fn private(
        market: GateMarket,
        mapper: Arc<dyn SymbolMapper>,
        credentials: ApiCredentials,
        user_id: Option<String>,
    ) -> Result<Self> {
        if market == GateMarket::Futures && user_id.as_deref().is_none_or(str::is_empty) {
            return Err(ExchangeError::Config(
                "gate futures private channels require user_id".to_string(),
            ));
        }
        Ok(Self {
            market,
            mapper,
            credentials: Some(credentials),
            user_id,
        })
    }

    fn is_private(&self) -> bool {
        self.credentials.is_some()
    }

    fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or_default()
    }

    fn request(&self, channel: &str, action: SubscriptionAction, payload: Vec<String>) -> Result<String> {
        let event = match action {
            SubscriptionAction::Subscribe => "subscribe",
            SubscriptionAction::Unsubscribe => "unsubscribe",
        };
        let time = now_millis() / 1000;
        let mut request = json!({
            "time": time,
            "channel": channel,
            "event": event,
            "payload": payload,
        });
        if let Some(credentials) = &self.credentials {
            request["auth"] = channel_auth(credentials, channel, event, time)?;
        }
        Ok(request.to_string())
    }

    fn book_payload(&self, wire: String) -> Vec<String> {
        match self.market {
            GateMarket::Spot => vec![wire, BOOK_INTERVAL.to_string()],
            GateMarket::Futures => vec![wire, BOOK_INTERVAL.to_string(), FUTURES_BOOK_LEVELS.to_string()],
        }
    }
}

impl SubscriptionStrategy for GateSubscription {
    fn create_subscription_messages(
        &self,
        symbols: &[Symbol],
        action: SubscriptionAction,
    ) -> Result<Vec<String>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let wires: Vec<String> = symbols.iter().map(|symbol| self.mapper.to_wire(symbol)).collect();
        let mut messages = Vec::new();

        if self.is_private() {
            let channel = self.market.channel(ORDERS_CHANNEL);
            match self.market {
                GateMarket::Spot => messages.push(self.request(&channel, action, wires)?),
                GateMarket::Futures => {
                    for wire in wires {
                        messages.push(self.request(&channel, action, vec![self.user_id().to_string(), wire])?);
                    }
                }
            }
            return Ok(messages);
        }

        let book_channel = self.market.channel(ORDER_BOOK_CHANNEL);
        for wire in &wires {
            messages.push(self.request(&book_channel, action, self.book_payload(wire.clone()))?);
        }
        messages.push(self.request(&self.market.channel(TRADES_CHANNEL), action, wires)?);
        Ok(messages)
    }

    fn create_account_messages(&self, action: SubscriptionAction) -> Result<Vec<String>> {
        if !self.is_private() {
            return Ok(Vec::new());
        }
        let payload = match self.market {
            GateMarket::Spot => Vec::new(),
            GateMarket::Futures => vec![self.user_id().to_string()],
        };
        Ok(vec![self.request(&self.market.channel(BALANCES_CHANNEL), action, payload)?])
    }

    fn subscription_context(&self, symbol: &Symbol) -> SubscriptionContext {
        let channels = if self.is_private() {
            vec![self.market.channel(ORDERS_CHANNEL)]
        } else {
            vec![
                self.market.channel(ORDER_BOOK_CHANNEL),
                self.market.channel(TRADES_CHANNEL),
            ]
        };
        let mut context = SubscriptionContext::new(symbol.clone(), channels);
        context
            .parameters
            .insert("wire_symbol".to_string(), self.mapper.to_wire(symbol));
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hmac::hmac_sha512_hex;
    use crate::symbol::SeparatorSymbolMapper;
    use serde_json::Value;

    fn parse(messages: &[String]) -> Vec<Value> {
        messages.iter().map(|m| serde_json::from_str(m).unwrap()).collect()
    }

    fn symbols() -> Vec<Symbol> {
        vec![Symbol::spot("BTC", "USDT"), Symbol::spot("ETH", "USDT")]
    }

    #[test]
    fn public_spot_subscribes_book_per_symbol_and_trades_batched() {
        let sub = GateSubscription::public(GateMarket::Spot, Arc::new(SeparatorSymbolMapper::new('_', false)));
        let messages = parse(&sub.create_subscription_messages(&symbols(), SubscriptionAction::Subscribe).unwrap());

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["channel"], "spot.order_book_update");
        assert_eq!(messages[0]["payload"], json!(["BTC_USDT", "100ms"]));
        assert_eq!(messages[2]["channel"], "spot.trades");
        assert_eq!(messages[2]["payload"], json!(["BTC_USDT", "ETH_USDT"]));
        assert!(messages.iter().all(|m| m["event"] == "subscribe" && m.get("auth").is_none()));
        assert!(sub.create_account_messages(SubscriptionAction::Subscribe).unwrap().is_empty());
    }

    #[test]
    fn private_requests_carry_signed_auth() {
        let sub = GateSubscription::private(
            GateMarket::Spot,
            Arc::new(SeparatorSymbolMapper::new('_', false)),
            ApiCredentials::new("key", "secret"),
            None,
        )
        .unwrap();
        let messages = parse(&sub.create_subscription_messages(&symbols(), SubscriptionAction::Unsubscribe).unwrap());
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg["channel"], "spot.orders");
        assert_eq!(msg["event"], "unsubscribe");

        let time = msg["time"].as_i64().unwrap();
        let expected = hmac_sha512_hex("secret", &format!("channel=spot.orders&event=unsubscribe&time={time}")).unwrap();
        assert_eq!(msg["auth"]["SIGN"], expected);
        assert_eq!(msg["auth"]["KEY"], "key");

        let account = parse(&sub.create_account_messages(SubscriptionAction::Subscribe).unwrap());
        assert_eq!(account[0]["channel"], "spot.balances");
        assert_eq!(account[0]["payload"], json!([]));
    }

    #[test]
    fn futures_private_requires_user_id() {
        let mapper: Arc<dyn SymbolMapper> = Arc::new(SeparatorSymbolMapper::new('_', true));
        let creds = ApiCredentials::new("key", "secret");
        assert!(matches!(
            GateSubscription::private(GateMarket::Futures, mapper.clone(), creds.clone(), None),
            Err(ExchangeError::Config(_))
        ));

        let sub = GateSubscription::private(GateMarket::Futures, mapper, creds, Some("1001".to_string())).unwrap();
        let messages = parse(
            &sub.create_subscription_messages(&[Symbol::futures("BTC", "USDT")], SubscriptionAction::Subscribe)
                .unwrap(),
        );
        assert_eq!(messages[0]["channel"], "futures.orders");
        assert_eq!(messages[0]["payload"], json!(["1001", "BTC_USDT"]));
    }

    #[test]
    fn ping_uses_market_channel() {
        let conn = GateConnection::public(
            GateMarket::Futures,
            Arc::new(ExchangeConfig::defaults_for(crate::types::ExchangeId::GateFutures)),
        );
        let ping: Value = serde_json::from_str(&conn.ping_message().unwrap()).unwrap();
        assert_eq!(ping["channel"], "futures.ping");
    }
}
