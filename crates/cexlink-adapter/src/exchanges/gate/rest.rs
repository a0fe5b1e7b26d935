/*
[INPUT]:  Normalized order requests and queries, Gate.io RestTransport
[OUTPUT]: Normalized Order/AssetBalance values
[POS]:    Gate.io exchange - spot and USDT-futures v4 REST commands
[UPDATE]: When Gate.io changes REST endpoints or payloads
*/

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};

use super::GateMarket;
use super::model::{FuturesAccount, FuturesOrder, SpotAccount, SpotOrder};
use crate::http::{ExchangeError, RestRequest, RestTransport, Result};
use crate::symbol::SymbolMapper;
use crate::trading::{TradingApi, generate_client_order_id, validate_order_request};
use crate::types::{
    AssetBalance, ExchangeId, Order, OrderRequest, OrderType, Side, Symbol, TimeInForce,
};

const SPOT_ORDERS_ENDPOINT: &str = "/api/v4/spot/orders";
const SPOT_OPEN_ORDERS_ENDPOINT: &str = "/api/v4/spot/open_orders";
const SPOT_ACCOUNTS_ENDPOINT: &str = "/api/v4/spot/accounts";
pub const FUTURES_SETTLE: &str = "usdt";

/// Gate.io requires custom order ids to start with `t-`; 28 bytes after the prefix.
const CLIENT_ORDER_ID_PREFIX: &str = "t-";
const CLIENT_ORDER_ID_MAX_LEN: usize = 30;

#[derive(Debug, Clone)]
pub struct GateRestApi {
    market: GateMarket,
    rest: Arc<RestTransport>,
    mapper: Arc<dyn SymbolMapper>,
}

impl GateRestApi {
    pub fn new(market: GateMarket, rest: Arc<RestTransport>, mapper: Arc<dyn SymbolMapper>) -> Self {
        Self { market, rest, mapper }
    }

    fn futures_orders_endpoint() -> String {
        format!("/api/v4/futures/{FUTURES_SETTLE}/orders")
    }

    fn spot_order_body(&self, request: &OrderRequest, text: &str) -> Value {
        let mut body = json!({
            "text": text,
            "currency_pair": self.mapper.to_wire(&request.symbol),
            "account": "spot",
            "side": side_str(request.side),
            "amount": request.qty.normalize().to_string(),
        });
        match request.order_type {
            OrderType::Market => {
                body["type"] = json!("market");
                body["time_in_force"] = json!("ioc");
            }
            OrderType::Limit | OrderType::LimitMaker => {
                body["type"] = json!("limit");
                body["price"] = json!(request.price.unwrap_or_default().normalize().to_string());
                body["time_in_force"] = json!(time_in_force(request));
            }
        }
        body
    }

    fn futures_order_body(&self, request: &OrderRequest, text: &str) -> Result<Value> {
        if !request.qty.fract().is_zero() {
            return Err(ExchangeError::Config(format!(
                "gate futures size must be a whole number of contracts, got {}",
                request.qty
            )));
        }
        let contracts = request.qty.to_i64().ok_or_else(|| {
            ExchangeError::Config(format!("gate futures size {} out of range", request.qty))
        })?;
        let size = match request.side {
            Side::Buy => contracts,
            Side::Sell => -contracts,
        };

        let (price, tif) = match request.order_type {
            OrderType::Market => ("0".to_string(), "ioc"),
            OrderType::Limit | OrderType::LimitMaker => (
                request.price.unwrap_or_default().normalize().to_string(),
                time_in_force(request),
            ),
        };
        Ok(json!({
            "contract": self.mapper.to_wire(&request.symbol),
            "size": size,
            "price": price,
            "tif": tif,
            "text": text,
        }))
    }

    fn to_order(&self, value: Value) -> Result<Order> {
        match self.market {
            GateMarket::Spot => serde_json::from_value::<SpotOrder>(value)?.into_order(self.mapper.as_ref()),
            GateMarket::Futures => {
                serde_json::from_value::<FuturesOrder>(value)?.into_order(self.mapper.as_ref())
            }
        }
    }

    fn to_orders(&self, value: Value) -> Result<Vec<Order>> {
        let Value::Array(items) = value else {
            return Err(ExchangeError::Protocol("gate order list is not an array".to_string()));
        };
        items.into_iter().map(|item| self.to_order(item)).collect()
    }
}

#[async_trait]
impl TradingApi for GateRestApi {
    fn exchange(&self) -> ExchangeId {
        self.market.exchange_id()
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        validate_order_request(request)?;
        let text = client_order_text(request.client_order_id.as_deref());

        let req = match self.market {
            GateMarket::Spot => RestRequest::post(SPOT_ORDERS_ENDPOINT).json(self.spot_order_body(request, &text)),
            GateMarket::Futures => {
                RestRequest::post(Self::futures_orders_endpoint()).json(self.futures_order_body(request, &text)?)
            }
        };
        let value = self.rest.request(&req.signed()).await?;
        let mut order = self.to_order(value)?;
        if order.client_order_id.is_none() {
            order.client_order_id = Some(text);
        }
        Ok(order)
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> Result<Order> {
        let req = match self.market {
            GateMarket::Spot => RestRequest::delete(format!("{SPOT_ORDERS_ENDPOINT}/{order_id}"))
                .param("currency_pair", self.mapper.to_wire(symbol)),
            GateMarket::Futures => {
                RestRequest::delete(format!("{}/{order_id}", Self::futures_orders_endpoint()))
            }
        };
        let value = self.rest.request(&req.signed()).await?;
        self.to_order(value)
    }

    async fn get_balances(&self) -> Result<HashMap<String, AssetBalance>> {
        let balances: Vec<AssetBalance> = match self.market {
            GateMarket::Spot => {
                let accounts: Vec<SpotAccount> = self
                    .rest
                    .request_json(&RestRequest::get(SPOT_ACCOUNTS_ENDPOINT).signed())
                    .await?;
                accounts.into_iter().map(AssetBalance::from).collect()
            }
            GateMarket::Futures => {
                let endpoint = format!("/api/v4/futures/{FUTURES_SETTLE}/accounts");
                let account: FuturesAccount = self.rest.request_json(&RestRequest::get(endpoint).signed()).await?;
                vec![account.into_balance(FUTURES_SETTLE)]
            }
        };
        Ok(balances
            .into_iter()
            .map(|balance| (balance.asset.clone(), balance))
            .collect())
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>> {
        match (self.market, symbol) {
            (GateMarket::Spot, Some(symbol)) => {
                let req = RestRequest::get(SPOT_ORDERS_ENDPOINT)
                    .param("currency_pair", self.mapper.to_wire(symbol))
                    .param("status", "open")
                    .signed();
                self.to_orders(self.rest.request(&req).await?)
            }
            (GateMarket::Spot, None) => {
                // Grouped per currency pair: [{"currency_pair": .., "orders": [..]}]
                let value = self
                    .rest
                    .request(&RestRequest::get(SPOT_OPEN_ORDERS_ENDPOINT).signed())
                    .await?;
                let Value::Array(groups) = value else {
                    return Err(ExchangeError::Protocol("gate open orders is not an array".to_string()));
                };
                let mut orders = Vec::new();
                for mut group in groups {
                    let pair = group.get("currency_pair").cloned();
                    if let Some(Value::Array(items)) = group.get_mut("orders").map(Value::take) {
                        for mut item in items {
                            if item.get("currency_pair").is_none() {
                                if let (Some(pair), Some(fields)) = (pair.clone(), item.as_object_mut()) {
                                    fields.insert("currency_pair".to_string(), pair);
                                }
                            }
                            orders.push(self.to_order(item)?);
                        }
                    }
                }
                Ok(orders)
            }
            (GateMarket::Futures, symbol) => {
                let req = RestRequest::get(Self::futures_orders_endpoint())
                    .param("status", "open")
                    .param_opt("contract", symbol.map(|symbol| self.mapper.to_wire(symbol)))
                    .signed();
                self.to_orders(self.rest.request(&req).await?)
            }
        }
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn time_in_force(request: &OrderRequest) -> &'static str {
    match (request.order_type, request.time_in_force) {
        (OrderType::LimitMaker, _) | (_, Some(TimeInForce::PostOnly)) => "poc",
        (_, Some(TimeInForce::Ioc)) => "ioc",
        (_, Some(TimeInForce::Fok)) => "fok",
        _ => "gtc",
    }
}

fn client_order_text(requested: Option<&str>) -> String {
    match requested {
        Some(id) if id.starts_with(CLIENT_ORDER_ID_PREFIX) => id.to_string(),
        Some(id) => format!("{CLIENT_ORDER_ID_PREFIX}{id}"),
        None => generate_client_order_id(CLIENT_ORDER_ID_PREFIX, CLIENT_ORDER_ID_MAX_LEN),
    }
}
