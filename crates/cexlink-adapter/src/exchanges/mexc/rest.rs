/*
[INPUT]:  Normalized order requests and queries, MEXC RestTransport
[OUTPUT]: Normalized Order/AssetBalance values; listen keys for the user stream
[POS]:    MEXC exchange - spot v3 REST commands
[UPDATE]: When MEXC changes REST endpoints or payloads
*/

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::exchanges::wire::{average_price, opt_string_or_number, string_or_number};
use crate::http::{ExchangeError, RestRequest, RestTransport, Result};
use crate::symbol::SymbolMapper;
use crate::trading::{TradingApi, generate_client_order_id, validate_order_request};
use crate::types::{
    AssetBalance, ExchangeId, Order, OrderRequest, OrderStatus, OrderType, Side, Symbol,
    TimeInForce, now_millis,
};

const ORDER_ENDPOINT: &str = "/api/v3/order";
const OPEN_ORDERS_ENDPOINT: &str = "/api/v3/openOrders";
const ACCOUNT_ENDPOINT: &str = "/api/v3/account";
const LISTEN_KEY_ENDPOINT: &str = "/api/v3/userDataStream";
const CLIENT_ORDER_ID_MAX_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct MexcRestApi {
    rest: Arc<RestTransport>,
    mapper: Arc<dyn SymbolMapper>,
}

impl MexcRestApi {
    pub fn new(rest: Arc<RestTransport>, mapper: Arc<dyn SymbolMapper>) -> Self {
        Self { rest, mapper }
    }

    /// Open a user data stream session.
    pub async fn create_listen_key(&self) -> Result<String> {
        let response: ListenKeyResponse = self
            .rest
            .request_json(&RestRequest::post(LISTEN_KEY_ENDPOINT).signed())
            .await?;
        debug!("mexc listen key created");
        Ok(response.listen_key)
    }

    /// Extend a listen key; MEXC expires idle keys after 60 minutes.
    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<()> {
        self.rest
            .request(
                &RestRequest::put(LISTEN_KEY_ENDPOINT)
                    .param("listenKey", listen_key)
                    .signed(),
            )
            .await?;
        Ok(())
    }

    pub async fn close_listen_key(&self, listen_key: &str) -> Result<()> {
        self.rest
            .request(
                &RestRequest::delete(LISTEN_KEY_ENDPOINT)
                    .param("listenKey", listen_key)
                    .signed(),
            )
            .await?;
        Ok(())
    }

    fn to_order(&self, wire: MexcOrder) -> Result<Order> {
        let symbol = self.mapper.from_wire(&wire.symbol)?;
        let side = parse_side(&wire.side)?;
        let filled_qty = wire.executed_qty.unwrap_or_default();
        let avg_fill_price = wire
            .cummulative_quote_qty
            .and_then(|quote| average_price(quote, filled_qty));
        let order_type = wire.order_type.as_deref().map(parse_order_type).unwrap_or(OrderType::Limit);

        Ok(Order {
            order_id: wire.order_id,
            client_order_id: wire.client_order_id,
            symbol,
            side,
            order_type,
            price: wire.price.filter(|price| !price.is_zero()),
            qty: wire.orig_qty.unwrap_or_default(),
            filled_qty,
            avg_fill_price,
            status: wire.status.as_deref().map(parse_status).unwrap_or(OrderStatus::New),
            timestamp: wire
                .update_time
                .or(wire.transact_time)
                .or(wire.time)
                .unwrap_or_else(now_millis),
        })
    }
}

#[async_trait]
impl TradingApi for MexcRestApi {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::MexcSpot
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        validate_order_request(request)?;
        let client_order_id = request
            .client_order_id
            .clone()
            .unwrap_or_else(|| generate_client_order_id("", CLIENT_ORDER_ID_MAX_LEN));

        let wire_symbol = self.mapper.to_wire(&request.symbol);
        let mut req = RestRequest::post(ORDER_ENDPOINT)
            .param("symbol", &wire_symbol)
            .param("side", side_str(request.side))
            .param("type", wire_order_type(request))
            .param("quantity", request.qty.normalize());
        if request.order_type != OrderType::Market {
            req = req.param_opt("price", request.price.map(|price| price.normalize()));
        }
        // MEXC rejects a repeated newClientOrderId, so a replay cannot double-fill.
        let req = req
            .param("newClientOrderId", &client_order_id)
            .signed()
            .idempotent();

        let mut wire: MexcOrder = self.rest.request_json(&req).await?;
        if wire.client_order_id.is_none() {
            wire.client_order_id = Some(client_order_id);
        }
        self.to_order(wire)
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> Result<Order> {
        let req = RestRequest::delete(ORDER_ENDPOINT)
            .param("symbol", self.mapper.to_wire(symbol))
            .param("orderId", order_id)
            .signed();
        let wire: MexcOrder = self.rest.request_json(&req).await?;
        self.to_order(wire)
    }

    async fn get_balances(&self) -> Result<HashMap<String, AssetBalance>> {
        let account: MexcAccount = self
            .rest
            .request_json(&RestRequest::get(ACCOUNT_ENDPOINT).signed())
            .await?;
        Ok(account
            .balances
            .into_iter()
            .map(|balance| {
                let asset = balance.asset.to_ascii_uppercase();
                (
                    asset.clone(),
                    AssetBalance {
                        asset,
                        free: balance.free,
                        locked: balance.locked,
                    },
                )
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>> {
        let symbol = symbol.ok_or_else(|| {
            ExchangeError::Config("mexc open orders query requires a symbol".to_string())
        })?;
        let req = RestRequest::get(OPEN_ORDERS_ENDPOINT)
            .param("symbol", self.mapper.to_wire(symbol))
            .signed();
        let orders: Vec<MexcOrder> = self.rest.request_json(&req).await?;
        orders.into_iter().map(|order| self.to_order(order)).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenKeyResponse {
    listen_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MexcOrder {
    symbol: String,
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    client_order_id: Option<String>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    orig_qty: Option<Decimal>,
    #[serde(default)]
    executed_qty: Option<Decimal>,
    #[serde(default)]
    cummulative_quote_qty: Option<Decimal>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "type", default)]
    order_type: Option<String>,
    side: String,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    transact_time: Option<i64>,
    #[serde(default)]
    update_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MexcAccount {
    #[serde(default)]
    balances: Vec<MexcBalance>,
}

#[derive(Debug, Deserialize)]
struct MexcBalance {
    asset: String,
    free: Decimal,
    locked: Decimal,
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn parse_side(value: &str) -> Result<Side> {
    match value {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(ExchangeError::Protocol(format!("unknown mexc side {other}"))),
    }
}

fn wire_order_type(request: &OrderRequest) -> &'static str {
    match (request.order_type, request.time_in_force) {
        (OrderType::Market, _) => "MARKET",
        (OrderType::LimitMaker, _) | (_, Some(TimeInForce::PostOnly)) => "LIMIT_MAKER",
        (OrderType::Limit, Some(TimeInForce::Ioc)) => "IMMEDIATE_OR_CANCEL",
        (OrderType::Limit, Some(TimeInForce::Fok)) => "FILL_OR_KILL",
        (OrderType::Limit, _) => "LIMIT",
    }
}

fn parse_order_type(value: &str) -> OrderType {
    match value {
        "MARKET" => OrderType::Market,
        "LIMIT_MAKER" => OrderType::LimitMaker,
        _ => OrderType::Limit,
    }
}

pub(crate) fn parse_status(value: &str) -> OrderStatus {
    match value {
        "NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" => OrderStatus::Cancelled,
        "PARTIALLY_CANCELED" => OrderStatus::PartiallyCancelled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" => OrderStatus::Expired,
        _ => OrderStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_type_follows_time_in_force() {
        let symbol = Symbol::spot("BTC", "USDT");
        let mut req = OrderRequest::limit(symbol.clone(), Side::Buy, dec!(1), dec!(10));
        assert_eq!(wire_order_type(&req), "LIMIT");
        req.time_in_force = Some(TimeInForce::Ioc);
        assert_eq!(wire_order_type(&req), "IMMEDIATE_OR_CANCEL");
        req.time_in_force = Some(TimeInForce::PostOnly);
        assert_eq!(wire_order_type(&req), "LIMIT_MAKER");
        assert_eq!(
            wire_order_type(&OrderRequest::market(symbol, Side::Sell, dec!(1))),
            "MARKET"
        );
    }

    #[test]
    fn status_strings_map_to_normalized_status() {
        assert_eq!(parse_status("PARTIALLY_CANCELED"), OrderStatus::PartiallyCancelled);
        assert_eq!(parse_status("FILLED"), OrderStatus::Filled);
        assert_eq!(parse_status("SOMETHING"), OrderStatus::Unknown);
    }
}
