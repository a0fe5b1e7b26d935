/*
[INPUT]:  Order requests, cancel targets, balance/open-order queries
[OUTPUT]: Normalized Order / AssetBalance values from exchange REST APIs
[POS]:    Command layer - exchange-agnostic trading contract
[UPDATE]: When adding trading commands
*/

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::http::{ExchangeError, Result};
use crate::types::{AssetBalance, ExchangeId, Order, OrderRequest, OrderType, Symbol};

/// Outbound commands every exchange implements over its REST API.
#[async_trait]
pub trait TradingApi: Send + Sync + Debug {
    fn exchange(&self) -> ExchangeId;

    async fn place_order(&self, request: &OrderRequest) -> Result<Order>;

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> Result<Order>;

    /// Balances keyed by upper-case asset code.
    async fn get_balances(&self) -> Result<HashMap<String, AssetBalance>>;

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>>;
}

/// Reject requests no exchange would accept before spending a rate-limit token.
pub fn validate_order_request(request: &OrderRequest) -> Result<()> {
    if request.qty <= Decimal::ZERO {
        return Err(ExchangeError::Config(format!(
            "order quantity must be positive, got {}",
            request.qty
        )));
    }
    match (request.order_type, request.price) {
        (OrderType::Market, _) => Ok(()),
        (_, Some(price)) if price > Decimal::ZERO => Ok(()),
        (order_type, price) => Err(ExchangeError::Config(format!(
            "{order_type:?} order requires a positive price, got {price:?}"
        ))),
    }
}

/// Random client order id of at most `max_len` characters including `prefix`.
pub fn generate_client_order_id(prefix: &str, max_len: usize) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let keep = max_len.saturating_sub(prefix.len()).min(id.len());
    format!("{prefix}{}", &id[..keep])
}
