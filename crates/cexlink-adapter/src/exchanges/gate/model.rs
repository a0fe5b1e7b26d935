/*
[INPUT]:  Gate.io spot and USDT-futures order/balance JSON (REST and WebSocket share shapes)
[OUTPUT]: Normalized Order and AssetBalance values
[POS]:    Gate.io exchange - wire structs and their normalization
[UPDATE]: When Gate.io adds order fields or finish reasons
*/

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::exchanges::wire::{average_price, non_zero, opt_millis, opt_string_or_number, string_or_number};
use crate::http::{ExchangeError, Result};
use crate::symbol::SymbolMapper;
use crate::types::{AssetBalance, Order, OrderStatus, OrderType, Side, now_millis};

#[derive(Debug, Deserialize)]
pub(crate) struct SpotOrder {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub create_time_ms: Option<i64>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub update_time_ms: Option<i64>,
    pub currency_pair: String,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
    pub side: String,
    pub amount: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub left: Option<Decimal>,
    #[serde(default)]
    pub filled_total: Option<Decimal>,
    #[serde(default)]
    pub avg_deal_price: Option<Decimal>,
    #[serde(default)]
    pub time_in_force: Option<String>,
    /// REST only: `open`, `closed`, `cancelled`
    #[serde(default)]
    pub status: Option<String>,
    /// Stream only: `put`, `update`, `finish`
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub finish_as: Option<String>,
}

impl SpotOrder {
    pub fn into_order(self, mapper: &dyn SymbolMapper) -> Result<Order> {
        let symbol = mapper.from_wire(&self.currency_pair)?;
        let side = parse_side(&self.side)?;
        let left = self.left.unwrap_or(self.amount);
        let filled_qty = (self.amount - left).max(Decimal::ZERO);
        let avg_fill_price = self
            .avg_deal_price
            .and_then(non_zero)
            .or_else(|| self.filled_total.and_then(|total| average_price(total, filled_qty)));

        let finished = matches!(self.status.as_deref(), Some("closed" | "cancelled"))
            || self.event.as_deref() == Some("finish");
        let status = order_status(
            finished,
            self.status.as_deref(),
            self.finish_as.as_deref(),
            filled_qty,
        );

        let order_type = match self.order_type.as_deref() {
            Some("market") => OrderType::Market,
            _ if self.time_in_force.as_deref() == Some("poc") => OrderType::LimitMaker,
            _ => OrderType::Limit,
        };

        Ok(Order {
            order_id: self.id,
            client_order_id: self.text,
            symbol,
            side,
            order_type,
            price: self.price.and_then(non_zero),
            qty: self.amount,
            filled_qty,
            avg_fill_price,
            status,
            timestamp: self
                .update_time_ms
                .or(self.create_time_ms)
                .unwrap_or_else(now_millis),
        })
    }
}

/// Futures order. `size` is signed (positive buys) and counted in contracts.
#[derive(Debug, Deserialize)]
pub(crate) struct FuturesOrder {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub text: Option<String>,
    pub contract: String,
    pub size: Decimal,
    #[serde(default)]
    pub left: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub fill_price: Option<Decimal>,
    #[serde(default)]
    pub tif: Option<String>,
    /// `open` or `finished`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub finish_as: Option<String>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub create_time_ms: Option<i64>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub finish_time_ms: Option<i64>,
    /// REST reports seconds as a float
    #[serde(default)]
    pub create_time: Option<f64>,
}

impl FuturesOrder {
    pub fn into_order(self, mapper: &dyn SymbolMapper) -> Result<Order> {
        let symbol = mapper.from_wire(&self.contract)?;
        if self.size.is_zero() {
            return Err(ExchangeError::Protocol(format!(
                "gate futures order {} has zero size",
                self.id
            )));
        }
        let side = if self.size.is_sign_positive() { Side::Buy } else { Side::Sell };
        let qty = self.size.abs();
        let left = self.left.map(|left| left.abs()).unwrap_or(qty);
        let filled_qty = (qty - left).max(Decimal::ZERO);

        let finished = self.status.as_deref() == Some("finished");
        let status = order_status(finished, None, self.finish_as.as_deref(), filled_qty);

        let price = self.price.and_then(non_zero);
        let order_type = match (price, self.tif.as_deref()) {
            (None, _) => OrderType::Market,
            (Some(_), Some("poc")) => OrderType::LimitMaker,
            (Some(_), _) => OrderType::Limit,
        };

        let timestamp = self
            .finish_time_ms
            .or(self.create_time_ms)
            .or_else(|| self.create_time.map(|secs| (secs * 1000.0).round() as i64))
            .unwrap_or_else(now_millis);

        Ok(Order {
            order_id: self.id,
            client_order_id: self.text,
            symbol,
            side,
            order_type,
            price,
            qty,
            filled_qty,
            avg_fill_price: if filled_qty.is_zero() {
                None
            } else {
                self.fill_price.and_then(non_zero)
            },
            status,
            timestamp,
        })
    }
}

/// Normalized status from Gate.io's open/finished flag and `finish_as` reason.
pub(crate) fn order_status(
    finished: bool,
    status: Option<&str>,
    finish_as: Option<&str>,
    filled_qty: Decimal,
) -> OrderStatus {
    let partially = !filled_qty.is_zero();
    if !finished {
        return if partially { OrderStatus::PartiallyFilled } else { OrderStatus::New };
    }
    match finish_as {
        Some("filled") => OrderStatus::Filled,
        None if status == Some("closed") => OrderStatus::Filled,
        Some("open") => {
            if partially { OrderStatus::PartiallyFilled } else { OrderStatus::New }
        }
        _ if partially => OrderStatus::PartiallyCancelled,
        _ => OrderStatus::Cancelled,
    }
}

pub(crate) fn parse_side(value: &str) -> Result<Side> {
    match value {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(ExchangeError::Protocol(format!("unknown gate side {other}"))),
    }
}

/// `GET /spot/accounts` entry
#[derive(Debug, Deserialize)]
pub(crate) struct SpotAccount {
    pub currency: String,
    pub available: Decimal,
    pub locked: Decimal,
}

impl From<SpotAccount> for AssetBalance {
    fn from(account: SpotAccount) -> Self {
        AssetBalance {
            asset: account.currency.to_ascii_uppercase(),
            free: account.available,
            locked: account.locked,
        }
    }
}

/// `spot.balances` entry
#[derive(Debug, Deserialize)]
pub(crate) struct SpotBalanceUpdate {
    pub currency: String,
    pub total: Decimal,
    pub available: Decimal,
}

impl From<SpotBalanceUpdate> for AssetBalance {
    fn from(update: SpotBalanceUpdate) -> Self {
        AssetBalance {
            asset: update.currency.to_ascii_uppercase(),
            free: update.available,
            locked: (update.total - update.available).max(Decimal::ZERO),
        }
    }
}

/// `GET /futures/{settle}/accounts` (a single object)
#[derive(Debug, Deserialize)]
pub(crate) struct FuturesAccount {
    pub total: Decimal,
    pub available: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

impl FuturesAccount {
    pub fn into_balance(self, settle: &str) -> AssetBalance {
        AssetBalance {
            asset: self
                .currency
                .unwrap_or_else(|| settle.to_string())
                .to_ascii_uppercase(),
            free: self.available,
            locked: (self.total - self.available).max(Decimal::ZERO),
        }
    }
}

/// `futures.balances` entry: `balance` is the settle-currency total after the change.
#[derive(Debug, Deserialize)]
pub(crate) struct FuturesBalanceUpdate {
    pub balance: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

impl FuturesBalanceUpdate {
    pub fn into_balance(self, settle: &str) -> AssetBalance {
        AssetBalance {
            asset: self
                .currency
                .unwrap_or_else(|| settle.to_string())
                .to_ascii_uppercase(),
            free: self.balance,
            locked: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SeparatorSymbolMapper;
    use crate::types::Symbol;
    use rust_decimal_macros::dec;

    #[test]
    fn spot_fill_is_amount_minus_left() {
        let order: SpotOrder = serde_json::from_str(
            r#"{"id":"12332324","text":"t-abc","create_time_ms":"1611235200123","currency_pair":"BTC_USDT","type":"limit","side":"buy","amount":"1","price":"20000","left":"0.4","filled_total":"12000","status":"open"}"#,
        )
        .unwrap();
        let order = order.into_order(&SeparatorSymbolMapper::new('_', false)).unwrap();
        assert_eq!(order.symbol, Symbol::spot("BTC", "USDT"));
        assert_eq!(order.filled_qty, dec!(0.6));
        assert_eq!(order.avg_fill_price, Some(dec!(20000)));
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.timestamp, 1611235200123);
    }

    #[test]
    fn futures_side_and_fill_come_from_signed_size() {
        let order: FuturesOrder = serde_json::from_str(
            r#"{"id":15675394,"contract":"BTC_USDT","size":-10,"left":-4,"price":"0","fill_price":"30000.5","tif":"ioc","status":"finished","finish_as":"ioc","create_time":1546569968.12}"#,
        )
        .unwrap();
        let order = order.into_order(&SeparatorSymbolMapper::new('_', true)).unwrap();
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.qty, dec!(10));
        assert_eq!(order.filled_qty, dec!(6));
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.status, OrderStatus::PartiallyCancelled);
        assert_eq!(order.avg_fill_price, Some(dec!(30000.5)));
        assert_eq!(order.timestamp, 1546569968120);
    }

    #[test]
    fn finish_reasons_resolve_status() {
        assert_eq!(order_status(true, None, Some("filled"), dec!(1)), OrderStatus::Filled);
        assert_eq!(order_status(true, Some("closed"), None, dec!(1)), OrderStatus::Filled);
        assert_eq!(order_status(true, None, Some("cancelled"), dec!(0)), OrderStatus::Cancelled);
        assert_eq!(order_status(false, None, None, dec!(0)), OrderStatus::New);
    }

    #[test]
    fn spot_balance_update_derives_locked() {
        let update: SpotBalanceUpdate = serde_json::from_str(
            r#"{"timestamp_ms":"1605248616763","currency":"usdt","change":"-1.0","total":"10.5","available":"8.5"}"#,
        )
        .unwrap();
        let balance = AssetBalance::from(update);
        assert_eq!(balance.asset, "USDT");
        assert_eq!(balance.locked, dec!(2.0));
    }
}
