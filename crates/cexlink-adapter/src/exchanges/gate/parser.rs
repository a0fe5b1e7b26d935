/*
[INPUT]:  Raw Gate.io WebSocket v4 frames (spot or USDT futures)
[OUTPUT]: ParsedMessage (book updates, trades, orders, balances, pong, acks, errors)
[POS]:    Gate.io exchange - inbound frame decoder
[UPDATE]: When Gate.io changes channel payloads
*/

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::GateMarket;
use super::model::{FuturesBalanceUpdate, FuturesOrder, SpotBalanceUpdate, SpotOrder};
use super::rest::FUTURES_SETTLE;
use super::stream::{BALANCES_CHANNEL, ORDERS_CHANNEL, ORDER_BOOK_CHANNEL, TRADES_CHANNEL};
use crate::exchanges::wire::{decode, opt_millis, opt_string_or_number};
use crate::http::{ExchangeError, Result};
use crate::symbol::SymbolMapper;
use crate::types::{
    AssetBalance, InboundFrame, MessagePayload, OrderBookDelta, ParsedMessage, PriceLevel, Side,
    Trade, now_millis,
};
use crate::ws::{MessageParser, ParseErrorCounter};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    time_ms: Option<i64>,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    error: Option<WsError>,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct WsError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BookUpdate {
    #[serde(default)]
    t: Option<i64>,
    s: String,
    #[serde(rename = "U", default)]
    first_id: Option<u64>,
    #[serde(rename = "u", default)]
    last_id: Option<u64>,
    #[serde(default)]
    b: Vec<WireLevel>,
    #[serde(default)]
    a: Vec<WireLevel>,
    /// Spot sends `full: true` when the update replaces the whole book
    #[serde(default)]
    full: bool,
}

/// Spot levels are `["price", "amount"]`, futures levels are `{"p": .., "s": ..}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireLevel {
    Pair(Decimal, Decimal),
    Object { p: Decimal, s: Decimal },
}

impl From<WireLevel> for PriceLevel {
    fn from(level: WireLevel) -> Self {
        match level {
            WireLevel::Pair(price, qty) | WireLevel::Object { p: price, s: qty } => {
                PriceLevel::new(price, qty)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpotTrade {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    id: Option<String>,
    #[serde(default, deserialize_with = "opt_millis")]
    create_time_ms: Option<i64>,
    side: String,
    currency_pair: String,
    amount: Decimal,
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct FuturesTrade {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    id: Option<String>,
    #[serde(default, deserialize_with = "opt_millis")]
    create_time_ms: Option<i64>,
    contract: String,
    size: Decimal,
    price: Decimal,
}

/// Spot trades arrive one per frame, futures trades batched.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug)]
pub struct GateMessageParser {
    market: GateMarket,
    mapper: Arc<dyn SymbolMapper>,
    errors: ParseErrorCounter,
}

impl GateMessageParser {
    pub fn new(market: GateMarket, mapper: Arc<dyn SymbolMapper>) -> Self {
        Self {
            market,
            mapper,
            errors: ParseErrorCounter::new(),
        }
    }

    fn parse_text(&self, text: &str) -> Result<ParsedMessage> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|err| ExchangeError::Protocol(format!("invalid json: {err}")))?;
        let timestamp = envelope.time_ms.or(envelope.time.map(|secs| secs * 1000));

        if let Some(error) = envelope.error {
            return Ok(ParsedMessage::new(MessagePayload::Error {
                code: Some(error.code),
                message: error.message,
            })
            .with_channel(envelope.channel)
            .with_timestamp(timestamp)
            .with_raw(text));
        }

        let Some((_, topic)) = envelope.channel.split_once('.') else {
            return Ok(ParsedMessage::unknown().with_raw(text));
        };
        if topic == "pong" {
            return Ok(ParsedMessage::new(MessagePayload::Heartbeat).with_timestamp(timestamp));
        }

        let payload = match (envelope.event.as_str(), topic) {
            ("subscribe" | "unsubscribe", _) => MessagePayload::SubscriptionConfirm,
            ("update" | "all", ORDER_BOOK_CHANNEL) => self.parse_book(envelope.result, timestamp)?,
            ("update" | "all", TRADES_CHANNEL) => self.parse_trades(envelope.result)?,
            ("update" | "all", ORDERS_CHANNEL) => self.parse_orders(envelope.result)?,
            ("update" | "all", BALANCES_CHANNEL) => self.parse_balances(envelope.result)?,
            _ => MessagePayload::Unknown,
        };

        let symbol = match &payload {
            MessagePayload::Orderbook(book) => Some(book.symbol.clone()),
            MessagePayload::Trades(trades) => trades.first().map(|trade| trade.symbol.clone()),
            MessagePayload::Orders(orders) => orders.first().map(|order| order.symbol.clone()),
            _ => None,
        };
        let mut message = ParsedMessage::new(payload)
            .with_channel(envelope.channel)
            .with_timestamp(timestamp);
        if let Some(symbol) = symbol {
            message = message.with_symbol(symbol);
        }
        Ok(message)
    }

    fn parse_book(&self, result: Value, timestamp: Option<i64>) -> Result<MessagePayload> {
        let update: BookUpdate = decode(result, "gate order book update")?;
        Ok(MessagePayload::Orderbook(OrderBookDelta {
            symbol: self.mapper.from_wire(&update.s)?,
            bids: update.b.into_iter().map(PriceLevel::from).collect(),
            asks: update.a.into_iter().map(PriceLevel::from).collect(),
            is_snapshot: update.full,
            first_update_id: update.first_id,
            last_update_id: update.last_id,
            timestamp: update.t.or(timestamp).unwrap_or_else(now_millis),
        }))
    }

    fn parse_trades(&self, result: Value) -> Result<MessagePayload> {
        let trades = match self.market {
            GateMarket::Spot => decode::<OneOrMany<SpotTrade>>(result, "gate spot trades")?
                .into_vec()
                .into_iter()
                .map(|trade| {
                    Ok(Trade {
                        symbol: self.mapper.from_wire(&trade.currency_pair)?,
                        side: super::model::parse_side(&trade.side)?,
                        price: trade.price,
                        qty: trade.amount,
                        timestamp: trade.create_time_ms.unwrap_or_else(now_millis),
                        trade_id: trade.id,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            GateMarket::Futures => decode::<OneOrMany<FuturesTrade>>(result, "gate futures trades")?
                .into_vec()
                .into_iter()
                .map(|trade| {
                    // Taker direction is the sign of size
                    let side = if trade.size.is_sign_negative() { Side::Sell } else { Side::Buy };
                    Ok(Trade {
                        symbol: self.mapper.from_wire(&trade.contract)?,
                        side,
                        price: trade.price,
                        qty: trade.size.abs(),
                        timestamp: trade.create_time_ms.unwrap_or_else(now_millis),
                        trade_id: trade.id,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(MessagePayload::Trades(trades))
    }

    fn parse_orders(&self, result: Value) -> Result<MessagePayload> {
        let mapper = self.mapper.as_ref();
        let orders = match self.market {
            GateMarket::Spot => decode::<OneOrMany<SpotOrder>>(result, "gate spot orders")?
                .into_vec()
                .into_iter()
                .map(|order| order.into_order(mapper))
                .collect::<Result<Vec<_>>>()?,
            GateMarket::Futures => decode::<OneOrMany<FuturesOrder>>(result, "gate futures orders")?
                .into_vec()
                .into_iter()
                .map(|order| order.into_order(mapper))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(MessagePayload::Orders(orders))
    }

    fn parse_balances(&self, result: Value) -> Result<MessagePayload> {
        let balances: Vec<AssetBalance> = match self.market {
            GateMarket::Spot => decode::<Vec<SpotBalanceUpdate>>(result, "gate spot balances")?
                .into_iter()
                .map(AssetBalance::from)
                .collect(),
            GateMarket::Futures => decode::<Vec<FuturesBalanceUpdate>>(result, "gate futures balances")?
                .into_iter()
                .map(|update| update.into_balance(FUTURES_SETTLE))
                .collect(),
        };
        Ok(MessagePayload::Balances(balances))
    }
}

impl MessageParser for GateMessageParser {
    fn parse_message(&self, frame: &InboundFrame) -> ParsedMessage {
        if matches!(frame, InboundFrame::Pong) {
            return ParsedMessage::new(MessagePayload::Heartbeat);
        }
        let Some(text) = frame.as_text() else {
            return self.errors.record("gate", &"binary frame is not utf-8", "<binary>");
        };
        match self.parse_text(text) {
            Ok(message) => message,
            Err(err) => self.errors.record("gate", &err, text),
        }
    }

    fn error_count(&self) -> u64 {
        self.errors.get()
    }
}
