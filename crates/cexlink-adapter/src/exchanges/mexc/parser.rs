/*
[INPUT]:  Raw MEXC spot v3 JSON frames
[OUTPUT]: ParsedMessage (depth, deals, orders, account, pong, acks, errors)
[POS]:    MEXC exchange - inbound frame decoder
[UPDATE]: When MEXC changes channel payloads
*/

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::stream::{ACCOUNT_CHANNEL, DEALS_CHANNEL, DEPTH_CHANNEL, ORDERS_CHANNEL};
use crate::exchanges::wire::{decode, non_zero, opt_string_or_number, string_or_number};
use crate::http::{ExchangeError, Result};
use crate::symbol::SymbolMapper;
use crate::types::{
    AssetBalance, InboundFrame, MessagePayload, Order, OrderBookDelta, OrderStatus, OrderType,
    ParsedMessage, PriceLevel, Side, Symbol, Trade, now_millis,
};
use crate::ws::{MessageParser, ParseErrorCounter};

const SNAPSHOT_DEPTH_CHANNEL: &str = "spot@public.limit.depth.v3.api";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    c: Option<String>,
    #[serde(default)]
    d: Option<Value>,
    #[serde(default)]
    s: Option<String>,
    #[serde(default)]
    t: Option<i64>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Depth {
    #[serde(default)]
    asks: Vec<Level>,
    #[serde(default)]
    bids: Vec<Level>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    r: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Level {
    p: Decimal,
    v: Decimal,
}

#[derive(Debug, Deserialize)]
struct Deals {
    #[serde(default)]
    deals: Vec<Deal>,
}

#[derive(Debug, Deserialize)]
struct Deal {
    #[serde(rename = "S")]
    side: u8,
    p: Decimal,
    v: Decimal,
    t: i64,
}

#[derive(Debug, Deserialize)]
struct OrderEvent {
    #[serde(rename = "i", deserialize_with = "string_or_number")]
    order_id: String,
    #[serde(rename = "c", default, deserialize_with = "opt_string_or_number")]
    client_order_id: Option<String>,
    #[serde(rename = "p", default)]
    price: Decimal,
    #[serde(rename = "v", default)]
    qty: Decimal,
    #[serde(rename = "S")]
    side: u8,
    #[serde(rename = "o", default)]
    order_type: u8,
    #[serde(rename = "s")]
    status: u8,
    /// Cumulative filled quantity
    #[serde(rename = "cv", default)]
    cumulative_qty: Decimal,
    #[serde(rename = "ap", default)]
    avg_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct AccountEvent {
    #[serde(rename = "a")]
    asset: String,
    #[serde(rename = "f")]
    free: Decimal,
    #[serde(rename = "l")]
    locked: Decimal,
}

#[derive(Debug)]
pub struct MexcMessageParser {
    mapper: Arc<dyn SymbolMapper>,
    errors: ParseErrorCounter,
}

impl MexcMessageParser {
    pub fn new(mapper: Arc<dyn SymbolMapper>) -> Self {
        Self {
            mapper,
            errors: ParseErrorCounter::new(),
        }
    }

    fn parse_text(&self, text: &str) -> Result<ParsedMessage> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|err| ExchangeError::Protocol(format!("invalid json: {err}")))?;

        if let Some(channel) = envelope.c {
            return self.parse_channel(channel, envelope.d, envelope.s, envelope.t);
        }

        match envelope.msg {
            Some(msg) if msg.eq_ignore_ascii_case("PONG") => {
                Ok(ParsedMessage::new(MessagePayload::Heartbeat))
            }
            Some(msg) if envelope.code == Some(0) => {
                Ok(ParsedMessage::new(MessagePayload::SubscriptionConfirm).with_channel(msg))
            }
            Some(msg) => Ok(ParsedMessage::new(MessagePayload::Error {
                code: envelope.code,
                message: msg,
            })
            .with_raw(text)),
            None => Ok(ParsedMessage::unknown().with_raw(text)),
        }
    }

    fn parse_channel(
        &self,
        channel: String,
        data: Option<Value>,
        wire_symbol: Option<String>,
        timestamp: Option<i64>,
    ) -> Result<ParsedMessage> {
        let mut parts = channel.splitn(3, '@');
        let topic = match (parts.next(), parts.next()) {
            (Some(market), Some(kind)) => format!("{market}@{kind}"),
            _ => return Ok(ParsedMessage::unknown().with_channel(channel)),
        };
        let wire_symbol = parts.next().map(str::to_string).or(wire_symbol);
        let data = data.ok_or_else(|| ExchangeError::Protocol(format!("{channel} without data")))?;
        let event_time = timestamp.unwrap_or_else(now_millis);

        let payload = match topic.as_str() {
            DEPTH_CHANNEL | SNAPSHOT_DEPTH_CHANNEL => {
                let symbol = self.symbol(wire_symbol.as_deref())?;
                let depth: Depth = decode(data, "mexc depth")?;
                let update_id = depth.r.as_deref().and_then(|r| r.parse::<u64>().ok());
                MessagePayload::Orderbook(OrderBookDelta {
                    symbol: symbol.clone(),
                    bids: depth.bids.into_iter().map(|l| PriceLevel::new(l.p, l.v)).collect(),
                    asks: depth.asks.into_iter().map(|l| PriceLevel::new(l.p, l.v)).collect(),
                    is_snapshot: topic == SNAPSHOT_DEPTH_CHANNEL,
                    first_update_id: update_id,
                    last_update_id: update_id,
                    timestamp: event_time,
                })
            }
            DEALS_CHANNEL => {
                let symbol = self.symbol(wire_symbol.as_deref())?;
                let deals: Deals = decode(data, "mexc deals")?;
                let trades = deals
                    .deals
                    .into_iter()
                    .map(|deal| {
                        Ok(Trade {
                            symbol: symbol.clone(),
                            side: side_from_code(deal.side)?,
                            price: deal.p,
                            qty: deal.v,
                            timestamp: deal.t,
                            trade_id: None,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                MessagePayload::Trades(trades)
            }
            ORDERS_CHANNEL => {
                let symbol = self.symbol(wire_symbol.as_deref())?;
                let event: OrderEvent = decode(data, "mexc order")?;
                MessagePayload::Orders(vec![order_from_event(event, symbol, event_time)?])
            }
            ACCOUNT_CHANNEL => {
                let event: AccountEvent = decode(data, "mexc account")?;
                let asset = event.asset.to_ascii_uppercase();
                MessagePayload::Balances(vec![AssetBalance {
                    asset,
                    free: event.free,
                    locked: event.locked,
                }])
            }
            _ => MessagePayload::Unknown,
        };

        let mut message = ParsedMessage::new(payload)
            .with_channel(topic)
            .with_timestamp(timestamp);
        if let Some(wire) = wire_symbol.as_deref() {
            if let Ok(symbol) = self.mapper.from_wire(wire) {
                message = message.with_symbol(symbol);
            }
        }
        Ok(message)
    }

    fn symbol(&self, wire: Option<&str>) -> Result<Symbol> {
        let wire = wire.ok_or_else(|| ExchangeError::Protocol("missing symbol".to_string()))?;
        self.mapper.from_wire(wire)
    }
}

impl MessageParser for MexcMessageParser {
    fn parse_message(&self, frame: &InboundFrame) -> ParsedMessage {
        if matches!(frame, InboundFrame::Pong) {
            return ParsedMessage::new(MessagePayload::Heartbeat);
        }
        // Protobuf (`.pb`) channels are never subscribed; such frames are
        // unsupported rather than malformed.
        let Some(text) = frame.as_text() else {
            debug!(bytes = frame.len(), "mexc binary frame ignored");
            return ParsedMessage::unknown();
        };
        match self.parse_text(text) {
            Ok(message) => message,
            Err(err) => self.errors.record("mexc", &err, text),
        }
    }

    fn error_count(&self) -> u64 {
        self.errors.get()
    }
}

fn side_from_code(code: u8) -> Result<Side> {
    match code {
        1 => Ok(Side::Buy),
        2 => Ok(Side::Sell),
        other => Err(ExchangeError::Protocol(format!("unknown mexc trade side {other}"))),
    }
}

fn order_from_event(event: OrderEvent, symbol: Symbol, timestamp: i64) -> Result<Order> {
    let status = match event.status {
        1 => OrderStatus::New,
        2 => OrderStatus::Filled,
        3 => OrderStatus::PartiallyFilled,
        4 => OrderStatus::Cancelled,
        5 => OrderStatus::PartiallyCancelled,
        _ => OrderStatus::Unknown,
    };
    let order_type = match event.order_type {
        2 => OrderType::LimitMaker,
        5 => OrderType::Market,
        _ => OrderType::Limit,
    };

    Ok(Order {
        order_id: event.order_id,
        client_order_id: event.client_order_id,
        symbol,
        side: side_from_code(event.side)?,
        order_type,
        price: non_zero(event.price),
        qty: event.qty,
        filled_qty: event.cumulative_qty,
        avg_fill_price: non_zero(event.avg_price),
        status,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::ConcatSymbolMapper;
    use crate::types::MessageType;
    use rust_decimal_macros::dec;

    fn parser() -> MexcMessageParser {
        MexcMessageParser::new(Arc::new(ConcatSymbolMapper::new(["USDT"], false)))
    }

    fn text(value: &str) -> InboundFrame {
        InboundFrame::Text(value.to_string())
    }

    #[test]
    fn parses_incremental_depth() {
        let msg = parser().parse_message(&text(
            r#"{"c":"spot@public.increase.depth.v3.api@BTCUSDT","d":{"asks":[{"p":"20290.89","v":"0.000000"}],"bids":[{"p":"20280.01","v":"1.5"}],"e":"spot@public.increase.depth.v3.api","r":"3407459756"},"s":"BTCUSDT","t":1661932660144}"#,
        ));
        let MessagePayload::Orderbook(book) = msg.payload else {
            panic!("expected orderbook");
        };
        assert_eq!(book.symbol, Symbol::spot("BTC", "USDT"));
        assert!(!book.is_snapshot);
        assert_eq!(book.last_update_id, Some(3407459756));
        assert_eq!(book.asks[0].qty, dec!(0));
        assert_eq!(book.bids[0], PriceLevel::new(dec!(20280.01), dec!(1.5)));
        assert_eq!(msg.timestamp, 1661932660144);
    }

    #[test]
    fn parses_deals_with_side_codes() {
        let msg = parser().parse_message(&text(
            r#"{"c":"spot@public.deals.v3.api@BTCUSDT","d":{"deals":[{"S":1,"p":"20233.84","t":1661927587825,"v":"0.001028"},{"S":2,"p":"20233.80","t":1661927587826,"v":"0.5"}],"e":"spot@public.deals.v3.api"},"s":"BTCUSDT","t":1661927587836}"#,
        ));
        let MessagePayload::Trades(trades) = msg.payload else {
            panic!("expected trades");
        };
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[1].side, Side::Sell);
        assert_eq!(trades[1].qty, dec!(0.5));
    }

    #[test]
    fn parses_private_order_with_numeric_fields() {
        let msg = parser().parse_message(&text(
            r#"{"c":"spot@private.orders.v3.api","d":{"A":8.0,"O":1661938138000,"S":1,"V":10,"a":8,"c":"cli-1","i":"e03a5c7441e44ed899466a7140b71391","m":0,"o":1,"p":0.8,"s":3,"v":10,"ap":0.8,"cv":4,"ca":3.2},"s":"MXUSDT","t":1661938138193}"#,
        ));
        let MessagePayload::Orders(orders) = msg.payload else {
            panic!("expected order");
        };
        let order = &orders[0];
        assert_eq!(order.symbol, Symbol::spot("MX", "USDT"));
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_qty, dec!(4));
        assert_eq!(order.avg_fill_price, Some(dec!(0.8)));
        assert_eq!(order.client_order_id.as_deref(), Some("cli-1"));
    }

    #[test]
    fn parses_account_update() {
        let msg = parser().parse_message(&text(
            r#"{"c":"spot@private.account.v3.api","d":{"a":"usdt","c":1678185928428,"f":"302.18","fd":"-4.99","l":"4.99","ld":"4.99","o":"ENTRUST_PLACE"},"t":1678185928435}"#,
        ));
        let MessagePayload::Balances(balances) = msg.payload else {
            panic!("expected balances");
        };
        assert_eq!(balances[0].asset, "USDT");
        assert_eq!(balances[0].total(), dec!(307.17));
    }

    #[test]
    fn control_frames_classify() {
        let p = parser();
        assert_eq!(
            p.parse_message(&text(r#"{"id":0,"code":0,"msg":"PONG"}"#)).message_type(),
            MessageType::Heartbeat
        );
        assert_eq!(
            p.parse_message(&text(r#"{"id":0,"code":0,"msg":"spot@public.deals.v3.api@BTCUSDT"}"#))
                .message_type(),
            MessageType::SubscriptionConfirm
        );
        let err = p.parse_message(&text(r#"{"id":0,"code":1,"msg":"Not Subscribed successfully!"}"#));
        assert_eq!(err.message_type(), MessageType::Error);
        assert_eq!(p.error_count(), 0);
    }

    #[test]
    fn malformed_frames_become_unknown_and_count() {
        let p = parser();
        let msg = p.parse_message(&text("{\"c\":"));
        assert_eq!(msg.message_type(), MessageType::Unknown);
        assert_eq!(p.error_count(), 1);

        let msg = p.parse_message(&text(r#"{"c":"spot@public.deals.v3.api@BTCUSDT","d":{"deals":[{"S":9,"p":"1","t":1,"v":"1"}]}}"#));
        assert_eq!(msg.message_type(), MessageType::Unknown);
        assert_eq!(p.error_count(), 2);

    }

    #[test]
    fn protobuf_frames_are_unknown_without_error() {
        let p = parser();
        let msg = p.parse_message(&InboundFrame::Binary(vec![0x0a, 0x8f, 0xff, 0x12]));
        assert_eq!(msg.message_type(), MessageType::Unknown);
        assert_eq!(p.error_count(), 0);

        // UTF-8 binary frames still decode as JSON.
        let msg = p.parse_message(&InboundFrame::Binary(br#"{"c":"spot@public.kline.v3.api@BTCUSDT@Min1","d":{},"s":"BTCUSDT","t":1}"#.to_vec()));
        assert_eq!(msg.message_type(), MessageType::Unknown);
        assert_eq!(p.error_count(), 0);
    }

    #[test]
    fn unrecognized_channels_are_unknown_without_error() {
        let p = parser();
        let msg = p.parse_message(&text(r#"{"c":"spot@public.kline.v3.api@BTCUSDT@Min1","d":{},"s":"BTCUSDT","t":1}"#));
        assert_eq!(msg.message_type(), MessageType::Unknown);
        assert_eq!(p.error_count(), 0);
    }
}
