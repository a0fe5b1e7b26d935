/*
[INPUT]:  Raw inbound WebSocket frames and per-exchange decode results
[OUTPUT]: Normalized ParsedMessage values consumed by the connection manager
[POS]:    Data layer - normalized decoded form of one inbound frame
[UPDATE]: When adding new message kinds or payload shapes
*/

use serde::{Deserialize, Serialize};

use super::models::{AssetBalance, Order, OrderBookDelta, Trade};
use super::symbol::Symbol;

/// One inbound frame as read from the socket, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Pong,
}

impl InboundFrame {
    pub fn len(&self) -> usize {
        match self {
            InboundFrame::Text(text) => text.len(),
            InboundFrame::Binary(bytes) => bytes.len(),
            InboundFrame::Pong => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the frame as UTF-8 text; binary frames are accepted when valid.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InboundFrame::Text(text) => Some(text.as_str()),
            InboundFrame::Binary(bytes) => std::str::from_utf8(bytes).ok(),
            InboundFrame::Pong => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Orderbook,
    Trade,
    Balance,
    Order,
    Heartbeat,
    Error,
    SubscriptionConfirm,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Orderbook(OrderBookDelta),
    Trades(Vec<Trade>),
    Balances(Vec<AssetBalance>),
    Orders(Vec<Order>),
    Heartbeat,
    Error { code: Option<i64>, message: String },
    SubscriptionConfirm,
    Unknown,
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Orderbook(_) => MessageType::Orderbook,
            MessagePayload::Trades(_) => MessageType::Trade,
            MessagePayload::Balances(_) => MessageType::Balance,
            MessagePayload::Orders(_) => MessageType::Order,
            MessagePayload::Heartbeat => MessageType::Heartbeat,
            MessagePayload::Error { .. } => MessageType::Error,
            MessagePayload::SubscriptionConfirm => MessageType::SubscriptionConfirm,
            MessagePayload::Unknown => MessageType::Unknown,
        }
    }
}

/// Normalized decoded form of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub symbol: Option<Symbol>,
    pub channel: Option<String>,
    pub payload: MessagePayload,
    /// Exchange event time in milliseconds, or arrival time when absent.
    pub timestamp: i64,
    pub raw: Option<String>,
}

impl ParsedMessage {
    pub fn new(payload: MessagePayload) -> Self {
        Self {
            symbol: None,
            channel: None,
            payload,
            timestamp: now_millis(),
            raw: None,
        }
    }

    pub fn unknown() -> Self {
        Self::new(MessagePayload::Unknown)
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Override the arrival timestamp with the exchange event time when present.
    pub fn with_timestamp(mut self, timestamp: Option<i64>) -> Self {
        if let Some(ts) = timestamp {
            self.timestamp = ts;
        }
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
