/*
[INPUT]:  StreamEvents from public/private ConnectionManagers
[OUTPUT]: Handler callbacks or ExchangeEvents on a bounded channel
[POS]:    Event layer - normalized event delivery to application code
[UPDATE]: When adding event kinds or delivery policies
*/

use std::fmt;

use async_trait::async_trait;
use cexlink_adapter::types::{
    AssetBalance, ConnectionState, ExchangeId, MessagePayload, Order, OrderBookDelta, ParsedMessage,
    Trade,
};
use cexlink_adapter::ws::StreamEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Public,
    Private,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Public => f.write_str("public"),
            StreamKind::Private => f.write_str("private"),
        }
    }
}

/// Callbacks invoked in stream order from the composite's forwarding tasks.
///
/// A slow handler backs up into the connection's bounded channel and
/// eventually pauses that connection's read loop.
#[async_trait]
pub trait ExchangeEventHandler: Send + Sync {
    async fn on_orderbook(&self, _exchange: ExchangeId, _book: &OrderBookDelta) {}

    async fn on_trade(&self, _exchange: ExchangeId, _trade: &Trade) {}

    async fn on_balance(&self, _exchange: ExchangeId, _balance: &AssetBalance) {}

    async fn on_order(&self, _exchange: ExchangeId, _order: &Order) {}

    async fn on_connection_state_change(&self, _exchange: ExchangeId, _stream: StreamKind, _state: ConnectionState) {}

    async fn on_error(&self, _exchange: ExchangeId, _stream: StreamKind, _code: Option<i64>, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventHandler;

impl ExchangeEventHandler for NoopEventHandler {}

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    Orderbook {
        exchange: ExchangeId,
        book: OrderBookDelta,
    },
    Trade {
        exchange: ExchangeId,
        trade: Trade,
    },
    Balance {
        exchange: ExchangeId,
        balance: AssetBalance,
    },
    Order {
        exchange: ExchangeId,
        order: Order,
    },
    ConnectionState {
        exchange: ExchangeId,
        stream: StreamKind,
        state: ConnectionState,
    },
    Error {
        exchange: ExchangeId,
        stream: StreamKind,
        code: Option<i64>,
        message: String,
    },
}

/// Forwards every callback into a bounded channel (full channel blocks).
#[derive(Debug, Clone)]
pub struct ChannelEventHandler {
    tx: mpsc::Sender<ExchangeEvent>,
}

impl ChannelEventHandler {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ExchangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn emit(&self, event: ExchangeEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }
}

#[async_trait]
impl ExchangeEventHandler for ChannelEventHandler {
    async fn on_orderbook(&self, exchange: ExchangeId, book: &OrderBookDelta) {
        self.emit(ExchangeEvent::Orderbook {
            exchange,
            book: book.clone(),
        })
        .await;
    }

    async fn on_trade(&self, exchange: ExchangeId, trade: &Trade) {
        self.emit(ExchangeEvent::Trade {
            exchange,
            trade: trade.clone(),
        })
        .await;
    }

    async fn on_balance(&self, exchange: ExchangeId, balance: &AssetBalance) {
        self.emit(ExchangeEvent::Balance {
            exchange,
            balance: balance.clone(),
        })
        .await;
    }

    async fn on_order(&self, exchange: ExchangeId, order: &Order) {
        self.emit(ExchangeEvent::Order {
            exchange,
            order: order.clone(),
        })
        .await;
    }

    async fn on_connection_state_change(&self, exchange: ExchangeId, stream: StreamKind, state: ConnectionState) {
        self.emit(ExchangeEvent::ConnectionState {
            exchange,
            stream,
            state,
        })
        .await;
    }

    async fn on_error(&self, exchange: ExchangeId, stream: StreamKind, code: Option<i64>, message: &str) {
        self.emit(ExchangeEvent::Error {
            exchange,
            stream,
            code,
            message: message.to_string(),
        })
        .await;
    }
}

/// Route one stream event to the matching handler callbacks.
pub async fn dispatch(
    handler: &dyn ExchangeEventHandler,
    exchange: ExchangeId,
    stream: StreamKind,
    event: &StreamEvent,
) {
    match event {
        StreamEvent::StateChanged(state) => {
            handler.on_connection_state_change(exchange, stream, *state).await
        }
        StreamEvent::Message(message) => dispatch_message(handler, exchange, stream, message).await,
    }
}

async fn dispatch_message(
    handler: &dyn ExchangeEventHandler,
    exchange: ExchangeId,
    stream: StreamKind,
    message: &ParsedMessage,
) {
    match &message.payload {
        MessagePayload::Orderbook(book) => handler.on_orderbook(exchange, book).await,
        MessagePayload::Trades(trades) => {
            for trade in trades {
                handler.on_trade(exchange, trade).await;
            }
        }
        MessagePayload::Balances(balances) => {
            for balance in balances {
                handler.on_balance(exchange, balance).await;
            }
        }
        MessagePayload::Orders(orders) => {
            for order in orders {
                handler.on_order(exchange, order).await;
            }
        }
        MessagePayload::Error { code, message: text } => {
            warn!(%exchange, %stream, ?code, message = %text, "exchange stream error");
            handler.on_error(exchange, stream, *code, text).await;
        }
        MessagePayload::Heartbeat | MessagePayload::SubscriptionConfirm | MessagePayload::Unknown => {}
    }
}
