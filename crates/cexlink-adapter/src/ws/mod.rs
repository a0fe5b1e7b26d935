/*
[INPUT]:  Exchange strategies, socket connector, tracked symbols
[OUTPUT]: Managed streaming connections publishing ParsedMessage events
[POS]:    WebSocket layer - exchange-agnostic streaming lifecycle
[UPDATE]: When adding strategy hooks or connection lifecycle behavior
*/

pub mod connection;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod strategy;

pub use connection::{TungsteniteConnector, WsConnection, WsConnector};
pub use manager::{ConnectionManager, StreamEvent};
pub use metrics::{MetricsSnapshot, PerformanceMetrics};
pub use registry::{ExchangeContext, StrategyFactory, StrategyRegistry, StrategyRegistryBuilder, StrategySet};
pub use strategy::{
    ConnectionContext, ConnectionStrategy, MessageParser, ParseErrorCounter, SubscriptionContext,
    SubscriptionStrategy, default_should_reconnect,
};
