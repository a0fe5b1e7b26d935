/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public cexlink adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod config;
pub mod exchanges;
pub mod http;
pub mod symbol;
pub mod trading;
pub mod types;
pub mod ws;

// Re-export commonly used types from auth
pub use auth::{ApiCredentials, AuthStrategy, SignableRequest};

pub use config::{ExchangeConfig, ReconnectPolicy};

pub use exchanges::{builtin_registry, rest_transport, trading_api};

// Re-export commonly used types from http
pub use http::{
    ClientConfig,
    ExceptionMapper,
    ExchangeError,
    RateLimitConfig,
    RateLimitContext,
    RateLimiter,
    RestRequest,
    RestTransport,
    Result,
    RetryPolicy,
};

pub use symbol::{ConcatSymbolMapper, SeparatorSymbolMapper, SymbolMapper};

pub use trading::TradingApi;

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ConnectionContext,
    ConnectionManager,
    ConnectionStrategy,
    ExchangeContext,
    MessageParser,
    MetricsSnapshot,
    StrategyRegistry,
    StrategySet,
    StreamEvent,
    SubscriptionContext,
    SubscriptionStrategy,
    TungsteniteConnector,
    WsConnector,
};
