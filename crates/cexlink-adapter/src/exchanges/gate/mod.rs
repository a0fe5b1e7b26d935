/*
[INPUT]:  ExchangeContext for Gate.io spot or USDT futures
[OUTPUT]: Public/private StrategySet, REST trading API, auth and error mapping
[POS]:    Gate.io exchange - API v4 (spot and USDT-settled futures share one module)
[UPDATE]: When Gate.io changes any wire contract
*/

pub mod auth;
pub mod errors;
mod model;
pub mod parser;
pub mod rest;
pub mod stream;

use std::sync::Arc;

pub use auth::GateAuth;
pub use errors::GateExceptionMapper;
pub use parser::GateMessageParser;
pub use rest::GateRestApi;
pub use stream::{GateConnection, GateSubscription};

use crate::config::ExchangeConfig;
use crate::http::{ExchangeError, Result};
use crate::symbol::{SeparatorSymbolMapper, SymbolMapper};
use crate::types::ExchangeId;
use crate::ws::{ExchangeContext, StrategySet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMarket {
    Spot,
    Futures,
}

impl GateMarket {
    pub fn from_exchange(exchange: ExchangeId) -> Result<Self> {
        match exchange {
            ExchangeId::GateSpot => Ok(GateMarket::Spot),
            ExchangeId::GateFutures => Ok(GateMarket::Futures),
            other => Err(ExchangeError::Config(format!("{other} is not a gate market"))),
        }
    }

    pub fn exchange_id(&self) -> ExchangeId {
        match self {
            GateMarket::Spot => ExchangeId::GateSpot,
            GateMarket::Futures => ExchangeId::GateFutures,
        }
    }

    /// Fully qualified channel name, e.g. `spot.trades`.
    pub fn channel(&self, name: &str) -> String {
        match self {
            GateMarket::Spot => format!("spot.{name}"),
            GateMarket::Futures => format!("futures.{name}"),
        }
    }
}

pub fn symbol_mapper(config: &ExchangeConfig) -> Arc<dyn SymbolMapper> {
    Arc::new(SeparatorSymbolMapper::new('_', config.exchange.is_futures()))
}

pub fn public_strategies(ctx: &ExchangeContext) -> Result<StrategySet> {
    let market = GateMarket::from_exchange(ctx.config.exchange)?;
    let mapper = symbol_mapper(&ctx.config);
    Ok(StrategySet {
        connection: Arc::new(GateConnection::public(market, ctx.config.clone())),
        subscription: Arc::new(GateSubscription::public(market, mapper.clone())),
        parser: Arc::new(GateMessageParser::new(market, mapper)),
    })
}

pub fn private_strategies(ctx: &ExchangeContext) -> Result<StrategySet> {
    let market = GateMarket::from_exchange(ctx.config.exchange)?;
    let mapper = symbol_mapper(&ctx.config);
    let credentials = ctx.config.resolve_credentials()?;
    Ok(StrategySet {
        connection: Arc::new(GateConnection::private(market, ctx.config.clone())),
        subscription: Arc::new(GateSubscription::private(
            market,
            mapper.clone(),
            credentials,
            ctx.config.user_id.clone(),
        )?),
        parser: Arc::new(GateMessageParser::new(market, mapper)),
    })
}
