/*
[INPUT]:  ExchangeContext for MEXC spot
[OUTPUT]: Public/private StrategySet, REST trading API, auth and error mapping
[POS]:    MEXC exchange - spot v3 (JSON streams, listen-key user stream)
[UPDATE]: When MEXC changes any wire contract
*/

pub mod auth;
pub mod errors;
pub mod parser;
pub mod rest;
pub mod stream;

use std::sync::Arc;

pub use auth::MexcAuth;
pub use errors::MexcExceptionMapper;
pub use parser::MexcMessageParser;
pub use rest::MexcRestApi;
pub use stream::{MexcPrivateConnection, MexcPublicConnection, MexcSubscription};

use crate::config::ExchangeConfig;
use crate::http::Result;
use crate::symbol::{ConcatSymbolMapper, SymbolMapper};
use crate::ws::{ExchangeContext, StrategySet};

pub fn symbol_mapper(config: &ExchangeConfig) -> Arc<dyn SymbolMapper> {
    Arc::new(ConcatSymbolMapper::new(config.quote_assets.iter(), false))
}

pub fn public_strategies(ctx: &ExchangeContext) -> Result<StrategySet> {
    let mapper = symbol_mapper(&ctx.config);
    Ok(StrategySet {
        connection: Arc::new(MexcPublicConnection::new(ctx.config.clone())),
        subscription: Arc::new(MexcSubscription::public(mapper.clone())),
        parser: Arc::new(MexcMessageParser::new(mapper)),
    })
}

pub fn private_strategies(ctx: &ExchangeContext) -> Result<StrategySet> {
    let mapper = symbol_mapper(&ctx.config);
    let api = MexcRestApi::new(ctx.rest.clone(), mapper.clone());
    Ok(StrategySet {
        connection: Arc::new(MexcPrivateConnection::new(ctx.config.clone(), api)),
        subscription: Arc::new(MexcSubscription::private(mapper.clone())),
        parser: Arc::new(MexcMessageParser::new(mapper)),
    })
}
