/*
[INPUT]:  ExchangeConfig per configured exchange
[OUTPUT]: Strategy registry, REST transports and trading APIs for built-in exchanges
[POS]:    Exchange layer - startup wiring for MEXC spot and Gate.io spot/futures
[UPDATE]: When onboarding a new exchange (add its module and register it here)
*/

pub mod gate;
pub mod mexc;
pub mod wire;

use std::sync::Arc;

use tracing::debug;

use crate::auth::{ApiCredentials, AuthStrategy};
use crate::config::ExchangeConfig;
use crate::http::{ExceptionMapper, RateLimiter, RestTransport, Result};
use crate::symbol::SymbolMapper;
use crate::trading::TradingApi;
use crate::types::ExchangeId;
use crate::ws::{ExchangeContext, StrategyRegistry};

/// Registry with every built-in (exchange, public/private) stream.
pub fn builtin_registry() -> StrategyRegistry {
    StrategyRegistry::builder()
        .register(ExchangeId::MexcSpot, false, mexc::public_strategies)
        .register(ExchangeId::MexcSpot, true, mexc::private_strategies)
        .register(ExchangeId::GateSpot, false, gate::public_strategies)
        .register(ExchangeId::GateSpot, true, gate::private_strategies)
        .register(ExchangeId::GateFutures, false, gate::public_strategies)
        .register(ExchangeId::GateFutures, true, gate::private_strategies)
        .build()
}

pub fn symbol_mapper(config: &ExchangeConfig) -> Arc<dyn SymbolMapper> {
    match config.exchange {
        ExchangeId::MexcSpot => mexc::symbol_mapper(config),
        ExchangeId::GateSpot | ExchangeId::GateFutures => gate::symbol_mapper(config),
    }
}

pub fn exception_mapper(exchange: ExchangeId) -> Arc<dyn ExceptionMapper> {
    match exchange {
        ExchangeId::MexcSpot => Arc::new(mexc::MexcExceptionMapper),
        ExchangeId::GateSpot | ExchangeId::GateFutures => Arc::new(gate::GateExceptionMapper),
    }
}

fn auth_strategy(config: &ExchangeConfig, credentials: ApiCredentials) -> Arc<dyn AuthStrategy> {
    match config.exchange {
        ExchangeId::MexcSpot => Arc::new(mexc::MexcAuth::new(credentials, config.recv_window_ms)),
        ExchangeId::GateSpot | ExchangeId::GateFutures => Arc::new(gate::GateAuth::new(credentials)),
    }
}

/// REST pipeline for `config`; signed requests fail with an authentication
/// error when `credentials` is `None`.
pub fn rest_transport(config: &ExchangeConfig, credentials: Option<ApiCredentials>) -> Result<RestTransport> {
    let limiter = Arc::new(RateLimiter::new(&config.rate_limits));
    let transport = RestTransport::new(
        &config.rest_url,
        config.client_config(),
        limiter,
        config.retry.clone(),
        exception_mapper(config.exchange),
    )?;
    debug!(
        exchange = %config.exchange,
        base_url = %config.rest_url,
        signed = credentials.is_some(),
        "rest transport created"
    );
    Ok(match credentials {
        Some(credentials) => transport.with_auth(auth_strategy(config, credentials)),
        None => transport,
    })
}

pub fn trading_api(ctx: &ExchangeContext) -> Result<Arc<dyn TradingApi>> {
    let mapper = symbol_mapper(&ctx.config);
    Ok(match ctx.config.exchange {
        ExchangeId::MexcSpot => Arc::new(mexc::MexcRestApi::new(ctx.rest.clone(), mapper)),
        exchange @ (ExchangeId::GateSpot | ExchangeId::GateFutures) => Arc::new(gate::GateRestApi::new(
            gate::GateMarket::from_exchange(exchange)?,
            ctx.rest.clone(),
            mapper,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_every_stream() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), 6);
        for exchange in [ExchangeId::MexcSpot, ExchangeId::GateSpot, ExchangeId::GateFutures] {
            assert!(registry.contains(exchange, false));
            assert!(registry.contains(exchange, true));
        }
    }

    #[test]
    fn public_strategies_build_without_credentials() {
        let registry = builtin_registry();
        for exchange in [ExchangeId::MexcSpot, ExchangeId::GateSpot, ExchangeId::GateFutures] {
            let config = ExchangeConfig::defaults_for(exchange);
            let ctx = ExchangeContext {
                rest: Arc::new(rest_transport(&config, None).unwrap()),
                config: Arc::new(config),
            };
            assert!(registry.create(exchange, false, &ctx).is_ok());
            assert_eq!(trading_api(&ctx).unwrap().exchange(), exchange);
        }
    }

    #[test]
    fn gate_futures_private_stream_needs_user_id() {
        let config = ExchangeConfig::defaults_for(ExchangeId::GateFutures)
            .with_credentials(ApiCredentials::new("key", "secret"));
        let ctx = ExchangeContext {
            rest: Arc::new(rest_transport(&config, None).unwrap()),
            config: Arc::new(config),
        };
        let err = builtin_registry()
            .create(ExchangeId::GateFutures, true, &ctx)
            .unwrap_err();
        assert!(matches!(err, crate::http::ExchangeError::Config(_)));
    }
}
