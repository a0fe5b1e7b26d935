/*
[INPUT]:  Explicit (exchange, is_private) -> factory registrations at startup
[OUTPUT]: StrategySet (connection + subscription + parser) per stream
[POS]:    WebSocket layer - write-once strategy lookup table
[UPDATE]: When onboarding a new exchange or stream kind
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::strategy::{ConnectionStrategy, MessageParser, SubscriptionStrategy};
use crate::config::ExchangeConfig;
use crate::http::{ExchangeError, RestTransport, Result};
use crate::types::ExchangeId;

/// Shared inputs every strategy factory receives.
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    pub config: Arc<ExchangeConfig>,
    pub rest: Arc<RestTransport>,
}

/// The three per-stream roles driven by one ConnectionManager.
#[derive(Debug, Clone)]
pub struct StrategySet {
    pub connection: Arc<dyn ConnectionStrategy>,
    pub subscription: Arc<dyn SubscriptionStrategy>,
    pub parser: Arc<dyn MessageParser>,
}

pub type StrategyFactory = fn(&ExchangeContext) -> Result<StrategySet>;

/// Read-only once built; pass it by reference to whoever creates streams.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: HashMap<(ExchangeId, bool), StrategyFactory>,
}

impl StrategyRegistry {
    pub fn builder() -> StrategyRegistryBuilder {
        StrategyRegistryBuilder::default()
    }

    pub fn contains(&self, exchange: ExchangeId, is_private: bool) -> bool {
        self.factories.contains_key(&(exchange, is_private))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn create(&self, exchange: ExchangeId, is_private: bool, ctx: &ExchangeContext) -> Result<StrategySet> {
        let factory = self.factories.get(&(exchange, is_private)).ok_or_else(|| {
            ExchangeError::Config(format!(
                "no {} strategy registered for {exchange}",
                if is_private { "private" } else { "public" }
            ))
        })?;
        factory(ctx)
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.factories.keys().collect();
        keys.sort_by_key(|(exchange, private)| (exchange.as_str(), *private));
        f.debug_struct("StrategyRegistry").field("streams", &keys).finish()
    }
}

#[derive(Default)]
pub struct StrategyRegistryBuilder {
    factories: HashMap<(ExchangeId, bool), StrategyFactory>,
}

impl StrategyRegistryBuilder {
    /// Later registrations for the same key replace earlier ones.
    pub fn register(mut self, exchange: ExchangeId, is_private: bool, factory: StrategyFactory) -> Self {
        self.factories.insert((exchange, is_private), factory);
        self
    }

    pub fn build(self) -> StrategyRegistry {
        StrategyRegistry {
            factories: self.factories,
        }
    }
}
