/*
[INPUT]:  Canonical Symbol values and exchange wire symbol strings
[OUTPUT]: Bidirectional conversions, cached per wire string
[POS]:    Mapping layer - leaf used by subscription, parsing and REST adapters
[UPDATE]: When onboarding an exchange with a new wire symbol convention
*/

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

use crate::http::{ExchangeError, Result};
use crate::types::Symbol;

/// Bidirectional canonical <-> wire symbol conversion.
pub trait SymbolMapper: Send + Sync + Debug {
    fn to_wire(&self, symbol: &Symbol) -> String;
    fn from_wire(&self, wire: &str) -> Result<Symbol>;
}

#[derive(Debug, Default)]
struct SymbolCache {
    entries: RwLock<HashMap<String, Symbol>>,
}

impl SymbolCache {
    fn get(&self, wire: &str) -> Option<Symbol> {
        self.entries.read().ok()?.get(wire).cloned()
    }

    fn insert(&self, wire: &str, symbol: &Symbol) {
        if let Ok(mut guard) = self.entries.write() {
            guard.insert(wire.to_string(), symbol.clone());
        }
    }
}

/// Wire symbols joined by a separator, e.g. Gate.io `BTC_USDT`.
#[derive(Debug)]
pub struct SeparatorSymbolMapper {
    separator: char,
    is_futures: bool,
    cache: SymbolCache,
}

impl SeparatorSymbolMapper {
    pub fn new(separator: char, is_futures: bool) -> Self {
        Self {
            separator,
            is_futures,
            cache: SymbolCache::default(),
        }
    }
}

impl SymbolMapper for SeparatorSymbolMapper {
    fn to_wire(&self, symbol: &Symbol) -> String {
        format!("{}{}{}", symbol.base, self.separator, symbol.quote)
    }

    fn from_wire(&self, wire: &str) -> Result<Symbol> {
        if let Some(symbol) = self.cache.get(wire) {
            return Ok(symbol);
        }

        let mut parts = wire.split(self.separator);
        let symbol = match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.is_empty() && !quote.is_empty() => {
                Symbol::new(base, quote, self.is_futures)
            }
            _ => {
                return Err(ExchangeError::Protocol(format!(
                    "unrecognized wire symbol: {wire}"
                )));
            }
        };

        self.cache.insert(wire, &symbol);
        Ok(symbol)
    }
}

/// Wire symbols with base and quote concatenated, e.g. MEXC `BTCUSDT`.
///
/// Splitting needs the set of known quote assets; the longest matching suffix wins.
#[derive(Debug)]
pub struct ConcatSymbolMapper {
    quotes: Vec<String>,
    is_futures: bool,
    cache: SymbolCache,
}

impl ConcatSymbolMapper {
    pub fn new<I, S>(quotes: I, is_futures: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut quotes: Vec<String> = quotes
            .into_iter()
            .map(|quote| quote.as_ref().to_ascii_uppercase())
            .collect();
        quotes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        quotes.dedup();

        Self {
            quotes,
            is_futures,
            cache: SymbolCache::default(),
        }
    }
}

impl SymbolMapper for ConcatSymbolMapper {
    fn to_wire(&self, symbol: &Symbol) -> String {
        format!("{}{}", symbol.base, symbol.quote)
    }

    fn from_wire(&self, wire: &str) -> Result<Symbol> {
        if let Some(symbol) = self.cache.get(wire) {
            return Ok(symbol);
        }

        let upper = wire.to_ascii_uppercase();
        let symbol = self
            .quotes
            .iter()
            .find(|quote| upper.len() > quote.len() && upper.ends_with(quote.as_str()))
            .map(|quote| {
                let base = &upper[..upper.len() - quote.len()];
                Symbol::new(base, quote, self.is_futures)
            })
            .ok_or_else(|| ExchangeError::Protocol(format!("unrecognized wire symbol: {wire}")))?;

        self.cache.insert(wire, &symbol);
        Ok(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("BTC_USDT")]
    #[case("ETH_BTC")]
    #[case("1INCH_USDT")]
    fn separator_mapper_round_trips(#[case] wire: &str) {
        let mapper = SeparatorSymbolMapper::new('_', false);
        let symbol = mapper.from_wire(wire).unwrap();
        assert_eq!(mapper.to_wire(&symbol), wire);
    }

    #[rstest]
    #[case("BTCUSDT", "BTC", "USDT")]
    #[case("ETHUSDC", "ETH", "USDC")]
    #[case("SOLBTC", "SOL", "BTC")]
    #[case("USDCUSDT", "USDC", "USDT")]
    fn concat_mapper_splits_on_longest_known_quote(
        #[case] wire: &str,
        #[case] base: &str,
        #[case] quote: &str,
    ) {
        let mapper = ConcatSymbolMapper::new(["USDT", "USDC", "BTC", "USD"], false);
        let symbol = mapper.from_wire(wire).unwrap();
        assert_eq!(symbol, Symbol::spot(base, quote));
        assert_eq!(mapper.to_wire(&symbol), wire);
    }

    #[test]
    fn futures_flag_comes_from_mapper() {
        let mapper = SeparatorSymbolMapper::new('_', true);
        assert!(mapper.from_wire("BTC_USDT").unwrap().is_futures);
    }

    #[test]
    fn malformed_wire_symbols_are_rejected() {
        let sep = SeparatorSymbolMapper::new('_', false);
        assert!(sep.from_wire("BTCUSDT").is_err());
        assert!(sep.from_wire("A_B_C").is_err());
        assert!(sep.from_wire("_USDT").is_err());

        let concat = ConcatSymbolMapper::new(["USDT"], false);
        assert!(concat.from_wire("USDT").is_err());
        assert!(concat.from_wire("BTCEUR").is_err());
    }

    #[test]
    fn repeated_lookups_hit_cache() {
        let mapper = ConcatSymbolMapper::new(["USDT"], false);
        let first = mapper.from_wire("BTCUSDT").unwrap();
        let second = mapper.from_wire("BTCUSDT").unwrap();
        assert_eq!(first, second);
        assert_eq!(mapper.cache.entries.read().unwrap().len(), 1);
    }
}
