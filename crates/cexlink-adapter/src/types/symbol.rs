/*
[INPUT]:  Base/quote asset codes and market kind
[OUTPUT]: Canonical cross-exchange instrument identity
[POS]:    Data layer - the key every exchange-specific symbol maps onto
[UPDATE]: When canonical symbol normalization rules change
*/

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical instrument identity shared by every exchange.
///
/// Asset codes are normalized to upper case on construction so equality and
/// hashing never depend on how a venue spells them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    pub base: String,
    pub quote: String,
    #[serde(default)]
    pub is_futures: bool,
}

impl Symbol {
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>, is_futures: bool) -> Self {
        Self {
            base: base.as_ref().trim().to_ascii_uppercase(),
            quote: quote.as_ref().trim().to_ascii_uppercase(),
            is_futures,
        }
    }

    pub fn spot(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        Self::new(base, quote, false)
    }

    pub fn futures(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        Self::new(base, quote, true)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_futures {
            write!(f, "{}/{}:PERP", self.base, self.quote)
        } else {
            write!(f, "{}/{}", self.base, self.quote)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn symbol_normalizes_case() {
        let a = Symbol::spot("btc", "usdt");
        let b = Symbol::spot("BTC", "USDT");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn spot_and_futures_are_distinct() {
        assert_ne!(Symbol::spot("BTC", "USDT"), Symbol::futures("BTC", "USDT"));
        assert_eq!(Symbol::futures("eth", "usdt").to_string(), "ETH/USDT:PERP");
    }
}
