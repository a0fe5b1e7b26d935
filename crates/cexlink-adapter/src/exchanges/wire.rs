/*
[INPUT]:  Loosely typed exchange JSON fields (ids and times as strings or numbers)
[OUTPUT]: Normalized String ids, millisecond timestamps, decimal helpers
[POS]:    Exchange layer - serde helpers shared by every exchange module
[UPDATE]: When an exchange sends a field in yet another shape
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::http::{ExchangeError, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            StringOrNumber::String(value) => value,
            StringOrNumber::Number(value) => value.to_string(),
        }
    }
}

/// Ids arrive as `"123"` on some endpoints and `123` on others.
pub fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(StringOrNumber::into_string)
}

pub fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?
        .map(StringOrNumber::into_string)
        .filter(|value| !value.is_empty()))
}

/// Millisecond timestamps sent as integers, floats or strings like `"1606292218213.45"`.
pub fn opt_millis<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?
        .and_then(|value| parse_millis(&value.into_string())))
}

pub fn parse_millis(value: &str) -> Option<i64> {
    let integral = value.trim().split('.').next()?;
    integral.parse().ok()
}

/// Decode `value` into `T`, reporting shape mismatches as protocol errors.
pub fn decode<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|err| ExchangeError::Protocol(format!("malformed {what}: {err}")))
}

/// Average fill price from cumulative quote and base quantities.
pub fn average_price(quote_qty: Decimal, base_qty: Decimal) -> Option<Decimal> {
    if base_qty.is_zero() {
        None
    } else {
        Some(quote_qty / base_qty)
    }
}

/// `None` for zero, which exchanges use as "not set".
pub fn non_zero(value: Decimal) -> Option<Decimal> {
    if value.is_zero() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
        #[serde(default, deserialize_with = "opt_millis")]
        time: Option<i64>,
    }

    #[test]
    fn ids_and_times_accept_mixed_shapes() {
        let a: Probe = serde_json::from_str(r#"{"id":123,"time":"1606292218213.45"}"#).unwrap();
        assert_eq!(a.id, "123");
        assert_eq!(a.time, Some(1606292218213));

        let b: Probe = serde_json::from_str(r#"{"id":"C02__1","time":1661938138000}"#).unwrap();
        assert_eq!(b.id, "C02__1");
        assert_eq!(b.time, Some(1661938138000));

        let c: Probe = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(c.time, None);
    }

    #[test]
    fn average_price_ignores_empty_fills() {
        assert_eq!(average_price(dec!(250), dec!(2)), Some(dec!(125)));
        assert_eq!(average_price(dec!(0), dec!(0)), None);
    }
}
