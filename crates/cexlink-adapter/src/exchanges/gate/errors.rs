/*
[INPUT]:  Gate.io non-2xx responses `{"label": .., "message": ..}`
[OUTPUT]: Normalized ExchangeError variants
[POS]:    Gate.io exchange - error label classification
[UPDATE]: When Gate.io documents new error labels
*/

use std::time::Duration;

use serde::Deserialize;

use crate::http::exception::{body_snippet, map_status};
use crate::http::{ExceptionMapper, ExchangeError};

#[derive(Debug, Deserialize)]
struct GateErrorBody {
    label: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GateExceptionMapper;

impl ExceptionMapper for GateExceptionMapper {
    fn to_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> ExchangeError {
        let Ok(parsed) = serde_json::from_str::<GateErrorBody>(body) else {
            return map_status(status, None, body_snippet(body), retry_after);
        };

        let message = if parsed.message.is_empty() {
            parsed.label.clone()
        } else {
            parsed.message
        };
        match parsed.label.as_str() {
            "INVALID_KEY" | "INVALID_SIGNATURE" | "MISSING_REQUIRED_HEADER" | "REQUEST_EXPIRED"
            | "IP_FORBIDDEN" | "FORBIDDEN" | "READ_ONLY" | "INVALID_CREDENTIALS" => {
                ExchangeError::Authentication { message }
            }
            "TOO_MANY_REQUESTS" => ExchangeError::RateLimit { retry_after },
            "BALANCE_NOT_ENOUGH" | "INSUFFICIENT_AVAILABLE" | "MARGIN_BALANCE_NOT_ENOUGH"
            | "POSITION_EMPTY" | "REDUCE_EXCEEDED" => ExchangeError::InsufficientPosition { message },
            "ORDER_NOT_FOUND" | "ORDER_CLOSED" | "ORDER_CANCELLED" | "ORDER_FINISHED" => {
                ExchangeError::OrderNotFoundOrCancelled { message }
            }
            "TRADE_RESTRICTED" | "CONTRACT_IN_DELISTING" | "ACCOUNT_LOCKED" => {
                ExchangeError::TradingDisabled { message }
            }
            label => map_status(status, Some(label.to_string()), message, retry_after),
        }
    }
}
