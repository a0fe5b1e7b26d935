/*
[INPUT]:  MEXC non-2xx responses `{"code": .., "msg": ..}`
[OUTPUT]: Normalized ExchangeError variants
[POS]:    MEXC exchange - wire error code classification
[UPDATE]: When MEXC documents new error codes
*/

use std::time::Duration;

use serde::Deserialize;

use crate::http::exception::{body_snippet, map_status};
use crate::http::{ExceptionMapper, ExchangeError};

#[derive(Debug, Deserialize)]
struct MexcErrorBody {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MexcExceptionMapper;

impl ExceptionMapper for MexcExceptionMapper {
    fn to_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> ExchangeError {
        let Ok(parsed) = serde_json::from_str::<MexcErrorBody>(body) else {
            return map_status(status, None, body_snippet(body), retry_after);
        };

        let message = parsed.msg;
        match parsed.code {
            700001..=700008 | 10072 => ExchangeError::Authentication { message },
            429 | 510 => ExchangeError::RateLimit { retry_after },
            30004 | 30005 | 10101 => ExchangeError::InsufficientPosition { message },
            -2011 | -2013 => ExchangeError::OrderNotFoundOrCancelled { message },
            30000 | 30001 | 30016 => ExchangeError::TradingDisabled { message },
            code => map_status(status, Some(code.to_string()), message, retry_after),
        }
    }
}
