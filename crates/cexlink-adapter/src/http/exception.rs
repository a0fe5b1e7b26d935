/*
[INPUT]:  Non-2xx HTTP status, response body, optional Retry-After hint
[OUTPUT]: Normalized ExchangeError variants
[POS]:    HTTP layer - wire error to taxonomy translation
[UPDATE]: When an exchange introduces new error codes
*/

use std::fmt::Debug;
use std::time::Duration;

use super::error::ExchangeError;

const BODY_SNIPPET_MAX_BYTES: usize = 512;

/// Maps wire-level errors to the normalized taxonomy.
pub trait ExceptionMapper: Send + Sync + Debug {
    fn to_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> ExchangeError;
}

/// Status-code-only mapping used as the fallback for every exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusExceptionMapper;

impl ExceptionMapper for StatusExceptionMapper {
    fn to_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> ExchangeError {
        map_status(status, None, body_snippet(body), retry_after)
    }
}

/// Classify by HTTP status once exchange-specific codes have been checked.
pub fn map_status(
    status: u16,
    code: Option<String>,
    message: String,
    retry_after: Option<Duration>,
) -> ExchangeError {
    match status {
        401 | 403 => ExchangeError::Authentication { message },
        418 | 429 => ExchangeError::RateLimit { retry_after },
        _ => ExchangeError::Unknown {
            status,
            code,
            message,
        },
    }
}

pub fn body_snippet(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_MAX_BYTES {
        return body.to_string();
    }
    let mut end = BODY_SNIPPET_MAX_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
