/*
[INPUT]:  Error sources (HTTP, exchange API, serialization, auth, WebSocket)
[OUTPUT]: Normalized error taxonomy with retry classification hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or changing retry classification
*/

use std::time::Duration;

use thiserror::Error;

/// Normalized error taxonomy shared by REST and streaming paths.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Connection refused, reset, DNS failure, or socket closed unexpectedly
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Request or socket operation exceeded its deadline
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Malformed or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Credentials rejected, signature invalid, or session expired
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Exchange throttled the request
    #[error("Rate limit exceeded (retry after {retry_after:?})")]
    RateLimit { retry_after: Option<Duration> },

    /// Trading suspended for the account or instrument
    #[error("Trading disabled: {message}")]
    TradingDisabled { message: String },

    /// Not enough balance or position to satisfy the order
    #[error("Insufficient position: {message}")]
    InsufficientPosition { message: String },

    /// Order unknown to the exchange or already in a final state
    #[error("Order not found or already cancelled: {message}")]
    OrderNotFoundOrCancelled { message: String },

    /// Anything else the exchange reported, preserved for diagnostics
    #[error("Exchange error (status {status}, code {code:?}): {message}")]
    Unknown {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// HTTP client failure before a status was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// Operation abandoned because its owner shut down
    #[error("Operation cancelled")]
    Cancelled,
}

impl ExchangeError {
    pub fn transport(message: impl Into<String>) -> Self {
        ExchangeError::Transport {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ExchangeError::Authentication {
            message: message.into(),
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Transport { .. }
            | ExchangeError::Timeout(_)
            | ExchangeError::RateLimit { .. } => true,
            ExchangeError::Unknown { status, .. } => *status >= 500,
            ExchangeError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }

    /// Exchange-provided backoff hint, if any
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            ExchangeError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ExchangeError::Authentication { .. })
    }

    /// Financial/business rejections are never retried and always surfaced
    pub fn is_business_error(&self) -> bool {
        match self {
            ExchangeError::TradingDisabled { .. }
            | ExchangeError::InsufficientPosition { .. }
            | ExchangeError::OrderNotFoundOrCancelled { .. } => true,
            ExchangeError::Unknown { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }
}

/// Result type alias for connectivity operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(ExchangeError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(ExchangeError::transport("connection refused").is_retryable());
        assert!(ExchangeError::RateLimit { retry_after: None }.is_retryable());

        assert!(!ExchangeError::authentication("bad key").is_retryable());
        assert!(
            !ExchangeError::InsufficientPosition {
                message: "balance".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_unknown_error_retryable_only_for_5xx() {
        let server = ExchangeError::Unknown {
            status: 503,
            code: None,
            message: "unavailable".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!server.is_business_error());

        let client = ExchangeError::Unknown {
            status: 400,
            code: Some("INVALID_PARAM".to_string()),
            message: "bad".to_string(),
        };
        assert!(!client.is_retryable());
        assert!(client.is_business_error());
    }

    #[test]
    fn test_retry_delay_hint() {
        let err = ExchangeError::RateLimit {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.retry_delay(), Some(Duration::from_secs(2)));
        assert_eq!(ExchangeError::NotConnected.retry_delay(), None);
    }

    #[test]
    fn test_error_is_auth_error() {
        assert!(ExchangeError::authentication("expired").is_auth_error());
        assert!(!ExchangeError::Timeout(Duration::from_secs(1)).is_auth_error());
    }
}
