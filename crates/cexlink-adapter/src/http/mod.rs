/*
[INPUT]:  REST endpoint requests, rate-limit tables, retry policy
[OUTPUT]: HTTP responses and typed API results
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding pipeline stages or changing client behavior
*/

pub mod client;
pub mod error;
pub mod exception;
pub mod rate_limit;
pub mod retry;

pub use error::{ExchangeError, Result};
pub use exception::{ExceptionMapper, StatusExceptionMapper};
pub use rate_limit::{EndpointLimit, RateLimitConfig, RateLimitContext, RateLimiter};
pub use retry::{RetryPolicy, exponential_backoff};

pub use client::{ClientConfig, RestRequest, RestTransport};
