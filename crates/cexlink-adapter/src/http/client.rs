/*
[INPUT]:  Logical REST requests, rate-limit table, retry policy, auth strategy
[OUTPUT]: Parsed JSON responses or normalized errors after retry exhaustion
[POS]:    HTTP layer - single pipeline wrapping every REST call
[UPDATE]: When changing the request pipeline order or client options
*/

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{ExchangeError, Result};
use super::exception::ExceptionMapper;
use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;
use crate::auth::{AuthStrategy, SignableRequest};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One logical REST call, independent of retries.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub signed: bool,
    pub timeout: Option<Duration>,
    /// Safe to send again after an ambiguous failure (5xx, timeout).
    /// POST starts out false.
    pub idempotent: bool,
}

impl RestRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
            body: None,
            headers: Vec::new(),
            signed: false,
            timeout: None,
            idempotent: method != Method::POST,
            method,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn param_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark a POST as replayable, e.g. when the exchange rejects a repeated
    /// client order id.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Whether `error` leaves this request safe to send again. Rate limits
    /// and connect failures mean the exchange never processed it.
    fn may_replay(&self, error: &ExchangeError) -> bool {
        self.idempotent
            || matches!(error, ExchangeError::RateLimit { .. } | ExchangeError::Transport { .. })
    }
}

/// Rate-limited, signed, retrying REST pipeline for one exchange.
#[derive(Debug)]
pub struct RestTransport {
    http_client: Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    auth: Option<Arc<dyn AuthStrategy>>,
    mapper: Arc<dyn ExceptionMapper>,
    default_timeout: Duration,
}

impl RestTransport {
    pub fn new(
        base_url: &str,
        config: ClientConfig,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        mapper: Arc<dyn ExceptionMapper>,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            limiter,
            retry,
            auth: None,
            mapper,
            default_timeout: config.timeout,
        })
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthStrategy>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn request_json<T: DeserializeOwned>(&self, request: &RestRequest) -> Result<T> {
        let value = self.request(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Rate limit, sign, send, and retry until success or a terminal error.
    pub async fn request(&self, request: &RestRequest) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let error = match self.execute_once(request).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let decision = if request.may_replay(&error) {
                self.retry.should_retry(&error, attempt)
            } else {
                None
            };
            match decision {
                Some(delay) => {
                    warn!(
                        method = %request.method,
                        endpoint = %request.endpoint,
                        attempt,
                        ?delay,
                        error = %error,
                        "rest request failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    debug!(
                        method = %request.method,
                        endpoint = %request.endpoint,
                        attempt,
                        error = %error,
                        "rest request failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    async fn execute_once(&self, request: &RestRequest) -> Result<Value> {
        self.limiter.acquire(&request.endpoint).await?;

        let mut signable = SignableRequest::new(request.method.clone(), request.endpoint.clone());
        signable.query = request.params.clone();
        signable.headers = request.headers.clone();
        if let Some(body) = &request.body {
            signable.body = Some(serde_json::to_string(body)?);
        }

        if request.signed {
            let auth = self.auth.as_ref().ok_or_else(|| {
                ExchangeError::authentication("signed request issued without credentials")
            })?;
            auth.sign(&mut signable)?;
        }

        let mut url = self.base_url.join(&signable.path)?;
        if !signable.query.is_empty() {
            url.set_query(Some(&signable.query_string()));
        }

        let mut builder = self.http_client.request(signable.method.clone(), url);
        for (name, value) in &signable.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = signable.body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let response = match tokio::time::timeout(timeout, builder.send()).await {
            Err(_) => return Err(ExchangeError::Timeout(timeout)),
            Ok(Err(err)) => return Err(classify_reqwest_error(err, timeout)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|err| classify_reqwest_error(err, timeout))?;

        if !status.is_success() {
            return Err(self.mapper.to_error(status.as_u16(), &text, retry_after));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> ExchangeError {
    if err.is_timeout() {
        ExchangeError::Timeout(timeout)
    } else if err.is_connect() {
        ExchangeError::transport(err.to_string())
    } else {
        ExchangeError::Http(err)
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_header_parses_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn rest_request_builder_collects_params() {
        let req = RestRequest::get("/api/v3/openOrders")
            .param("symbol", "BTCUSDT")
            .param_opt("limit", None::<u32>)
            .param_opt("recvWindow", Some(5000))
            .signed();
        assert_eq!(
            req.params,
            vec![
                ("symbol".to_string(), "BTCUSDT".to_string()),
                ("recvWindow".to_string(), "5000".to_string()),
            ]
        );
        assert!(req.signed);
    }
}
