/*
[INPUT]:  Per-endpoint rate-limit table, global pacing settings, endpoint paths
[OUTPUT]: Suspension until a request may be dispatched, or a fail-fast error
[POS]:    HTTP layer - client-side throttling shared by concurrent callers
[UPDATE]: When changing bucket semantics or the endpoint matching rule
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

use super::error::{ExchangeError, Result};

/// Token-bucket parameters for one endpoint pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitContext {
    pub requests_per_second: f64,
    pub burst_capacity: u32,
    #[serde(default = "default_endpoint_weight")]
    pub endpoint_weight: u32,
}

impl RateLimitContext {
    pub fn new(requests_per_second: f64, burst_capacity: u32) -> Self {
        Self {
            requests_per_second,
            burst_capacity,
            endpoint_weight: default_endpoint_weight(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.endpoint_weight = weight;
        self
    }
}

impl Default for RateLimitContext {
    fn default() -> Self {
        Self::new(10.0, 10)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointLimit {
    /// Path prefix, matched longest-first (e.g. `/api/v3/order`)
    pub prefix: String,
    #[serde(flatten)]
    pub limit: RateLimitContext,
}

/// Exchange rate-limit policy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub default: RateLimitContext,
    #[serde(default)]
    pub endpoints: Vec<EndpointLimit>,
    /// Bucket shared by every endpoint, protecting exchange-wide quotas
    #[serde(default)]
    pub global: Option<RateLimitContext>,
    /// Minimum gap between any two dispatched requests
    #[serde(default)]
    pub min_interval_ms: u64,
    /// Longest a caller may be suspended before failing fast
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: RateLimitContext::default(),
            endpoints: Vec::new(),
            global: None,
            min_interval_ms: 0,
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn with_endpoint(mut self, prefix: impl Into<String>, limit: RateLimitContext) -> Self {
        self.endpoints.push(EndpointLimit {
            prefix: prefix.into(),
            limit,
        });
        self
    }
}

fn default_endpoint_weight() -> u32 {
    1
}

fn default_max_wait_ms() -> u64 {
    10_000
}

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    cost: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(ctx: &RateLimitContext, now: Instant) -> Self {
        let capacity = f64::from(ctx.burst_capacity.max(1));
        let cost = f64::from(ctx.endpoint_weight.max(1)).min(capacity);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: ctx.requests_per_second.max(f64::EPSILON),
            cost,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn wait_for(&mut self, cost: f64, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= cost {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((cost - self.tokens) / self.refill_per_sec)
        }
    }

    // Tokens may go negative: that debt is the queue of callers already
    // holding a reservation.
    fn reserve(&mut self, cost: f64) {
        self.tokens -= cost;
    }
}

#[derive(Debug)]
struct LimiterState {
    endpoints: Vec<(String, TokenBucket)>,
    fallback: TokenBucket,
    global: Option<TokenBucket>,
    next_allowed: Instant,
}

/// Per-endpoint token buckets plus a global bucket and minimum pacing gap.
///
/// Tokens are deducted when a reservation is made, before the caller sleeps,
/// so a caller dropped mid-wait leaves the bucket consistent.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    min_interval: Duration,
    max_wait: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let now = Instant::now();
        let mut endpoints: Vec<(String, TokenBucket)> = config
            .endpoints
            .iter()
            .map(|entry| (entry.prefix.clone(), TokenBucket::new(&entry.limit, now)))
            .collect();
        endpoints.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            state: Mutex::new(LimiterState {
                endpoints,
                fallback: TokenBucket::new(&config.default, now),
                global: config.global.as_ref().map(|ctx| TokenBucket::new(ctx, now)),
                next_allowed: now,
            }),
            min_interval: Duration::from_millis(config.min_interval_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
        }
    }

    /// Reserve capacity for `endpoint` without sleeping; returns the delay the
    /// caller must wait before dispatching.
    pub async fn reserve(&self, endpoint: &str) -> Result<Duration> {
        let path = endpoint.split('?').next().unwrap_or(endpoint);
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let LimiterState {
            endpoints,
            fallback,
            global,
            next_allowed,
        } = &mut *state;

        let bucket = endpoints
            .iter_mut()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, bucket)| bucket)
            .unwrap_or(fallback);

        let cost = bucket.cost;
        let mut wait = bucket.wait_for(cost, now);
        if let Some(global) = global.as_mut() {
            wait = wait.max(global.wait_for(1.0, now));
        }
        wait = wait.max(next_allowed.saturating_duration_since(now));

        if wait > self.max_wait {
            debug!(endpoint = path, ?wait, max_wait = ?self.max_wait, "rate limiter wait ceiling exceeded");
            return Err(ExchangeError::RateLimit {
                retry_after: Some(wait),
            });
        }

        bucket.reserve(cost);
        if let Some(global) = global.as_mut() {
            global.reserve(1.0);
        }
        // Pacing only spaces dispatches; a bucket's queue never leaks into it.
        if !self.min_interval.is_zero() {
            *next_allowed = (*next_allowed).max(now + wait) + self.min_interval;
        }

        Ok(wait)
    }

    /// Suspend until a request to `endpoint` may be dispatched.
    pub async fn acquire(&self, endpoint: &str) -> Result<Duration> {
        let wait = self.reserve(endpoint).await?;
        if !wait.is_zero() {
            debug!(endpoint, ?wait, "rate limiter delaying request");
            sleep(wait).await;
        }
        Ok(wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            default: RateLimitContext::new(rps, burst),
            ..RateLimitConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_plus_one_request_waits_for_refill() {
        let limiter = limiter(1.0, 3);
        let start = Instant::now();

        for _ in 0..3 {
            let waited = limiter.acquire("/api/v3/order").await.unwrap();
            assert_eq!(waited, Duration::ZERO);
        }
        assert!(start.elapsed() < Duration::from_millis(1));

        let waited = limiter.acquire("/api/v3/order").await.unwrap();
        assert!(waited >= Duration::from_millis(999));
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_reservations_are_spaced_by_refill_rate() {
        let limiter = limiter(2.0, 1);
        let first = limiter.reserve("/x").await.unwrap();
        let second = limiter.reserve("/x").await.unwrap();
        let third = limiter.reserve("/x").await.unwrap();

        assert_eq!(first, Duration::ZERO);
        assert_eq!(second, Duration::from_millis(500));
        assert_eq!(third, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn longest_prefix_wins_over_shorter_and_default() {
        let config = RateLimitConfig {
            default: RateLimitContext::new(100.0, 100),
            ..RateLimitConfig::default()
        }
        .with_endpoint("/api/v3", RateLimitContext::new(100.0, 100))
        .with_endpoint("/api/v3/order", RateLimitContext::new(1.0, 1));
        let limiter = RateLimiter::new(&config);

        assert_eq!(limiter.reserve("/api/v3/order?symbol=BTCUSDT").await.unwrap(), Duration::ZERO);
        assert!(limiter.reserve("/api/v3/order").await.unwrap() > Duration::ZERO);
        assert_eq!(limiter.reserve("/api/v3/account").await.unwrap(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn drained_endpoint_does_not_delay_other_endpoints() {
        let config = RateLimitConfig {
            default: RateLimitContext::new(100.0, 100),
            ..RateLimitConfig::default()
        }
        .with_endpoint("/hot", RateLimitContext::new(0.5, 1));
        let limiter = RateLimiter::new(&config);

        assert_eq!(limiter.reserve("/hot").await.unwrap(), Duration::ZERO);
        assert_eq!(limiter.reserve("/hot").await.unwrap(), Duration::from_secs(2));
        assert_eq!(limiter.reserve("/cold").await.unwrap(), Duration::ZERO);
        assert_eq!(limiter.reserve("/cold").await.unwrap(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ceiling_fails_fast_without_consuming_tokens() {
        let config = RateLimitConfig {
            default: RateLimitContext::new(1.0, 1),
            max_wait_ms: 500,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(&config);

        limiter.reserve("/x").await.unwrap();
        let err = limiter.reserve("/x").await.unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimit { retry_after: Some(_) }));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.reserve("/x").await.unwrap(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn global_min_interval_spaces_requests_across_endpoints() {
        let config = RateLimitConfig {
            default: RateLimitContext::new(100.0, 100),
            min_interval_ms: 50,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(&config);

        assert_eq!(limiter.reserve("/a").await.unwrap(), Duration::ZERO);
        assert_eq!(limiter.reserve("/b").await.unwrap(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_weight_consumes_multiple_tokens() {
        let config = RateLimitConfig {
            default: RateLimitContext::new(1.0, 4).with_weight(2),
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(&config);

        assert_eq!(limiter.reserve("/w").await.unwrap(), Duration::ZERO);
        assert_eq!(limiter.reserve("/w").await.unwrap(), Duration::ZERO);
        assert_eq!(limiter.reserve("/w").await.unwrap(), Duration::from_secs(2));
    }
}
