/*
[INPUT]:  Mock HTTP responses
[OUTPUT]: Test results for the REST transport pipeline
[POS]:    Integration tests - retry, error mapping, timeouts
[UPDATE]: When RestTransport behavior changes
*/

mod common;

use std::time::Duration;

use cexlink_adapter::{
    ExchangeError, ExchangeId, RateLimitConfig, RateLimitContext, RestRequest, RetryPolicy,
    rest_transport,
};
use common::{mock_config, setup_mock_server, signed_transport};
use tokio::time::Instant;
use serde::Deserialize;
use tokio_test::assert_ok;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_server_errors_retry_until_attempts_exhausted() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let transport = signed_transport(&mock_config(ExchangeId::MexcSpot, &server));
    let err = transport
        .request(&RestRequest::get("/api/v3/time"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Unknown { status: 503, .. }));
}

#[tokio::test]
async fn test_business_errors_are_not_retried() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/order"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 30004,
            "msg": "Insufficient position",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = signed_transport(&mock_config(ExchangeId::MexcSpot, &server));
    let err = transport
        .request(&RestRequest::post("/api/v3/order").param("symbol", "BTCUSDT").signed())
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::InsufficientPosition { .. }));
    assert!(err.is_business_error());
}

#[tokio::test]
async fn test_rate_limited_request_is_retried_then_succeeds() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/spot/time"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/spot/time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "server_time": 1597026383085u64,
        })))
        .expect(1)
        .mount(&server)
        .await;

    #[derive(Deserialize)]
    struct ServerTime {
        server_time: u64,
    }

    let transport = signed_transport(&mock_config(ExchangeId::GateSpot, &server));
    let time: ServerTime = assert_ok!(
        transport
            .request_json(&RestRequest::get("/api/v4/spot/time"))
            .await
    );
    assert_eq!(time.server_time, 1597026383085);
}

#[tokio::test]
async fn test_per_call_timeout_is_enforced() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut config = mock_config(ExchangeId::MexcSpot, &server);
    config.retry = RetryPolicy::no_retry();
    let transport = signed_transport(&config);

    let err = transport
        .request(&RestRequest::get("/api/v3/time").timeout(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Timeout(_)));
}

#[tokio::test]
async fn test_signed_request_without_credentials_never_reaches_server() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = mock_config(ExchangeId::GateSpot, &server);
    let transport = assert_ok!(rest_transport(&config, None));
    let err = transport
        .request(&RestRequest::get("/api/v4/spot/accounts").signed())
        .await
        .unwrap_err();
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let server = setup_mock_server().await;
    Mock::given(method("PUT"))
        .and(path("/api/v3/userDataStream"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let transport = signed_transport(&mock_config(ExchangeId::MexcSpot, &server));
    let value = assert_ok!(
        transport
            .request(&RestRequest::put("/api/v3/userDataStream").param("listenKey", "abc").signed())
            .await
    );
    assert!(value.is_null());
}

#[tokio::test]
async fn test_post_is_not_replayed_after_server_error() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/spot/orders"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = signed_transport(&mock_config(ExchangeId::GateSpot, &server));
    let err = transport
        .request(&RestRequest::post("/api/v4/spot/orders").json(serde_json::json!({})).signed())
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Unknown { status: 502, .. }));
}

#[tokio::test]
async fn test_idempotent_post_is_retried() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/order"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let transport = signed_transport(&mock_config(ExchangeId::MexcSpot, &server));
    let err = transport
        .request(&RestRequest::post("/api/v3/order").signed().idempotent())
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Unknown { status: 503, .. }));
}

#[tokio::test]
async fn test_throttled_endpoint_does_not_delay_other_endpoints() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "balances": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = mock_config(ExchangeId::MexcSpot, &server);
    config.rate_limits = RateLimitConfig {
        default: RateLimitContext::new(100.0, 100),
        ..RateLimitConfig::default()
    }
    .with_endpoint("/api/v3/order", RateLimitContext::new(0.5, 1));
    let transport = signed_transport(&config);

    // Drain the order bucket and queue one more order behind it.
    let limiter = transport.limiter();
    assert_eq!(assert_ok!(limiter.reserve("/api/v3/order").await), Duration::ZERO);
    assert!(assert_ok!(limiter.reserve("/api/v3/order").await) >= Duration::from_secs(1));

    let start = Instant::now();
    assert_ok!(transport.request(&RestRequest::get("/api/v3/account").signed()).await);
    assert!(start.elapsed() < Duration::from_secs(1));

    assert!(assert_ok!(limiter.reserve("/api/v3/order").await) >= Duration::from_secs(3));
}
