/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for cexlink-adapter tests

use std::sync::Arc;

use cexlink_adapter::{
    ApiCredentials, ExchangeConfig, ExchangeId, RestTransport, RetryPolicy, rest_transport,
};
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
#[allow(dead_code)]
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

#[allow(dead_code)]
pub fn test_credentials() -> ApiCredentials {
    ApiCredentials::new("test-key", "test-secret")
}

/// Millisecond-scale retries so failure paths finish quickly
#[allow(dead_code)]
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay_ms: 10,
        backoff_factor: 2.0,
        max_delay_ms: 100,
    }
}

/// Production defaults for `exchange` with REST pointed at the mock server
#[allow(dead_code)]
pub fn mock_config(exchange: ExchangeId, server: &MockServer) -> ExchangeConfig {
    let mut config = ExchangeConfig::defaults_for(exchange).with_credentials(test_credentials());
    config.rest_url = server.uri();
    config.retry = fast_retry(3);
    config
}

#[allow(dead_code)]
pub fn signed_transport(config: &ExchangeConfig) -> Arc<RestTransport> {
    Arc::new(rest_transport(config, Some(test_credentials())).expect("transport"))
}
