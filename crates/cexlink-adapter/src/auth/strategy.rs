/*
[INPUT]:  Outgoing REST request parts before dispatch
[OUTPUT]: Request mutated with signature parameters and auth headers
[POS]:    Auth layer - the per-exchange signing seam used by RestTransport
[UPDATE]: When the canonical request representation changes
*/

use std::fmt::Debug;

use reqwest::Method;

use crate::http::Result;

/// Canonical request representation handed to an [`AuthStrategy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignableRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl SignableRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// URL-encoded query string in insertion order.
    pub fn query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish()
    }

    pub fn push_query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    pub fn push_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.push((key.into(), value.into()));
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

/// Computes per-request signing for one exchange's REST auth scheme.
///
/// Called once per attempt so retried requests carry a fresh timestamp.
pub trait AuthStrategy: Send + Sync + Debug {
    fn sign(&self, request: &mut SignableRequest) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_preserves_insertion_order_and_encodes() {
        let mut req = SignableRequest::new(Method::GET, "/api/v3/order");
        req.push_query("symbol", "BTCUSDT");
        req.push_query("note", "a b&c");
        assert_eq!(req.query_string(), "symbol=BTCUSDT&note=a+b%26c");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut req = SignableRequest::new(Method::GET, "/");
        req.push_header("X-MEXC-APIKEY", "key");
        assert_eq!(req.header("x-mexc-apikey"), Some("key"));
    }
}
