/*
[INPUT]:  MEXC API credentials and outgoing signed REST requests
[OUTPUT]: Requests carrying recvWindow, timestamp, signature and X-MEXC-APIKEY
[POS]:    MEXC exchange - HMAC-SHA256 query signing
[UPDATE]: When MEXC changes its signing rules
*/

use crate::auth::hmac::hmac_sha256_hex;
use crate::auth::{ApiCredentials, AuthStrategy, SignableRequest};
use crate::http::Result;
use crate::types::now_millis;

pub const API_KEY_HEADER: &str = "X-MEXC-APIKEY";

/// Signs the full query string; parameters always travel in the query.
#[derive(Debug, Clone)]
pub struct MexcAuth {
    credentials: ApiCredentials,
    recv_window_ms: u64,
}

impl MexcAuth {
    pub fn new(credentials: ApiCredentials, recv_window_ms: u64) -> Self {
        Self {
            credentials,
            recv_window_ms,
        }
    }

    fn sign_at(&self, request: &mut SignableRequest, timestamp: i64) -> Result<()> {
        request.push_query("recvWindow", self.recv_window_ms.to_string());
        request.push_query("timestamp", timestamp.to_string());

        let mut payload = request.query_string();
        if let Some(body) = &request.body {
            payload.push_str(body);
        }
        let signature = hmac_sha256_hex(&self.credentials.secret_key, &payload)?;

        request.push_query("signature", signature);
        request.push_header(API_KEY_HEADER, self.credentials.api_key.clone());
        Ok(())
    }
}

impl AuthStrategy for MexcAuth {
    fn sign(&self, request: &mut SignableRequest) -> Result<()> {
        self.sign_at(request, now_millis())
    }
}
