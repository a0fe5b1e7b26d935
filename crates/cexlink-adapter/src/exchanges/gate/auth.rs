/*
[INPUT]:  Gate.io API credentials, outgoing REST requests, private channel requests
[OUTPUT]: KEY/SIGN/Timestamp headers; in-band `auth` objects for private channels
[POS]:    Gate.io exchange - HMAC-SHA512 signing (REST v4 and WebSocket v4)
[UPDATE]: When Gate.io changes its signature string layout
*/

use serde_json::{Value, json};

use crate::auth::hmac::{hmac_sha512_hex, sha512_hex};
use crate::auth::{ApiCredentials, AuthStrategy, SignableRequest};
use crate::http::Result;
use crate::types::now_millis;

/// REST v4 signing over `METHOD\nPATH\nQUERY\nSHA512(BODY)\nTIMESTAMP`.
///
/// Endpoints must be absolute paths (`/api/v4/...`) so the signed path
/// matches the request line.
#[derive(Debug, Clone)]
pub struct GateAuth {
    credentials: ApiCredentials,
}

impl GateAuth {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self { credentials }
    }

    fn sign_at(&self, request: &mut SignableRequest, timestamp_secs: i64) -> Result<()> {
        let body_hash = sha512_hex(request.body.as_deref().unwrap_or(""));
        let payload = format!(
            "{}\n{}\n{}\n{}\n{}",
            request.method.as_str(),
            request.path,
            request.query_string(),
            body_hash,
            timestamp_secs
        );
        let signature = hmac_sha512_hex(&self.credentials.secret_key, &payload)?;

        request.push_header("KEY", self.credentials.api_key.clone());
        request.push_header("SIGN", signature);
        request.push_header("Timestamp", timestamp_secs.to_string());
        Ok(())
    }
}

impl AuthStrategy for GateAuth {
    fn sign(&self, request: &mut SignableRequest) -> Result<()> {
        self.sign_at(request, now_millis() / 1000)
    }
}

/// `auth` object attached to private channel requests.
pub fn channel_auth(credentials: &ApiCredentials, channel: &str, event: &str, time: i64) -> Result<Value> {
    let payload = format!("channel={channel}&event={event}&time={time}");
    let signature = hmac_sha512_hex(&credentials.secret_key, &payload)?;
    Ok(json!({
        "method": "api_key",
        "KEY": credentials.api_key,
        "SIGN": signature,
    }))
}
