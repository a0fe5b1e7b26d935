/*
[INPUT]:  API credentials and outgoing REST requests
[OUTPUT]: Signed requests (query signatures and auth headers)
[POS]:    Auth layer - pluggable per-exchange request signing
[UPDATE]: When auth flow or signature methods change
*/

pub mod credentials;
pub mod hmac;
pub mod strategy;

pub use credentials::ApiCredentials;
pub use strategy::{AuthStrategy, SignableRequest};
