/*
[INPUT]:  Secret key bytes and canonical payload strings
[OUTPUT]: Hex-encoded HMAC / digest strings
[POS]:    Auth layer - signing primitives shared by exchange auth strategies
[UPDATE]: When an exchange needs a new digest algorithm
*/

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::http::{ExchangeError, Result};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Config(format!("HMAC setup failed: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn hmac_sha512_hex(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Config(format!("HMAC setup failed: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn sha512_hex(payload: &str) -> String {
    hex::encode(Sha512::digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_matches_reference_vector() {
        // RFC 4231 test case 2
        let sig = hmac_sha256_hex("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn hmac_sha512_matches_reference_vector() {
        let sig = hmac_sha512_hex("Jefe", "what do ya want for nothing?").unwrap();
        assert!(sig.starts_with("164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554"));
        assert_eq!(sig.len(), 128);
    }

    #[test]
    fn sha512_of_empty_body() {
        assert!(sha512_hex("").starts_with("cf83e1357eefb8bdf1542850d66d8007"));
    }
}
