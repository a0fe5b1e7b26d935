/*
[INPUT]:  API key/secret from configuration or environment
[OUTPUT]: Validated credential pair with redacted Debug output
[POS]:    Auth layer - credential holder shared by signers and listen-key flows
[UPDATE]: When credential sources change
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::http::{ExchangeError, Result};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub secret_key: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Load `{PREFIX}_API_KEY` and `{PREFIX}_SECRET_KEY` from the environment.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let key_var = format!("{prefix}_API_KEY");
        let secret_var = format!("{prefix}_SECRET_KEY");
        let api_key = std::env::var(&key_var)
            .map_err(|_| ExchangeError::Config(format!("missing environment variable {key_var}")))?;
        let secret_key = std::env::var(&secret_var).map_err(|_| {
            ExchangeError::Config(format!("missing environment variable {secret_var}"))
        })?;
        Ok(Self::new(api_key, secret_key))
    }

    pub fn is_valid(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.api_key.chars().take(4).collect();
        f.debug_struct("ApiCredentials")
            .field("api_key", &format!("{visible}***"))
            .field("secret_key", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_secret() {
        let creds = ApiCredentials::new("abcdef123", "super-secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("abcd***"));
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("abcdef123"));
    }

    #[test]
    fn empty_credentials_are_invalid() {
        assert!(!ApiCredentials::new("", "secret").is_valid());
        assert!(ApiCredentials::new("key", "secret").is_valid());
    }
}
