/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed connectivity configuration
[POS]:    Configuration layer - exchange and position setup
[UPDATE]: When adding new configuration options
*/

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, bail};
use cexlink_adapter::{ExchangeConfig, ExchangeId};
use serde::{Deserialize, Serialize};

use crate::position::ReversalPolicy;

/// Top-level configuration for the connectivity layer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectivityConfig {
    /// One entry per exchange; omitted fields take production defaults
    pub exchanges: Vec<ExchangeConfig>,
    /// Position reconciliation settings
    #[serde(default)]
    pub position: PositionConfig,
    /// Capacity of the event channel handed to consumers
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PositionConfig {
    #[serde(default)]
    pub reversal_policy: ReversalPolicy,
}

fn default_event_buffer() -> usize {
    1024
}

impl ConnectivityConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("load config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.event_buffer == 0 {
            bail!("event_buffer must be > 0");
        }
        let mut seen = HashSet::new();
        for exchange in &self.exchanges {
            if !seen.insert(exchange.exchange) {
                bail!("exchange {} configured twice", exchange.exchange);
            }
            exchange
                .validate()
                .with_context(|| format!("invalid config for {}", exchange.exchange))?;
        }
        Ok(())
    }

    pub fn exchange(&self, id: ExchangeId) -> Option<&ExchangeConfig> {
        self.exchanges.iter().find(|config| config.exchange == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let config = ConnectivityConfig::from_yaml(
            r#"
exchanges:
  - exchange: mexc_spot
    credentials:
      api_key: k
      secret_key: s
  - exchange: gate_futures
    user_id: "1001"
    reconnect:
      max_attempts: 3
position:
  reversal_policy: reverse
"#,
        )
        .unwrap();

        assert_eq!(config.event_buffer, 1024);
        assert_eq!(config.position.reversal_policy, ReversalPolicy::Reverse);
        let mexc = config.exchange(ExchangeId::MexcSpot).unwrap();
        assert_eq!(mexc.rest_url, "https://api.mexc.com");
        assert_eq!(mexc.credentials.as_ref().unwrap().api_key, "k");
        let gate = config.exchange(ExchangeId::GateFutures).unwrap();
        assert_eq!(gate.reconnect.max_attempts, 3);
        assert_eq!(gate.user_id.as_deref(), Some("1001"));
    }

    #[test]
    fn duplicate_exchange_is_rejected() {
        let err = ConnectivityConfig::from_yaml(
            "exchanges:\n  - exchange: gate_spot\n  - exchange: gate_spot\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn from_file_reports_path() {
        let path = std::env::temp_dir().join(format!("cexlink-missing-{}.yaml", std::process::id()));
        let err = ConnectivityConfig::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("cexlink-missing"));
    }
}
