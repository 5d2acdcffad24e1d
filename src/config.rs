use crate::error::{BillingError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 60_000;

/// Orchestrator settings.
///
/// Every suspension point is bounded: `api_timeout_ms` caps the wait for a
/// start or grant API to reach `End`, `gateway_timeout_ms` caps each platform
/// call. A timed-out step is reported like any other external failure and
/// leaves the stored record for the next session's reconciliation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct BillingConfig {
    /// Every product id the application sells; scope of the post-restart
    /// inventory query for records stuck in `PurchaseStart`.
    pub product_catalog: Vec<String>,
    pub api_timeout_ms: u64,
    pub gateway_timeout_ms: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            product_catalog: Vec::new(),
            api_timeout_ms: DEFAULT_API_TIMEOUT_MS,
            gateway_timeout_ms: DEFAULT_GATEWAY_TIMEOUT_MS,
        }
    }
}

impl BillingConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_timeout_ms == 0 {
            return Err(BillingError::ConfigError(
                "api_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.gateway_timeout_ms == 0 {
            return Err(BillingError::ConfigError(
                "gateway_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"product_catalog": ["sku-1", "sku-2"]}}"#).unwrap();

        let config = BillingConfig::from_path(file.path()).unwrap();
        assert_eq!(config.product_catalog, vec!["sku-1", "sku-2"]);
        assert_eq!(config.api_timeout(), Duration::from_secs(30));
        assert_eq!(config.gateway_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"api_timeout_ms": 0}}"#).unwrap();

        let result = BillingConfig::from_path(file.path());
        assert!(matches!(result, Err(BillingError::ConfigError(_))));
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let result = BillingConfig::from_path(file.path());
        assert!(matches!(result, Err(BillingError::SerializationError(_))));
    }
}
