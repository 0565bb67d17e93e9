//! Engine configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::types::{LedgerError, LedgerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// PostgreSQL connection URL. `DATABASE_URL` overrides it when set.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Upper bound on one transfer, after which it is rolled back and
    /// reported as cancelled. `None` disables the limit.
    pub transfer_timeout_ms: Option<u64>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
            transfer_timeout_ms: Some(5000),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text, applying environment overrides
    pub fn from_yaml_str(content: &str) -> LedgerResult<Self> {
        let mut config: LedgerConfig = serde_yaml::from_str(content)
            .map_err(|e| LedgerError::Config(format!("invalid config: {}", e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database_url = Some(url);
            }
        }
    }

    fn validate(&self) -> LedgerResult<()> {
        if self.max_connections == 0 {
            return Err(LedgerError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.transfer_timeout_ms == Some(0) {
            return Err(LedgerError::Config(
                "transfer_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Pool acquire timeout as a `Duration`
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Transfer timeout as a `Duration`, if one is configured
    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = LedgerConfig::from_yaml_str("log_level: debug\n").unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.transfer_timeout(), Some(Duration::from_millis(5000)));
        assert!(!config.log_json);
    }

    #[test]
    fn test_timeout_can_be_disabled() {
        let config = LedgerConfig::from_yaml_str("transfer_timeout_ms: null\n").unwrap();
        assert_eq!(config.transfer_timeout(), None);
    }

    #[test]
    fn test_rejects_zero_pool_size() {
        let err = LedgerConfig::from_yaml_str("max_connections: 0\n").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        let err = LedgerConfig::from_yaml_str("max_connections: [").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ledger-config-{}.yaml", std::process::id()));
        fs::write(&path, "acquire_timeout_secs: 2\nlog_json: true\n").unwrap();

        let config = LedgerConfig::load(&path).unwrap();
        assert_eq!(config.acquire_timeout(), Duration::from_secs(2));
        assert!(config.log_json);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = LedgerConfig::load("/nonexistent/ledger.yaml").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}
