use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

use crate::anomaly::AnomalyConfig;
use crate::rules::EvaluatorConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "CONFIG_READ_ERROR",
            ConfigError::Parse { .. } => "CONFIG_PARSE_ERROR",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Env var holding the 64-hex-char card data encryption key
    #[serde(default = "default_encryption_key_env")]
    pub encryption_key_env: String,
    /// PostgreSQL connection URL
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// Seed file for in-memory stores, used when `postgres_url` is absent
    #[serde(default)]
    pub fixtures_path: Option<String>,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
    #[serde(default)]
    pub rules: EvaluatorConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
}

fn default_encryption_key_env() -> String {
    "CARDGATE_ENCRYPTION_KEY".to_string()
}

/// Timeouts for the two raced suspension points of an authorization
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub enrichment_timeout_ms: u64,
    pub sweep_timeout_ms: u64,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            enrichment_timeout_ms: 200,
            sweep_timeout_ms: 300,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "cardgate.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            encryption_key_env: default_encryption_key_env(),
            postgres_url: None,
            fixtures_path: None,
            authorization: AuthorizationConfig::default(),
            rules: EvaluatorConfig::default(),
            anomaly: AnomalyConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: config_path,
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
log_level: debug
log_dir: ./logs
log_file: test.log
use_json: true
rotation: never
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.encryption_key_env, "CARDGATE_ENCRYPTION_KEY");
        assert_eq!(config.authorization.enrichment_timeout_ms, 200);
        assert_eq!(config.authorization.sweep_timeout_ms, 300);
        assert_eq!(config.anomaly.history_limit, 50);
        assert!((config.rules.fuzzy.threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nested_overrides() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: test.log
use_json: false
rotation: daily
authorization:
  sweep_timeout_ms: 50
anomaly:
  z_score_threshold: 2.5
rules:
  fuzzy:
    threshold: 0.8
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.authorization.sweep_timeout_ms, 50);
        assert_eq!(config.authorization.enrichment_timeout_ms, 200);
        assert!((config.anomaly.z_score_threshold - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.anomaly.card_velocity_count, 3);
        assert!((config.rules.fuzzy.threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.rules.fuzzy.min_length, 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::load("does-not-exist").unwrap_err();
        assert_eq!(err.code(), "CONFIG_READ_ERROR");
    }

    #[test]
    fn test_shipped_dev_config_parses() {
        let content = include_str!("../config/dev.yaml");
        let config = AppConfig::from_yaml(content).unwrap();
        assert!(config.postgres_url.is_none());
        assert_eq!(config.fixtures_path.as_deref(), Some("config/fixtures.dev.json"));
    }
}
