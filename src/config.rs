//! Server configuration, read from the environment (and `.env` when present).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::domain::settings::{SettingsError, SiteSettings};

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// PostgreSQL connection string. Sessions and orders stay in memory without it.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    /// JSON site settings file. Built-in defaults are used without it.
    pub settings_path: Option<PathBuf>,
    /// How long the order gateway may take before a submission fails.
    pub submit_timeout: Duration,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid PORT value: {0}")]
    InvalidPort(String),

    #[error("invalid SUBMIT_TIMEOUT_SECS value: {0}")]
    InvalidSubmitTimeout(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let port = match var("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };
        let submit_timeout_secs = match var("SUBMIT_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => return Err(ConfigError::InvalidSubmitTimeout(raw)),
            },
            None => DEFAULT_SUBMIT_TIMEOUT_SECS,
        };
        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            nats_subject_prefix: var("NATS_SUBJECT_PREFIX").unwrap_or_else(|| "checkout".to_string()),
            settings_path: var("SETTINGS_PATH").map(PathBuf::from),
            submit_timeout: Duration::from_secs(submit_timeout_secs),
        })
    }

    pub fn socket_addr(&self) -> String { format!("0.0.0.0:{}", self.port) }

    pub fn load_settings(&self) -> Result<SiteSettings, SettingsError> {
        match &self.settings_path {
            Some(path) => SiteSettings::from_json_file(path),
            None => Ok(SiteSettings::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 8083);
        assert_eq!(c.socket_addr(), "0.0.0.0:8083");
        assert!(c.database_url.is_none());
        assert!(c.nats_url.is_none());
        assert_eq!(c.submit_timeout, Duration::from_secs(30));
        assert_eq!(c.load_settings().unwrap(), SiteSettings::default());
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let c = config(&[("PORT", "9000"), ("DATABASE_URL", "postgres://localhost/shop"), ("NATS_URL", "  ")]).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert!(c.nats_url.is_none());
    }

    #[test]
    fn test_bad_port() {
        assert!(matches!(config(&[("PORT", "eighty")]), Err(ConfigError::InvalidPort(_))));
        assert!(matches!(config(&[("SUBMIT_TIMEOUT_SECS", "0")]), Err(ConfigError::InvalidSubmitTimeout(_))));
        assert_eq!(config(&[("SUBMIT_TIMEOUT_SECS", "5")]).unwrap().submit_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_settings_file() {
        let c = config(&[("SETTINGS_PATH", "/nonexistent/settings.json")]).unwrap();
        assert!(matches!(c.load_settings(), Err(SettingsError::Io(..))));
    }
}
