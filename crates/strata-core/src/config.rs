//! Strata configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl StrataConfig {
    /// Load config from the default path (~/.strata/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StrataError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| StrataError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.interval_minutes == 0 {
            return Err(StrataError::Config(
                "scheduler.interval_minutes must be at least 1".into(),
            ));
        }
        if self.scheduler.max_concurrent_dispatch == 0 {
            return Err(StrataError::Config(
                "scheduler.max_concurrent_dispatch must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Strata home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".strata")
    }
}

/// Due-date scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Upper bound on notifications being delivered at once within a pass.
    #[serde(default = "default_max_concurrent_dispatch")]
    pub max_concurrent_dispatch: usize,
    /// Mirror the dedup ledger into the database so restarts don't re-notify.
    #[serde(default = "bool_true")]
    pub persist_ledger: bool,
}

fn bool_true() -> bool { true }
fn default_interval_minutes() -> u64 { 60 }
fn default_max_concurrent_dispatch() -> usize { 4 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            max_concurrent_dispatch: default_max_concurrent_dispatch(),
            persist_ledger: true,
        }
    }
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.strata/strata.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl DatabaseConfig {
    /// Database path with `~` and env vars expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Outbound webhook that receives every due-date notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StrataConfig::from_toml("").unwrap();
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.interval_minutes, 60);
        assert_eq!(config.scheduler.max_concurrent_dispatch, 4);
        assert!(config.webhook.is_none());
        assert_eq!(config.database.path, "~/.strata/strata.db");
    }

    #[test]
    fn test_partial_override() {
        let config = StrataConfig::from_toml(
            r#"
            [scheduler]
            interval_minutes = 15

            [webhook]
            url = "https://hooks.example.com/strata"
            headers = [["Authorization", "Bearer abc"]]
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.interval_minutes, 15);
        assert!(config.scheduler.persist_ledger);
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.headers.len(), 1);
        assert_eq!(webhook.headers[0].0, "Authorization");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = StrataConfig::from_toml("[scheduler]\ninterval_minutes = 0").unwrap_err();
        assert!(matches!(err, StrataError::Config(_)));
    }

    #[test]
    fn test_save_roundtrip_file() {
        let dir = std::env::temp_dir().join("strata-config-test");
        let path = dir.join("config.toml");
        let mut config = StrataConfig::default();
        config.scheduler.interval_minutes = 5;
        config.save_to(&path).unwrap();
        let loaded = StrataConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.interval_minutes, 5);
        std::fs::remove_dir_all(&dir).ok();
    }
}
