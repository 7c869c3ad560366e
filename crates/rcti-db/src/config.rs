//! # Configuration
//!
//! Runtime configuration for the store layer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RCTI_DATABASE_PATH=/srv/rcti/rcti.db                               │
//! │     RCTI_BUSY_TIMEOUT_MS=10000                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/rcti-ledger/rcti.toml (Linux)                            │
//! │     ~/Library/Application Support/au.rcti.ledger/rcti.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/srv/rcti/rcti.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [invoicing]
//! max_number_attempts = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;

/// File name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "rcti.toml";

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; `:memory:` for a throwaway database.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long a writer waits for another writer's lock (milliseconds).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("au", "rcti", "ledger")
        .map(|dirs| dirs.data_dir().join("rcti.db"))
        .unwrap_or_else(|| PathBuf::from("rcti.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Invoicing Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicingSettings {
    /// How many invoice numbers to try before giving up on a UNIQUE clash.
    #[serde(default = "default_max_number_attempts")]
    pub max_number_attempts: u32,
}

fn default_max_number_attempts() -> u32 {
    5
}

impl Default for InvoicingSettings {
    fn default() -> Self {
        InvoicingSettings {
            max_number_attempts: default_max_number_attempts(),
        }
    }
}

// =============================================================================
// Root Config
// =============================================================================

/// Complete store-layer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RctiConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub invoicing: InvoicingSettings,
}

impl RctiConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`rcti.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections cannot exceed max_connections".into(),
            ));
        }

        if self.invoicing.max_number_attempts == 0 {
            return Err(ConfigError::Invalid(
                "invoicing.max_number_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("RCTI_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("RCTI_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid RCTI_MAX_CONNECTIONS"),
            }
        }

        if let Ok(timeout) = std::env::var("RCTI_BUSY_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.database.busy_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid RCTI_BUSY_TIMEOUT_MS"),
            }
        }

        if let Ok(attempts) = std::env::var("RCTI_MAX_NUMBER_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.invoicing.max_number_attempts = n;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("au", "rcti", "ledger")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Pool settings for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        let db = &self.database;
        let base = if db.path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(db.path.clone())
                .max_connections(db.max_connections)
                .min_connections(db.min_connections)
        };

        base.connect_timeout(Duration::from_secs(db.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(db.busy_timeout_ms))
            .run_migrations(db.run_migrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RctiConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.invoicing.max_number_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"/tmp/ledger.db\"\nbusy_timeout_ms = 250").unwrap();

        let config: RctiConfig =
            toml::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/ledger.db"));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.invoicing.max_number_attempts, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = RctiConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = RctiConfig::default();
        config.invoicing.max_number_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RctiConfig::default();
        config.database.min_connections = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_config_conversion() {
        let mut config = RctiConfig::default();
        config.database.path = PathBuf::from(":memory:");
        config.database.busy_timeout_ms = 1_500;

        let db = config.db_config();
        assert_eq!(db.max_connections, 1);
        assert_eq!(db.busy_timeout, Duration::from_millis(1_500));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&RctiConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[invoicing]"));
    }

    #[test]
    fn test_save_then_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = RctiConfig::default();
        config.invoicing.max_number_attempts = 9;
        config.save(Some(path.clone())).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let reloaded: RctiConfig = toml::from_str(&text).unwrap();
        assert_eq!(reloaded.invoicing.max_number_attempts, 9);
    }
}
