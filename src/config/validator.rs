use thiserror::Error;

use super::parser::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

// ten years
const MAX_MONITOR_MINUTES: i64 = 60 * 24 * 365 * 10;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database url cannot be empty (set DATABASE_URL or OLX_DATABASE__URL)".to_string(),
            ));
        }

        if self.database.db_type().is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "unsupported database url scheme: {}",
                self.database.redacted_url()
            )));
        }

        if self.database.min_connections() > self.database.max_connections() {
            return Err(ConfigError::InvalidConfig(
                "database.min_connections cannot exceed database.max_connections".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "logging.format must be one of {:?}",
                LOG_FORMATS
            )));
        }

        for (name, value) in [
            (
                "monitor.default_sending_frequency_minutes",
                self.monitor.default_sending_frequency_minutes,
            ),
            (
                "monitor.default_last_minutes_getting",
                self.monitor.default_last_minutes_getting,
            ),
        ] {
            if !(1..=MAX_MONITOR_MINUTES).contains(&value) {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be between 1 and {MAX_MONITOR_MINUTES}, got {value}"
                )));
            }
        }

        Ok(())
    }
}
