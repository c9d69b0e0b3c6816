use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ::config::{Environment, File};
use serde::{Deserialize, Serialize};

use super::ConfigError;

pub const ENV_PREFIX: &str = "OLX";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        self.url.clone().unwrap_or_default()
    }

    pub fn db_type(&self) -> Option<DbType> {
        let url = self.connection_string();
        if url.starts_with("sqlite://") {
            Some(DbType::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(DbType::Postgres)
        } else {
            None
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        match self.db_type() {
            Some(DbType::Sqlite) => {
                let url = self.connection_string();
                url.strip_prefix("sqlite://").map(str::to_string)
            }
            _ => None,
        }
    }

    pub fn max_connections(&self) -> u32 {
        match self.db_type() {
            Some(DbType::Sqlite) => 1,
            _ => self.max_connections.unwrap_or(10),
        }
    }

    pub fn min_connections(&self) -> u32 {
        match self.db_type() {
            Some(DbType::Sqlite) => 1,
            _ => self.min_connections.unwrap_or(1),
        }
    }

    /// Connection string safe to print: the password, if any, is masked.
    pub fn redacted_url(&self) -> String {
        let raw = self.connection_string();
        if self.db_type() == Some(DbType::Sqlite) {
            return raw;
        }

        match url::Url::parse(&raw) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => "<unparseable database url>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_sending_frequency_minutes")]
    pub default_sending_frequency_minutes: i64,
    #[serde(default = "default_last_minutes_getting")]
    pub default_last_minutes_getting: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_sending_frequency_minutes: default_sending_frequency_minutes(),
            default_last_minutes_getting: default_last_minutes_getting(),
        }
    }
}

impl MonitorConfig {
    /// Lookback used for tasks that have never been served.
    pub fn default_lookback_minutes(&self) -> i64 {
        self.default_sending_frequency_minutes
            .max(self.default_last_minutes_getting)
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    pub fn load_with_env(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let settings = ::config::Config::builder()
            .add_source(File::from(path.as_path()).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply_env_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(value) = env.get("DATABASE_URL") {
            self.database.url = Some(value.clone());
        }
        if let Some(value) = env.get("OLX_DEFAULT_SENDING_FREQUENCY_MINUTES") {
            self.monitor.default_sending_frequency_minutes =
                parse_minutes("OLX_DEFAULT_SENDING_FREQUENCY_MINUTES", value)?;
        }
        if let Some(value) = env.get("OLX_DEFAULT_LAST_MINUTES_GETTING") {
            self.monitor.default_last_minutes_getting =
                parse_minutes("OLX_DEFAULT_LAST_MINUTES_GETTING", value)?;
        }
        Ok(())
    }
}

fn parse_minutes(name: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| {
        ConfigError::InvalidConfig(format!("{name} must be an integer, got {value:?}"))
    })
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_sending_frequency_minutes() -> i64 {
    1
}

fn default_last_minutes_getting() -> i64 {
    60
}
