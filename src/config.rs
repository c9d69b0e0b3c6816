pub use self::parser::{
    Config, DatabaseConfig, DbType, LoggingConfig, MonitorConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
