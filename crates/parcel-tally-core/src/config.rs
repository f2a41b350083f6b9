use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

pub const DEFAULT_DATABASE_PATH: &str = "parcel_tally.db";
pub const DEFAULT_RECENT_ACTIVITY_LIMIT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_path: String,
    pub recent_activity_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            recent_activity_limit: DEFAULT_RECENT_ACTIVITY_LIMIT,
        }
    }
}

/// Defaults, then `Config.toml` if present, then `PARCEL_TALLY_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_from("Config")
}

pub fn load_from(file_stem: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .set_default("database_path", DEFAULT_DATABASE_PATH)?
        .set_default("recent_activity_limit", DEFAULT_RECENT_ACTIVITY_LIMIT as u64)?
        .add_source(ConfigFile::with_name(file_stem).required(false))
        .add_source(Environment::with_prefix("PARCEL_TALLY").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
