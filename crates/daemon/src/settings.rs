// Daemon settings
//
// Sources, lowest precedence first: built-in defaults, the optional
// `config/entitlement.toml`, then `ENTITLEMENT__<SECTION>__<KEY>` variables
// (e.g. `ENTITLEMENT__DATABASE__URL`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use entitlement_core::application::constants::{
    DEFAULT_RETRY_BACKOFF_FACTOR, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS,
    IDLE_SLEEP_DURATION,
};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/entitlement";
const ENV_PREFIX: &str = "ENTITLEMENT";
const DEFAULT_DB_PATH: &str = "~/.entitlement/entitlement.db";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub queue: QueueSettings,
    pub retry: RetrySettings,
    pub context: ContextSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite path or URL; `~` is expanded
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Daily rolling JSON files are written here when set
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub base_delay_ms: i64,
    pub backoff_factor: f64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextSettings {
    /// Offset of the account reference time zone from UTC
    pub time_zone_offset_secs: i32,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database.url", DEFAULT_DB_PATH)?
        .set_default("log.format", "pretty")?
        .set_default("queue.poll_interval_ms", IDLE_SLEEP_DURATION.as_millis() as i64)?
        .set_default("retry.base_delay_ms", DEFAULT_RETRY_BASE_DELAY_MS)?
        .set_default("retry.backoff_factor", DEFAULT_RETRY_BACKOFF_FACTOR)?
        .set_default("retry.max_attempts", i64::from(DEFAULT_RETRY_MAX_ATTEMPTS))?
        .set_default("context.time_zone_offset_secs", 0i64)
}
