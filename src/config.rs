use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Application configuration with validation.
///
/// Layered from `config/default.toml`, an optional per-environment file, and
/// `STOREFRONT_*` environment variables (highest precedence).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "database_url must not be empty"))]
    pub database_url: String,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Maximum database connections in the pool
    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    /// Minimum database connections in the pool
    #[serde(default = "default_min_connections")]
    pub db_min_connections: u32,
}

impl AppConfig {
    /// Constructs a configuration directly, mainly for tests and embedding.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            db_max_connections: default_max_connections(),
            db_min_connections: default_min_connections(),
        }
    }

    /// Loads configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("STOREFRONT_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
            .add_source(File::from(Path::new(CONFIG_DIR).join(&env)).required(false))
            .add_source(Environment::with_prefix("STOREFRONT").separator("__"));

        builder = builder.set_default("log_level", DEFAULT_LOG_LEVEL)?;

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        info!(environment = %config.environment, "configuration loaded");
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
