use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_env() -> String {
    DEFAULT_ENV.to_string()
}

impl AppConfig {
    /// Builds a configuration directly from its parts; used by tests and
    /// embedded callers that bypass the file/env layering.
    pub fn new(database_url: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
        }
    }

    /// Loads configuration from `config/{environment}.toml` (if present)
    /// overlaid with `APP_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.into());

        let mut builder = Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?;

        let file = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }

        let cfg: AppConfig = builder
            .add_source(Environment::with_prefix("APP"))
            .build()?
            .try_deserialize()?;

        cfg.validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(cfg)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let cfg = AppConfig::new("sqlite::memory:", "test");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.auto_migrate);
        assert!(!cfg.is_production());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_database_url_fails_validation() {
        let cfg = AppConfig::new("", "test");
        assert!(cfg.validate().is_err());
    }
}
