//! # rr-config
//!
//! Layered settings: built-in defaults, then `config/rusty-reddit.toml`
//! (optional), then `RUSTY_REDDIT__SECTION__KEY` environment variables.
//! A `.env` file in the working directory is loaded first.

use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Secret used when none is configured. Fine for local runs only.
pub const DEV_SESSION_SECRET: &str = "rusty-reddit-dev-secret-change-me";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub log: LogSettings,
    /// The `.env` file that was read, if any
    #[serde(skip)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// sqlx connection URL, e.g. `sqlite:rusty_reddit.db`
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    /// HMAC key for session tokens
    pub session_secret: SecretString,
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Settings {
    /// Loads `.env`, the optional config file and the environment.
    ///
    /// Runs before logging is set up, so it reports through the returned
    /// value (`env_file`, [`Settings::uses_dev_secret`]) instead of logging.
    pub fn load() -> Result<Self, ConfigError> {
        let env_file = dotenvy::dotenv().ok();
        let builder = Self::defaults()?
            .add_source(File::with_name("config/rusty-reddit").required(false))
            .add_source(
                Environment::with_prefix("RUSTY_REDDIT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        let mut settings = Self::from_builder(builder)?;
        settings.env_file = env_file;
        Ok(settings)
    }

    /// Built-in defaults every deployment starts from.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite:rusty_reddit.db")?
            .set_default("database.max_connections", 5)?
            .set_default("auth.session_secret", DEV_SESSION_SECRET)?
            .set_default("auth.session_ttl_secs", 60 * 60 * 24 * 14)?
            .set_default("log.filter", "info,sqlx=warn")?
            .set_default("log.json", false)?)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session_secret.expose_secret().len() < 16 {
            return Err(ConfigError::Invalid("auth.session_secret must be at least 16 bytes".into()));
        }
        if self.auth.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("auth.session_ttl_secs must be positive".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be positive".into()));
        }
        Ok(())
    }

    /// True when no session secret was configured.
    pub fn uses_dev_secret(&self) -> bool {
        self.auth.session_secret.expose_secret() == DEV_SESSION_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let settings = Settings::from_builder(Settings::defaults().unwrap()).unwrap();
        assert_eq!(settings.server.bind_address(), "127.0.0.1:8080");
        assert_eq!(settings.database.max_connections, 5);
        assert!(settings.uses_dev_secret());
        assert!(settings.env_file.is_none());
        assert!(!settings.log.json);
    }

    #[test]
    fn overrides_win() {
        let builder = Settings::defaults()
            .unwrap()
            .set_override("server.port", 9000)
            .unwrap()
            .set_override("database.url", "sqlite::memory:")
            .unwrap();
        let settings = Settings::from_builder(builder).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.database.url, "sqlite::memory:");
    }

    #[test]
    fn configured_secret_is_not_the_dev_one() {
        let builder = Settings::defaults()
            .unwrap()
            .set_override("auth.session_secret", "a-real-deployment-secret")
            .unwrap();
        let settings = Settings::from_builder(builder).unwrap();
        assert!(!settings.uses_dev_secret());
    }

    #[test]
    fn short_secret_rejected() {
        let builder = Settings::defaults()
            .unwrap()
            .set_override("auth.session_secret", "short")
            .unwrap();
        assert!(matches!(Settings::from_builder(builder), Err(ConfigError::Invalid(_))));
    }
}
