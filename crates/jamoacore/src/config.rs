use std::env;

use secrecy::{ExposeSecret, SecretString};

use crate::error::AppError;

/// Process configuration, read from the environment once at startup and
/// passed into components explicitly. No component reads `env` after
/// this struct is built.
#[derive(Debug)]
pub struct Config {
    /// Bot token (BOT_TOKEN or TELOXIDE_TOKEN). Optional so db-only
    /// subcommands can run without one; the bot itself requires it.
    pub bot_token: Option<SecretString>,
    /// Path to the SQLite database file (DATABASE_PATH, default `jamoa.sqlite`)
    pub database_path: String,
    /// Path to the log file (LOG_FILE_PATH, default `jamoa.log`)
    pub log_file_path: String,
    /// Telegram id of the single super-admin (SUPER_ADMIN). 0 disables
    /// the super-admin panel entirely; 0 is never a valid Telegram id.
    pub super_admin_id: i64,
    /// Fernet key for card encryption at rest (ENCRYPTION_KEY, required)
    pub encryption_key: SecretString,
    /// Custom Bot API server URL (BOT_API_URL, optional)
    pub bot_api_url: Option<String>,
    /// Public URL to self-ping so free-tier hosts don't idle the
    /// instance out (KEEPALIVE_URL, optional)
    pub keepalive_url: Option<String>,
    /// Port for the /health endpoint (HEALTH_PORT, optional)
    pub health_port: Option<u16>,
}

impl Config {
    /// Reads configuration from the environment.
    ///
    /// # Errors
    /// Returns `AppError::Config` if ENCRYPTION_KEY is missing or a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        let encryption_key = env::var("ENCRYPTION_KEY")
            .map_err(|_| AppError::Config("ENCRYPTION_KEY is not set".to_string()))?;

        let super_admin_id = match env::var("SUPER_ADMIN") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| AppError::Config(format!("SUPER_ADMIN is not a numeric id: {raw}")))?,
            Err(_) => 0,
        };

        let health_port = match env::var("HEALTH_PORT") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .map_err(|_| AppError::Config(format!("HEALTH_PORT is not a port number: {raw}")))?,
            ),
            Err(_) => None,
        };

        let bot_token = env::var("BOT_TOKEN")
            .or_else(|_| env::var("TELOXIDE_TOKEN"))
            .ok()
            .map(SecretString::from);

        Ok(Self {
            bot_token,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "jamoa.sqlite".to_string()),
            log_file_path: env::var("LOG_FILE_PATH").unwrap_or_else(|_| "jamoa.log".to_string()),
            super_admin_id,
            encryption_key: SecretString::from(encryption_key),
            bot_api_url: env::var("BOT_API_URL").ok(),
            keepalive_url: env::var("KEEPALIVE_URL").ok(),
            health_port,
        })
    }

    /// The Fernet key as a &str for cipher construction.
    pub fn encryption_key(&self) -> &str {
        self.encryption_key.expose_secret()
    }

    /// The bot token, when one is configured.
    pub fn bot_token(&self) -> Option<&str> {
        self.bot_token.as_ref().map(|t| t.expose_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_requires_encryption_key() {
        unsafe {
            env::remove_var("ENCRYPTION_KEY");
        }
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn from_env_defaults() {
        unsafe {
            env::set_var("ENCRYPTION_KEY", crate::crypto::CardCipher::generate_key());
            env::remove_var("SUPER_ADMIN");
            env::remove_var("DATABASE_PATH");
            env::remove_var("HEALTH_PORT");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.database_path, "jamoa.sqlite");
        assert_eq!(config.super_admin_id, 0);
        assert!(config.health_port.is_none());
    }

    #[test]
    #[serial]
    fn from_env_rejects_bad_super_admin() {
        unsafe {
            env::set_var("ENCRYPTION_KEY", crate::crypto::CardCipher::generate_key());
            env::set_var("SUPER_ADMIN", "not-a-number");
        }
        assert!(Config::from_env().is_err());
        unsafe {
            env::remove_var("SUPER_ADMIN");
        }
    }
}
