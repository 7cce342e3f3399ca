use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for EXPORT_LOCK_TIMEOUT_MS: {0}")]
    InvalidLockTimeout(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_url: String,
    /// Upper bound on waiting for a branch's export state lock. Default: server setting.
    pub lock_timeout_ms: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source; `from_env` uses the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let lock_timeout_ms = match lookup("EXPORT_LOCK_TIMEOUT_MS") {
            Some(val) => Some(
                val.parse::<u64>()
                    .map_err(|_| ConfigError::InvalidLockTimeout(val))?,
            ),
            None => None,
        };

        Ok(Self {
            db_url,
            lock_timeout_ms,
        })
    }
}
