//! Test database configuration.
//!
//! A test class supplies the connection string of its test database and,
//! optionally, how test sets are applied. Values can come from code or from
//! the environment (a `.env` file is loaded first if present).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable holding the test database connection string.
pub const DATABASE_URL_ENV: &str = "TESTSET_DATABASE_URL";

/// Environment variable selecting the [`ApplyMode`] (`direct` or `atomic`).
pub const APPLY_MODE_ENV: &str = "TESTSET_APPLY_MODE";

/// Errors while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingVariable(&'static str),

    #[error("Invalid apply mode \"{0}\", expected \"direct\" or \"atomic\"")]
    InvalidApplyMode(String),
}

/// Whether applying a test set is wrapped in a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// Parts are executed as-is. When a part fails, earlier parts stay applied.
    #[default]
    Direct,

    /// Parts are executed inside one transaction that is rolled back when any
    /// part fails. Scripts must not manage transactions themselves.
    Atomic,
}

impl FromStr for ApplyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "atomic" => Ok(Self::Atomic),
            _ => Err(ConfigError::InvalidApplyMode(s.to_string())),
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Atomic => write!(f, "atomic"),
        }
    }
}

/// Connection and apply settings for one test database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDatabaseConfig {
    /// `SQLite` connection string, e.g. `sqlite://target/test.db?mode=rwc`.
    pub connection_string: String,

    #[serde(default)]
    pub apply_mode: ApplyMode,
}

impl TestDatabaseConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            apply_mode: ApplyMode::default(),
        }
    }

    #[must_use]
    pub const fn with_apply_mode(mut self, apply_mode: ApplyMode) -> Self {
        self.apply_mode = apply_mode;
        self
    }

    /// Read the configuration from the environment.
    ///
    /// Loads `.env` from the current directory (or a parent) first; variables
    /// already set in the process take precedence.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Failed to load .env file: {e}");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let connection_string =
            lookup(DATABASE_URL_ENV).ok_or(ConfigError::MissingVariable(DATABASE_URL_ENV))?;
        let apply_mode = match lookup(APPLY_MODE_ENV) {
            Some(value) => value.parse()?,
            None => ApplyMode::default(),
        };

        Ok(Self {
            connection_string,
            apply_mode,
        })
    }
}
