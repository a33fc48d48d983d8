//! Driver configuration.
//!
//! A [`DriverConfig`] names the backend, its connection target and optional
//! credentials, plus the retry policy used for implicit connections. It can
//! be built in code or loaded from TOML:
//!
//! ```toml
//! driver = "sqlite"
//! target = "/var/lib/experiments.db"
//!
//! [retry]
//! attempts = 3
//! backoff_base_ms = 50
//! backoff_max_ms = 2000
//! deadline_ms = 10000
//! ```
//!
//! Validation never touches the backend; it only checks that the fields are
//! present and consistent.

use crate::client::RetryPolicy;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Which concrete driver a configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// In-process key-value driver
    Memory,
    /// Relational driver backed by SQLite
    Sqlite,
}

impl DriverKind {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Memory => "memory",
            DriverKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(DriverKind::Memory),
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            other => Err(Error::Configuration(format!("unknown driver '{}'", other))),
        }
    }
}

/// Username and password presented when connecting.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name
    pub username: String,
    /// Secret, never printed
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Connection retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts used when an operation connects implicitly
    pub attempts: u32,
    /// Delay before the second attempt
    pub backoff_base_ms: u64,
    /// Upper bound for any single delay
    pub backoff_max_ms: u64,
    /// Give up connecting once this much time has passed
    pub deadline_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff_base_ms: 50,
            backoff_max_ms: 2_000,
            deadline_ms: None,
        }
    }
}

impl RetryConfig {
    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(Error::Configuration(
                "retry.attempts must be at least 1".into(),
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(Error::Configuration(format!(
                "retry.backoff_base_ms ({}) exceeds retry.backoff_max_ms ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        if self.deadline_ms == Some(0) {
            return Err(Error::Configuration(
                "retry.deadline_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Convert to the policy consumed by [`crate::ClientCell`]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}

/// Configuration accepted by every driver constructor and by the factory.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Backend to use
    pub driver: DriverKind,
    /// Connection target: namespace for `memory`, file path for `sqlite`
    #[serde(default)]
    pub target: String,
    /// Optional account name
    #[serde(default)]
    pub username: Option<String>,
    /// Optional secret; requires `username`
    #[serde(default)]
    pub password: Option<String>,
    /// Connection retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("driver", &self.driver)
            .field("target", &self.target)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("retry", &self.retry)
            .finish()
    }
}

impl DriverConfig {
    /// Configuration for a driver of the given kind and target
    pub fn new(driver: DriverKind, target: impl Into<String>) -> Self {
        Self {
            driver,
            target: target.into(),
            username: None,
            password: None,
            retry: RetryConfig::default(),
        }
    }

    /// In-memory driver bound to a namespace
    pub fn memory(namespace: impl Into<String>) -> Self {
        Self::new(DriverKind::Memory, namespace)
    }

    /// SQLite driver bound to a database file (or `:memory:`)
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self::new(DriverKind::Sqlite, path.as_ref().to_string_lossy().into_owned())
    }

    /// Attach credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Replace the retry settings
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: DriverConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Credentials, if a username was given
    pub fn credentials(&self) -> Option<Credentials> {
        self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        })
    }

    /// Check required fields without connecting
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "{} driver requires a target",
                self.driver
            )));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::Configuration(
                "password given without username".into(),
            ));
        }
        if matches!(&self.username, Some(u) if u.is_empty()) {
            return Err(Error::Configuration("username must not be empty".into()));
        }
        self.retry.validate()
    }

    /// Validate and additionally require the given driver kind
    pub fn validate_for(&self, expected: DriverKind) -> Result<()> {
        if self.driver != expected {
            return Err(Error::Configuration(format!(
                "configuration selects the {} driver, not {}",
                self.driver, expected
            )));
        }
        self.validate()
    }
}
