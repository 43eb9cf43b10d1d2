use std::str::FromStr;
use std::time::Duration;

use crate::backoff::BackoffSchedule;
use crate::error::SqlUtilsError;

/// Environment variable holding the connection string.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Source of the connection string.
///
/// Read on every acquisition, so a provider backed by mutable state sees updates.
pub trait ConnectionStringProvider: Send + Sync {
    /// The configured connection string, or `None` when unset.
    fn connection_string(&self) -> Option<String>;

    /// Where the string comes from, for diagnostics when it is missing.
    fn source(&self) -> String {
        "connection string".to_string()
    }
}

/// Reads the connection string from an environment variable (`DATABASE_URL` by default).
///
/// An empty value counts as unset.
#[derive(Debug, Clone)]
pub struct EnvConnectionString {
    var: String,
}

impl EnvConnectionString {
    #[must_use]
    pub fn new() -> Self {
        Self::from_var(DATABASE_URL_VAR)
    }

    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvConnectionString {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStringProvider for EnvConnectionString {
    fn connection_string(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|v| !v.trim().is_empty())
    }

    fn source(&self) -> String {
        self.var.clone()
    }
}

/// A fixed connection string, or none at all.
#[derive(Clone, Default)]
pub struct StaticConnectionString(Option<String>);

impl StaticConnectionString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Some(value.into()))
    }

    #[must_use]
    pub fn unset() -> Self {
        Self(None)
    }
}

impl ConnectionStringProvider for StaticConnectionString {
    fn connection_string(&self) -> Option<String> {
        self.0.clone().filter(|v| !v.trim().is_empty())
    }
}

impl<P: ConnectionStringProvider + ?Sized> ConnectionStringProvider for std::sync::Arc<P> {
    fn connection_string(&self) -> Option<String> {
        (**self).connection_string()
    }

    fn source(&self) -> String {
        (**self).source()
    }
}

/// Timeout and retry budget for acquiring a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireSettings {
    /// Upper bound on a single connection attempt
    pub connect_timeout: Duration,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry
    pub backoff_base: Duration,
}

impl AcquireSettings {
    /// Defaults: 30 s connect timeout, 3 retries, 5 s backoff base.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    #[must_use]
    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::new(self.backoff_base, self.max_retries)
    }

    /// Longest time a single acquisition can take when every attempt times out.
    #[must_use]
    pub fn worst_case_latency(&self) -> Duration {
        self.connect_timeout
            .saturating_mul(self.max_retries.saturating_add(1))
            .saturating_add(self.backoff().total())
    }

    /// Load settings from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `DB_CONNECT_TIMEOUT_SECS` (optional, default: 30)
    /// - `DB_MAX_RETRIES` (optional, default: 3)
    /// - `DB_BACKOFF_BASE_SECS` (optional, default: 5)
    ///
    /// # Errors
    /// Returns `SqlUtilsError::ConfigError` naming the variable if a value does not parse.
    pub fn from_env() -> Result<Self, SqlUtilsError> {
        let defaults = Self::default();
        Ok(Self {
            connect_timeout: env_parsed("DB_CONNECT_TIMEOUT_SECS")?
                .map_or(defaults.connect_timeout, Duration::from_secs),
            max_retries: env_parsed("DB_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            backoff_base: env_parsed("DB_BACKOFF_BASE_SECS")?
                .map_or(defaults.backoff_base, Duration::from_secs),
        })
    }
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

fn env_parsed<T>(key: &str) -> Result<Option<T>, SqlUtilsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| SqlUtilsError::ConfigError(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}
