//! Connection acquisition with a bounded timeout and exponential backoff.
//!
//! [`Acquirer`] reads the connection string from a [`ConnectionStringProvider`], makes sure it
//! asks for TLS, and hands it to a [`Connector`]. Operational failures are retried up to
//! `max_retries` times, sleeping `backoff_base * 2^n` before retry `n`; anything else ends
//! the acquisition immediately.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::backoff::{Sleeper, TokioSleeper};
use crate::config::{AcquireSettings, ConnectionStringProvider};
use crate::connection_string::ConnectionString;
use crate::error::SqlUtilsError;
use crate::logging::LOG_TARGET;

/// Why a single connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Host unreachable, authentication rejected, timeout expired. Worth retrying.
    Operational(String),
    /// Anything retrying cannot fix, such as an unparsable connection string.
    Fatal(String),
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectFailure::Operational(msg) | ConnectFailure::Fatal(msg) => f.write_str(msg),
        }
    }
}

/// Opens one database session.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Send;

    /// Make a single attempt, giving up after `timeout`.
    async fn connect(
        &self,
        connection_string: &ConnectionString,
        timeout: Duration,
    ) -> Result<Self::Connection, ConnectFailure>;
}

enum AttemptOutcome<C> {
    Connected(C),
    Retry { delay: Duration, error: String },
    Failed(SqlUtilsError),
}

/// Obtains live connections from a configured connection string.
pub struct Acquirer<P, C, S = TokioSleeper> {
    provider: P,
    connector: C,
    sleeper: S,
    settings: AcquireSettings,
}

impl<P, C> Acquirer<P, C, TokioSleeper> {
    pub fn new(provider: P, connector: C, settings: AcquireSettings) -> Self {
        Self {
            provider,
            connector,
            sleeper: TokioSleeper,
            settings,
        }
    }
}

impl<P, C, S> Acquirer<P, C, S> {
    /// Swap the backoff sleeper, e.g. for one that records delays instead of waiting.
    pub fn with_sleeper<S2>(self, sleeper: S2) -> Acquirer<P, C, S2> {
        Acquirer {
            provider: self.provider,
            connector: self.connector,
            sleeper,
            settings: self.settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &AcquireSettings {
        &self.settings
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<P, C, S> Acquirer<P, C, S>
where
    P: ConnectionStringProvider,
    C: Connector,
    S: Sleeper,
{
    /// Acquire a connection, starting with a fresh retry budget.
    ///
    /// # Errors
    /// See [`Acquirer::acquire_from`].
    pub async fn acquire(&self) -> Result<C::Connection, SqlUtilsError> {
        self.acquire_from(0).await
    }

    /// Acquire a connection as if `retry_count` retries had already been spent.
    ///
    /// # Errors
    /// - `SqlUtilsError::ConfigError` if no connection string is configured. No attempt is made.
    /// - `SqlUtilsError::ConnectionError` if an attempt fails in a way retrying cannot fix.
    /// - `SqlUtilsError::ConnectionExhausted` once the retry budget is spent.
    pub async fn acquire_from(&self, retry_count: u32) -> Result<C::Connection, SqlUtilsError> {
        let Some(raw) = self.provider.connection_string() else {
            let source = self.provider.source();
            error!(target: LOG_TARGET, "ERROR: {source} is not set!");
            return Err(SqlUtilsError::ConfigError(format!("{source} is not set")));
        };
        let connection_string = ConnectionString::new(raw).with_transport_security();

        info!(target: LOG_TARGET, "Attempting DB connection to: {connection_string}");
        info!(
            target: LOG_TARGET,
            "Connect timeout: {}s",
            self.settings.connect_timeout.as_secs()
        );

        let mut retry = retry_count;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.attempt(&connection_string, retry, attempts).await {
                AttemptOutcome::Connected(conn) => {
                    info!(target: LOG_TARGET, "Database connection established successfully");
                    return Ok(conn);
                }
                AttemptOutcome::Retry { delay, error } => {
                    warn!(
                        target: LOG_TARGET,
                        "Could not connect to the database: {error}. Retrying in {}s (retry {}/{})",
                        delay.as_secs(),
                        retry + 1,
                        self.settings.max_retries
                    );
                    self.sleeper.sleep(delay).await;
                    retry += 1;
                }
                AttemptOutcome::Failed(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        connection_string: &ConnectionString,
        retry: u32,
        attempts: u32,
    ) -> AttemptOutcome<C::Connection> {
        let result = self
            .connector
            .connect(connection_string, self.settings.connect_timeout)
            .await;

        match result {
            Ok(conn) => AttemptOutcome::Connected(conn),
            Err(ConnectFailure::Operational(msg)) => {
                let msg = connection_string.redact(&msg);
                if retry < self.settings.max_retries {
                    AttemptOutcome::Retry {
                        delay: self.settings.backoff().delay_for(retry),
                        error: msg,
                    }
                } else {
                    error!(
                        target: LOG_TARGET,
                        "ERROR: Could not connect to the database after {attempts} attempts: {msg}"
                    );
                    AttemptOutcome::Failed(SqlUtilsError::ConnectionExhausted {
                        attempts,
                        last_error: msg,
                    })
                }
            }
            Err(ConnectFailure::Fatal(msg)) => {
                let msg = connection_string.redact(&msg);
                error!(
                    target: LOG_TARGET,
                    "ERROR: Unexpected error connecting to database: {msg}"
                );
                AttemptOutcome::Failed(SqlUtilsError::ConnectionError(msg))
            }
        }
    }
}
