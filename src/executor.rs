use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::error;

use crate::acquire::{Acquirer, Connector};
use crate::backoff::{Sleeper, TokioSleeper};
use crate::config::{AcquireSettings, ConnectionStringProvider, EnvConnectionString};
use crate::error::{ErrorKind, SqlUtilsError};
use crate::logging::LOG_TARGET;
use crate::postgres::PgConnector;
use crate::query::Query;
use crate::results::Row;

/// An open session that can run one query at a time.
#[async_trait]
pub trait DbConnection: Send + Sized {
    /// Run `query` with its bound parameters and fetch every resulting row.
    ///
    /// # Errors
    /// Returns `SqlUtilsError::QueryError` if execution or row conversion fails.
    async fn query(&mut self, query: &Query) -> Result<Vec<Row>, SqlUtilsError>;

    /// Close the session.
    async fn close(self);
}

/// Runs single queries, each on its own freshly acquired connection.
///
/// There is no pooling: every call opens one physical connection and closes it before
/// returning, whatever the outcome.
pub struct QueryExecutor<P, C, S = TokioSleeper> {
    acquirer: Acquirer<P, C, S>,
}

impl QueryExecutor<EnvConnectionString, PgConnector> {
    /// PostgreSQL executor reading `DATABASE_URL` and the `DB_*` settings variables.
    ///
    /// # Errors
    /// Returns `SqlUtilsError::ConfigError` if a settings variable does not parse.
    pub fn from_env() -> Result<Self, SqlUtilsError> {
        let settings = AcquireSettings::from_env()?;
        Ok(Self::new(Acquirer::new(
            EnvConnectionString::new(),
            PgConnector::new(),
            settings,
        )))
    }
}

impl<P, C, S> QueryExecutor<P, C, S> {
    pub fn new(acquirer: Acquirer<P, C, S>) -> Self {
        Self { acquirer }
    }

    pub fn acquirer(&self) -> &Acquirer<P, C, S> {
        &self.acquirer
    }
}

impl<P, C, S> QueryExecutor<P, C, S>
where
    P: ConnectionStringProvider,
    C: Connector,
    C::Connection: DbConnection,
    S: Sleeper,
{
    /// Execute `query` and return its rows, or the reason it failed.
    ///
    /// # Errors
    /// Any acquisition error from [`Acquirer::acquire`], or `SqlUtilsError::QueryError` if the
    /// query fails or panics once a connection is open.
    pub async fn try_execute(&self, query: &Query) -> Result<Vec<Row>, SqlUtilsError> {
        let mut conn = self.acquirer.acquire().await?;

        let outcome = AssertUnwindSafe(conn.query(query)).catch_unwind().await;
        conn.close().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(SqlUtilsError::QueryError(format!(
                "query panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Execute `query`, collapsing every failure into `None`.
    ///
    /// Callers that need to tell an unreachable database from a malformed query should use
    /// [`QueryExecutor::try_execute`].
    pub async fn execute(&self, query: &Query) -> Option<Vec<Row>> {
        match self.try_execute(query).await {
            Ok(rows) => Some(rows),
            Err(err) => {
                // acquisition failures were already reported by the acquirer
                if err.kind() == ErrorKind::Query {
                    error!(target: LOG_TARGET, "Error executing query: {err}");
                }
                None
            }
        }
    }
}

/// One-shot helper: build an executor from the environment and run `query` against PostgreSQL.
///
/// Returns `None` on any failure, including unparsable settings variables.
pub async fn execute_query(query: impl Into<Query>) -> Option<Vec<Row>> {
    let executor = match QueryExecutor::from_env() {
        Ok(executor) => executor,
        Err(err) => {
            error!(target: LOG_TARGET, "ERROR: {err}");
            return None;
        }
    };
    executor.execute(&query.into()).await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
