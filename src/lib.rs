//! Connect to PostgreSQL with a bounded timeout and exponential backoff, and run single
//! parameterized queries whose rows come back keyed by column name.
//!
//! ```rust,no_run
//! use pg_sql_utils::{Query, QueryExecutor};
//!
//! # async fn demo() -> Result<(), pg_sql_utils::SqlUtilsError> {
//! let executor = QueryExecutor::from_env()?;
//! let rows = executor
//!     .try_execute(&Query::new("SELECT name FROM users WHERE id = $1").bind(7))
//!     .await?;
//! for row in &rows {
//!     println!("{:?}", row.get("name"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod backoff;
pub mod config;
pub mod connection_string;
pub mod error;
pub mod executor;
pub mod logging;
pub mod postgres;
pub mod query;
pub mod results;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use acquire::{Acquirer, ConnectFailure, Connector};
pub use backoff::{BackoffSchedule, Sleeper, TokioSleeper};
pub use config::{
    AcquireSettings, ConnectionStringProvider, EnvConnectionString, StaticConnectionString,
};
pub use connection_string::{ConnectionString, SslMode};
pub use error::{ErrorKind, SqlUtilsError};
pub use executor::{DbConnection, QueryExecutor, execute_query};
pub use postgres::{PgConnection, PgConnector};
pub use query::Query;
pub use results::Row;
pub use types::RowValues;
