use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::Client;
use tracing::warn;

use crate::error::SqlUtilsError;
use crate::executor::DbConnection;
use crate::logging::LOG_TARGET;
use crate::query::Query;
use crate::results::Row;

use super::params::Params;
use super::query::build_rows;

/// One open PostgreSQL session and the task driving its socket.
pub struct PgConnection {
    client: Client,
    driver: JoinHandle<()>,
}

impl PgConnection {
    pub(crate) fn new(client: Client, driver: JoinHandle<()>) -> Self {
        Self { client, driver }
    }

    /// The underlying client, for anything beyond a single query.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl DbConnection for PgConnection {
    async fn query(&mut self, query: &Query) -> Result<Vec<Row>, SqlUtilsError> {
        let stmt = self
            .client
            .prepare(&query.sql)
            .await
            .map_err(|e| SqlUtilsError::QueryError(format!("postgres prepare error: {e}")))?;
        let converted = Params::convert(&query.params);
        let rows = self
            .client
            .query(&stmt, converted.as_refs())
            .await
            .map_err(|e| SqlUtilsError::QueryError(format!("postgres select error: {e}")))?;
        build_rows(stmt.columns(), &rows)
    }

    async fn close(self) {
        let Self { client, driver } = self;
        // Dropping the last client handle makes the driver send Terminate and finish.
        drop(client);
        if let Err(e) = driver.await {
            warn!(target: LOG_TARGET, error = %e, "PostgreSQL connection task failed");
        }
    }
}
