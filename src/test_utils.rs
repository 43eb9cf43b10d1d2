//! Throw-away PostgreSQL server for live tests.

use postgresql_embedded::PostgreSQL;
use tracing::warn;

use crate::config::StaticConnectionString;
use crate::logging::LOG_TARGET;

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    /// Connection URL with credentials; carries `sslmode=disable` because the embedded
    /// server has no certificate.
    pub database_url: String,
}

impl EmbeddedPostgres {
    #[must_use]
    pub fn provider(&self) -> StaticConnectionString {
        StaticConnectionString::new(self.database_url.clone())
    }
}

/// Set up an embedded `PostgreSQL` instance and create `db_name` in it.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up, started, or if the database
/// cannot be created.
pub async fn setup_postgres_embedded(
    db_name: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let mut postgresql = PostgreSQL::default();

    // Setup PostgreSQL binaries (bundled, so no download conflicts)
    postgresql.setup().await?;
    postgresql.start().await?;

    let settings = postgresql.settings();
    let port = settings.port;
    let database_url = format!(
        "postgres://{}:{}@{}:{port}/{db_name}?sslmode=disable",
        settings.username, settings.password, settings.host
    );

    postgresql.create_database(db_name).await?;

    Ok(EmbeddedPostgres {
        postgresql,
        port,
        database_url,
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
///
/// A failed stop is logged rather than returned so teardown never masks the test's own result.
pub async fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, port, .. } = postgres;
    if let Err(e) = postgresql.stop().await {
        warn!(target: LOG_TARGET, error = %e, port, "failed to stop embedded PostgreSQL");
    }
}
