// PostgreSQL module - the tokio-postgres backend
//
// - connector: opens TLS-capable sessions under a timeout
// - connection: runs a query on one session and closes it
// - params: binds RowValues as query parameters
// - query: turns fetched rows into Row mappings
// - wire: binary formats the driver does not decode (numeric, timetz, interval)

pub mod connection;
pub mod connector;
pub mod params;
pub mod query;
mod wire;

pub use connection::PgConnection;
pub use connector::PgConnector;
pub use params::Params;
pub use query::build_rows;
