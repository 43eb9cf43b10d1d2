use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlUtilsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection attempts exhausted after {attempts} tries: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

/// Coarse failure cause, for callers that branch on why a call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    ConnectionExhausted,
    Connection,
    Query,
}

impl SqlUtilsError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SqlUtilsError::ConfigError(_) => ErrorKind::Configuration,
            SqlUtilsError::ConnectionExhausted { .. } => ErrorKind::ConnectionExhausted,
            SqlUtilsError::ConnectionError(_) => ErrorKind::Connection,
            SqlUtilsError::QueryError(_) => ErrorKind::Query,
        }
    }
}
