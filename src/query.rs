use crate::types::RowValues;

/// A SQL string and its bound parameters bundled together.
///
/// Parameters are sent to the server through the driver's binding mechanism and never
/// spliced into the SQL text:
/// ```rust
/// use pg_sql_utils::{Query, RowValues};
///
/// let query = Query::new("SELECT name FROM users WHERE id = $1 AND active = $2")
///     .bind(42)
///     .bind(true);
/// assert_eq!(query.params, vec![RowValues::Int(42), RowValues::Bool(true)]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// The SQL query string
    pub sql: String,
    /// The parameters to be bound to the query, in placeholder order
    pub params: Vec<RowValues>,
}

impl Query {
    /// Create a new `Query` with no parameters
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a new `Query` with the given query string and parameters
    pub fn with_params(sql: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Replace the parameter list.
    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = RowValues>) -> Self {
        self.params = params.into_iter().collect();
        self
    }

    /// Append one parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<RowValues>) -> Self {
        self.params.push(value.into());
        self
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}
