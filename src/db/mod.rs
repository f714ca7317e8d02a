pub mod executor;
pub mod guard;
pub mod pool;
pub mod schema;

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt;

/// Ordered result of one executed query. Column order follows the
/// database cursor; row maps preserve it (serde_json preserve_order).
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug)]
pub enum DbError {
    /// Introspection of table/column metadata failed.
    Schema(String),
    /// Generated SQL hit the mutation denylist; it was never executed.
    UnsafeQuery(String),
    /// The database rejected or failed the statement.
    Execution(String),
    /// Pool initialization or connection acquisition failed.
    Pool(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Schema(msg) => write!(f, "schema introspection error: {}", msg),
            DbError::UnsafeQuery(msg) => write!(f, "unsafe query rejected: {}", msg),
            DbError::Execution(msg) => write!(f, "query execution error: {}", msg),
            DbError::Pool(msg) => write!(f, "database pool error: {}", msg),
        }
    }
}

impl Error for DbError {}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Execution(err.to_string())
    }
}
