//! Row stream contract: connect → prepare → execute → advance one row at a time
//!
//! Each stage borrows from the previous one, so a cursor can never outlive
//! its statement and a statement can never outlive its connection. Dropping
//! them in reverse order releases the per-cycle resources.

use crate::document::FieldValue;
use crate::error::SourceError;

/// Receives the typed events emitted while one row is materialized.
pub trait RowListener {
    /// One event per output column, in column order.
    fn field(&mut self, name: &str, value: FieldValue);

    /// Exactly one event per row. `None` lets the backend assign an identifier.
    fn id(&mut self, id: Option<String>);
}

/// Parameters needed to open a data-source connection.
#[derive(Clone, Default)]
pub struct ConnectParams {
    pub driver: String,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Entry point of a data source. Shared by the poll worker across cycles.
pub trait SqlDriver: Send + Sync + 'static {
    type Connection: SqlConnection;

    /// Identifier this driver answers to (e.g. `"duckdb"`)
    fn id(&self) -> &'static str;

    fn connect(&self, params: &ConnectParams) -> Result<Self::Connection, SourceError>;
}

pub trait SqlConnection {
    type Statement<'conn>: SqlStatement
    where
        Self: 'conn;

    fn prepare(&self, sql: &str) -> Result<Self::Statement<'_>, SourceError>;
}

pub trait SqlStatement {
    type Cursor<'stmt>: RowCursor
    where
        Self: 'stmt;

    /// Run the (parameterless) statement and open a cursor over its results.
    fn execute(&mut self) -> Result<Self::Cursor<'_>, SourceError>;
}

/// Streaming cursor. At most one row is materialized at a time.
pub trait RowCursor {
    /// Materialize the next row into `listener`.
    ///
    /// Returns `Ok(false)` once the result set is exhausted. On `Ok(true)`
    /// every field event and the identifier event have been delivered.
    fn advance(&mut self, listener: &mut dyn RowListener) -> Result<bool, SourceError>;
}
