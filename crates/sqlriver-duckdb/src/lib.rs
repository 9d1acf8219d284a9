//! sqlriver-duckdb: DuckDB row source
//!
//! Implements the `SqlDriver` chain over a DuckDB database file (or an
//! in-memory database) and maps DuckDB values onto document scalars.

mod url;
mod value;

pub use url::{DatabaseLocation, parse_url};
pub use value::{emit_row, map_value};

use duckdb::{Connection, Rows, Statement};
use sqlriver_core::{
    ConnectParams, RowCursor, RowListener, SourceError, SqlConnection, SqlDriver, SqlStatement,
};

/// Identifier this driver is registered under.
pub const DRIVER_ID: &str = "duckdb";

/// Look up a driver by identifier.
///
/// DuckDB is the only bundled driver; any other identifier is a
/// configuration error.
pub fn driver(id: &str) -> Result<DuckDbDriver, SourceError> {
    if id.eq_ignore_ascii_case(DRIVER_ID) {
        Ok(DuckDbDriver)
    } else {
        Err(SourceError::UnknownDriver(id.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDriver;

impl SqlDriver for DuckDbDriver {
    type Connection = DuckDbConnection;

    fn id(&self) -> &'static str {
        DRIVER_ID
    }

    fn connect(&self, params: &ConnectParams) -> Result<DuckDbConnection, SourceError> {
        if params.username.is_some() || params.password.is_some() {
            log::debug!("duckdb has no authentication, ignoring username/password");
        }
        let conn = match parse_url(&params.url) {
            DatabaseLocation::InMemory => Connection::open_in_memory(),
            DatabaseLocation::File(path) => Connection::open(&path),
        }
        .map_err(|e| SourceError::Connect(Box::new(e)))?;
        Ok(DuckDbConnection { conn })
    }
}

/// Open database handle for one poll cycle.
pub struct DuckDbConnection {
    conn: Connection,
}

impl DuckDbConnection {
    /// Run setup statements (tests, fixtures). Not used by the poll loop.
    pub fn execute_batch(&self, sql: &str) -> Result<(), SourceError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SourceError::Execute(Box::new(e)))
    }
}

impl SqlConnection for DuckDbConnection {
    type Statement<'conn>
        = DuckDbStatement<'conn>
    where
        Self: 'conn;

    fn prepare(&self, sql: &str) -> Result<DuckDbStatement<'_>, SourceError> {
        let stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SourceError::Prepare(Box::new(e)))?;
        Ok(DuckDbStatement { stmt })
    }
}

pub struct DuckDbStatement<'conn> {
    stmt: Statement<'conn>,
}

impl SqlStatement for DuckDbStatement<'_> {
    type Cursor<'stmt>
        = DuckDbCursor<'stmt>
    where
        Self: 'stmt;

    fn execute(&mut self) -> Result<DuckDbCursor<'_>, SourceError> {
        let rows = self
            .stmt
            .query([])
            .map_err(|e| SourceError::Execute(Box::new(e)))?;
        // column names are only known once the statement has run
        let columns = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();
        Ok(DuckDbCursor { rows, columns })
    }
}

/// Forward-only cursor; one row is materialized per `advance`.
pub struct DuckDbCursor<'stmt> {
    rows: Rows<'stmt>,
    columns: Vec<String>,
}

impl DuckDbCursor<'_> {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl RowCursor for DuckDbCursor<'_> {
    fn advance(&mut self, listener: &mut dyn RowListener) -> Result<bool, SourceError> {
        let row = match self.rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(false),
            Err(e) => return Err(SourceError::Fetch(Box::new(e))),
        };
        emit_row(row, &self.columns, listener)?;
        Ok(true)
    }
}
