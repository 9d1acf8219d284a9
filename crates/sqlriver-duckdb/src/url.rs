//! Connection URL parsing
//!
//! Accepted forms: `jdbc:duckdb:<path>`, `duckdb:<path>`, or a bare path.
//! An empty path or `:memory:` opens an in-memory database.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    InMemory,
    File(PathBuf),
}

pub fn parse_url(url: &str) -> DatabaseLocation {
    let rest = url.strip_prefix("jdbc:").unwrap_or(url);
    let rest = rest.strip_prefix("duckdb:").unwrap_or(rest).trim();
    match rest {
        "" | ":memory:" => DatabaseLocation::InMemory,
        path => DatabaseLocation::File(PathBuf::from(path)),
    }
}
