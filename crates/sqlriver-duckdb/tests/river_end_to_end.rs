//! Full poll loop over a DuckDB file into the in-memory index backend.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlriver_core::{
    ConnectParams, FieldValue, IndexTarget, Lifecycle, MemoryBackend, Phase, River,
    RiverSettings, SqlDriver, WriterSettings,
};
use sqlriver_duckdb::{DuckDbDriver, driver};

fn seed(path: &Path, rows: usize) {
    let conn = DuckDbDriver
        .connect(&params(path))
        .expect("open fixture database");
    conn.execute_batch(&format!(
        "CREATE TABLE people AS
         SELECT i AS id, 'person ' || i AS name, i % 2 = 0 AS even, DATE '2024-01-01' + i::INTEGER AS joined
         FROM range({rows}) t(i);"
    ))
    .expect("seed fixture");
}

fn params(path: &Path) -> ConnectParams {
    ConnectParams {
        driver: "duckdb".to_string(),
        url: format!("jdbc:duckdb:{}", path.display()),
        ..ConnectParams::default()
    }
}

fn settings(path: &Path, sql: &str, poll_interval: Duration) -> RiverSettings {
    RiverSettings {
        name: "people".to_string(),
        source: params(path),
        sql: sql.to_string(),
        target: IndexTarget::new("people", "person"),
        poll_interval,
        writer: WriterSettings {
            bulk_size: 100,
            ..WriterSettings::default()
        },
        shutdown_timeout: Duration::from_secs(5),
        ..RiverSettings::default()
    }
}

fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !cond() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn one_cycle_batches_and_maps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("people.duckdb");
    seed(&db, 250);

    let backend = Arc::new(MemoryBackend::new());
    let river = River::new(
        driver("duckdb").unwrap(),
        Arc::clone(&backend),
        settings(
            &db,
            "SELECT id AS _id, name, even, joined FROM people ORDER BY id",
            Duration::ZERO,
        ),
    );
    river.prepare_index().unwrap();
    let stats = river.run_once().unwrap();

    assert_eq!(stats.rows, 250);
    let mut sizes = backend.batch_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);
    assert!(backend.has_index("people"));

    let doc = backend.document("people", "3").unwrap();
    assert_eq!(
        doc.to_json().unwrap(),
        r#"{"name":"person 3","even":false,"joined":"2024-01-04"}"#
    );
    assert!(backend
        .batches()
        .iter()
        .all(|b| b.target == IndexTarget::new("people", "person")));
}

#[test]
fn repeated_cycles_overwrite_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("people.duckdb");
    seed(&db, 20);

    let backend = Arc::new(MemoryBackend::new());
    let river = River::new(
        DuckDbDriver,
        Arc::clone(&backend),
        settings(&db, "SELECT id AS _id, name FROM people", Duration::ZERO),
    );
    river.start().unwrap();
    assert!(wait_for(Duration::from_secs(10), || backend.batches().len() >= 3));
    river.close();
    river.join();

    assert_eq!(river.phase(), Phase::Closed);
    assert_eq!(backend.document_count("people"), 20);
    assert_eq!(
        backend.document("people", "7").unwrap().get("name"),
        Some(&FieldValue::String("person 7".into()))
    );
}

#[test]
fn close_during_sleep_returns_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("people.duckdb");
    seed(&db, 5);

    let backend = Arc::new(MemoryBackend::new());
    let river = River::new(
        DuckDbDriver,
        Arc::clone(&backend),
        settings(&db, "SELECT * FROM people", Duration::from_secs(3600)),
    );
    river.start().unwrap();
    assert!(wait_for(Duration::from_secs(10), || river.phase() == Phase::Sleeping));

    let started = Instant::now();
    river.close();
    river.join();
    assert!(started.elapsed() < Duration::from_secs(2));
    // no _id column: identifiers assigned by the backend
    assert_eq!(backend.document_count("people"), 5);
}

#[test]
fn missing_table_stops_river() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("empty.duckdb");

    let backend = Arc::new(MemoryBackend::new());
    let river = River::new(
        DuckDbDriver,
        Arc::clone(&backend),
        settings(&db, "SELECT * FROM no_such_table", Duration::ZERO),
    );
    river.start().unwrap();
    assert!(river.wait_closed(Duration::from_secs(10)));
    assert!(backend.batches().is_empty());
}

#[test]
fn database_released_between_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("people.duckdb");
    seed(&db, 3);

    let backend = Arc::new(MemoryBackend::new());
    let river = River::new(
        DuckDbDriver,
        Arc::clone(&backend),
        settings(&db, "SELECT id AS _id FROM people", Duration::from_secs(3600)),
    );
    river.start().unwrap();
    assert!(wait_for(Duration::from_secs(10), || river.phase() == Phase::Sleeping));

    // the file is not held open while sleeping
    let conn = DuckDbDriver.connect(&params(&db)).unwrap();
    conn.execute_batch("INSERT INTO people VALUES (99, 'late', false, DATE '2024-05-01')")
        .unwrap();
    drop(conn);

    river.close();
    river.join();
    assert_eq!(backend.document_count("people"), 3);
}
