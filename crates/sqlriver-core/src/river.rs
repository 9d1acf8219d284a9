//! Poll loop controller.
//!
//! One dedicated thread runs `CONNECTING → STREAMING → DRAINING → SLEEPING`
//! until closed. Connection, statement and cursor live on the stack of a
//! single cycle and are dropped in reverse order on every exit path.

use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use serde::Deserialize;

use crate::assembler::DocumentAssembler;
use crate::backend::{IndexBackend, IndexCreation, IndexTarget};
use crate::error::{CycleError, CycleErrorKind, SourceError, StartupError, SubmissionError};
use crate::progress::fmt_num;
use crate::retry;
use crate::runtime::SHARED_RUNTIME;
use crate::shutdown::Shutdown;
use crate::source::{ConnectParams, RowCursor, SqlConnection, SqlDriver, SqlStatement};
use crate::writer::{BulkWriter, WriterSettings};

/// Default pause between cycles (60 minutes)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default wait for in-flight submissions when the river closes
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds on the pause before re-running a failed cycle with no poll interval
const MIN_RETRY_BACKOFF: Duration = Duration::from_millis(100);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Status line refresh interval (rows)
const UPDATE_INTERVAL: u64 = 10_000;

/// Host-facing lifecycle: both calls are safe to repeat.
pub trait Lifecycle {
    fn start(&self) -> Result<(), StartupError>;
    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started yet
    Idle,
    Connecting,
    Streaming,
    Draining,
    Sleeping,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Sleeping => "sleeping",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What a failed cycle does to the river.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleErrorPolicy {
    /// Close the river for good
    #[default]
    Stop,
    /// Log, sleep the poll interval and run the next cycle
    Retry,
}

#[derive(Debug, Clone)]
pub struct RiverSettings {
    /// Name used in log lines and the worker thread name
    pub name: String,
    pub source: ConnectParams,
    pub sql: String,
    pub target: IndexTarget,
    pub poll_interval: Duration,
    pub writer: WriterSettings,
    pub on_cycle_error: CycleErrorPolicy,
    /// Turn reported submission failures into cycle errors
    pub fail_on_submission_error: bool,
    pub shutdown_timeout: Duration,
}

impl Default for RiverSettings {
    fn default() -> Self {
        Self {
            name: "jdbc".to_string(),
            source: ConnectParams::default(),
            sql: String::new(),
            target: IndexTarget::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            writer: WriterSettings::default(),
            on_cycle_error: CycleErrorPolicy::default(),
            fail_on_submission_error: false,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Outcome of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub cycle: u64,
    pub rows: u64,
    pub batches: u64,
    pub elapsed: Duration,
    /// Streaming stopped early because of `close()`
    pub cancelled: bool,
}

impl CycleStats {
    pub fn log(&self, river: &str) {
        log::info!(
            "[{river}] cycle {} done: {} rows in {} bulk requests, {:.1}s{}",
            self.cycle,
            fmt_num(self.rows as usize),
            self.batches,
            self.elapsed.as_secs_f64(),
            if self.cancelled { " (cancelled)" } else { "" }
        );
    }
}

struct Inner<D, B> {
    driver: D,
    backend: Arc<B>,
    settings: RiverSettings,
    shutdown: Shutdown,
    phase: Mutex<Phase>,
    status: ProgressBar,
}

/// Continuously re-runs a query and indexes every row as a document.
pub struct River<D: SqlDriver, B: IndexBackend> {
    inner: Arc<Inner<D, B>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D: SqlDriver, B: IndexBackend> fmt::Debug for River<D, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("River")
            .field("name", &self.inner.settings.name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl<D: SqlDriver, B: IndexBackend> River<D, B> {
    pub fn new(driver: D, backend: Arc<B>, settings: RiverSettings) -> Self {
        Self::with_status_line(driver, backend, settings, ProgressBar::hidden())
    }

    /// Like [`new`](Self::new), reporting phase and row counts on `status`.
    pub fn with_status_line(
        driver: D,
        backend: Arc<B>,
        settings: RiverSettings,
        status: ProgressBar,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                backend,
                settings,
                shutdown: Shutdown::new(),
                phase: Mutex::new(Phase::Idle),
                status,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RiverSettings {
        &self.inner.settings
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    /// Create the target index, tolerating already-exists and a cluster
    /// that has not recovered yet.
    pub fn prepare_index(&self) -> Result<(), StartupError> {
        self.inner.prepare_index()
    }

    /// Run a single cycle on the calling thread and wait for its
    /// submissions to finish (bounded by the shutdown timeout).
    ///
    /// The river is closed afterwards. Refused if a worker is running or the
    /// river was already closed.
    pub fn run_once(&self) -> Result<CycleStats, CycleError> {
        let inner = &self.inner;
        // held for the whole cycle so start() cannot spawn a worker meanwhile
        let worker = self.worker.lock().expect("worker handle poisoned");
        if worker.is_some() || inner.shutdown.is_requested() || inner.phase() == Phase::Closed {
            log::warn!("[{}] already started or closed, not polling", inner.settings.name);
            return Err(inner.closed_error());
        }
        let (mut writer, failures) =
            BulkWriter::new(Arc::clone(&inner.backend), inner.settings.writer.clone());
        let result = inner.run_cycle(1, &mut writer, &failures);
        inner.drain(&writer, &failures);
        inner.shutdown.request();
        inner.set_phase(Phase::Closed);
        inner.status.finish_and_clear();
        drop(worker);
        let stats = result?;
        stats.log(&inner.settings.name);
        Ok(stats)
    }

    /// Wait for the worker thread to exit.
    pub fn join(&self) {
        let handle = self.worker.lock().expect("worker handle poisoned").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("[{}] poll worker panicked", self.inner.settings.name);
            }
        }
    }

    /// Block until the river closes or `timeout` elapses. `true` if closed.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_closed() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

impl<D: SqlDriver, B: IndexBackend> Lifecycle for River<D, B> {
    fn start(&self) -> Result<(), StartupError> {
        let mut worker = self.worker.lock().expect("worker handle poisoned");
        let name = &self.inner.settings.name;
        if worker.is_some() {
            log::warn!("[{name}] already started");
            return Ok(());
        }
        if self.inner.shutdown.is_requested() || self.inner.phase() == Phase::Closed {
            log::warn!("[{name}] already closed, not starting");
            return Ok(());
        }

        let s = &self.inner.settings;
        log::info!(
            "starting river [{name}]: url [{}], driver [{}], sql [{}], indexing to [{}], poll [{:?}]",
            s.source.url,
            s.source.driver,
            s.sql,
            s.target,
            s.poll_interval
        );
        self.inner.prepare_index()?;

        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name(format!("sqlriver-{name}"))
            .spawn(move || inner.run())
            .map_err(StartupError::Spawn)?;
        *worker = Some(handle);
        Ok(())
    }

    fn close(&self) {
        if !self.inner.shutdown.request() {
            return;
        }
        log::info!("closing river [{}]", self.inner.settings.name);
        let worker = self.worker.lock().expect("worker handle poisoned");
        if worker.is_none() {
            self.inner.set_phase(Phase::Closed);
        }
    }
}

impl<D: SqlDriver, B: IndexBackend> Drop for River<D, B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: SqlDriver, B: IndexBackend> Inner<D, B> {
    fn phase(&self) -> Phase {
        *self.phase.lock().expect("phase poisoned")
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().expect("phase poisoned") = phase;
        self.status.set_message(phase.to_string());
    }

    fn prepare_index(&self) -> Result<(), StartupError> {
        let index = &self.settings.target.index;
        match SHARED_RUNTIME.block_on(self.backend.create_index(index)) {
            Ok(IndexCreation::Created) => log::info!("created index [{index}]"),
            Ok(IndexCreation::AlreadyExisted) => log::debug!("index [{index}] already exists"),
            Err(e) if e.is_soft_for_create() => {
                // a blocked cluster shows up again as failed bulk requests if it never recovers
                log::warn!("index [{index}] not created ({e}), starting anyway");
            }
            Err(source) => {
                log::warn!("failed to create index [{index}], disabling river: {source}");
                return Err(StartupError::CreateIndex {
                    index: index.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Worker body.
    fn run(&self) {
        let name = &self.settings.name;
        let (mut writer, failures) =
            BulkWriter::new(Arc::clone(&self.backend), self.settings.writer.clone());
        let mut cycle = 0u64;
        let mut failed_in_a_row = 0u32;

        while !self.shutdown.is_requested() {
            cycle += 1;
            match self.run_cycle(cycle, &mut writer, &failures) {
                Ok(stats) => {
                    failed_in_a_row = 0;
                    stats.log(name);
                }
                Err(e) => {
                    log::error!("[{name}] {e}");
                    if self.settings.on_cycle_error == CycleErrorPolicy::Stop {
                        log::error!("[{name}] disabling river after failed cycle");
                        self.shutdown.request();
                        break;
                    }
                    failed_in_a_row = failed_in_a_row.saturating_add(1);
                    if self.settings.poll_interval.is_zero() {
                        self.back_off(failed_in_a_row);
                        continue;
                    }
                    log::warn!("[{name}] retrying after poll interval");
                }
            }
            if self.shutdown.is_requested() {
                break;
            }
            self.sleep();
        }

        self.drain(&writer, &failures);
        self.set_phase(Phase::Closed);
        self.status.finish_and_clear();
        log::info!("[{name}] closed after {cycle} cycle(s)");
    }

    fn run_cycle(
        &self,
        cycle: u64,
        writer: &mut BulkWriter<B>,
        failures: &Receiver<SubmissionError>,
    ) -> Result<CycleStats, CycleError> {
        let started = Instant::now();
        let batches_before = writer.stats().batches_submitted;
        log::info!("[{}] cycle {cycle} starting", self.settings.name);

        self.set_phase(Phase::Connecting);
        let conn = self
            .driver
            .connect(&self.settings.source)
            .map_err(|e| self.source_error(cycle, Phase::Connecting, e))?;
        let mut stmt = conn
            .prepare(&self.settings.sql)
            .map_err(|e| self.source_error(cycle, Phase::Connecting, e))?;
        let mut cursor = stmt
            .execute()
            .map_err(|e| self.source_error(cycle, Phase::Connecting, e))?;

        self.set_phase(Phase::Streaming);
        let streamed = self.stream_rows(cycle, &mut cursor, writer, failures);

        // rows already handed to the writer are submitted even if streaming failed
        self.set_phase(Phase::Draining);
        writer.flush();
        drop(cursor);
        drop(stmt);
        drop(conn);

        let (rows, cancelled) = streamed?;
        if self.settings.fail_on_submission_error
            && !writer.wait_idle(self.settings.shutdown_timeout)
        {
            log::warn!(
                "[{}] cycle {cycle}: {} bulk requests still active after {:?}",
                self.settings.name,
                writer.in_flight(),
                self.settings.shutdown_timeout
            );
        }
        self.check_failures(cycle, Phase::Draining, failures)?;

        Ok(CycleStats {
            cycle,
            rows,
            batches: writer.stats().batches_submitted - batches_before,
            elapsed: started.elapsed(),
            cancelled,
        })
    }

    /// Returns the number of rows handed to the writer and whether the
    /// stream was cut short by `close()`.
    fn stream_rows(
        &self,
        cycle: u64,
        cursor: &mut impl RowCursor,
        writer: &mut BulkWriter<B>,
        failures: &Receiver<SubmissionError>,
    ) -> Result<(u64, bool), CycleError> {
        let mut assembler = DocumentAssembler::new();
        let mut rows = 0u64;
        loop {
            let more = cursor
                .advance(&mut assembler)
                .map_err(|e| self.source_error(cycle, Phase::Streaming, e))?;
            if !more {
                return Ok((rows, false));
            }
            let (id, doc) = assembler.take();
            writer.write(&self.settings.target, id, doc);
            rows += 1;

            if rows.is_multiple_of(UPDATE_INTERVAL) {
                self.status
                    .set_message(format!("streaming: {} rows", fmt_num(rows as usize)));
            }
            if self.settings.fail_on_submission_error {
                self.check_failures(cycle, Phase::Streaming, failures)?;
            }
            if self.shutdown.is_requested() {
                log::info!(
                    "[{}] close requested, stopping cycle {cycle} after {rows} rows",
                    self.settings.name
                );
                return Ok((rows, true));
            }
        }
    }

    /// Report every failed submission received so far. Escalates the first
    /// one when `fail_on_submission_error` is set.
    fn check_failures(
        &self,
        cycle: u64,
        phase: Phase,
        failures: &Receiver<SubmissionError>,
    ) -> Result<(), CycleError> {
        let mut first = None;
        for err in failures.try_iter() {
            log::error!("[{}] cycle {cycle}: {err}", self.settings.name);
            first.get_or_insert(err);
        }
        match first {
            Some(err) if self.settings.fail_on_submission_error => Err(CycleError {
                cycle,
                phase,
                sql: self.settings.sql.clone(),
                target: self.settings.target.to_string(),
                kind: CycleErrorKind::Submission(err),
            }),
            _ => Ok(()),
        }
    }

    /// Pause before re-running a failed cycle when there is no poll interval
    /// to wait out.
    fn back_off(&self, failed_in_a_row: u32) {
        let delay = retry::backoff_duration(self.settings.writer.retry.base, failed_in_a_row)
            .clamp(MIN_RETRY_BACKOFF, MAX_RETRY_BACKOFF);
        self.set_phase(Phase::Sleeping);
        log::warn!(
            "[{}] {failed_in_a_row} failed cycle(s) in a row, retrying in {delay:?}",
            self.settings.name
        );
        if self.shutdown.wait_timeout(delay) {
            log::debug!("[{}] retry backoff interrupted by close", self.settings.name);
        }
    }

    fn sleep(&self) {
        let poll = self.settings.poll_interval;
        if poll.is_zero() {
            return;
        }
        self.set_phase(Phase::Sleeping);
        log::info!(
            "[{}] next run, waiting {poll:?}, url [{}] driver [{}] sql [{}]",
            self.settings.name,
            self.settings.source.url,
            self.settings.source.driver,
            self.settings.sql
        );
        if self.shutdown.wait_timeout(poll) {
            log::debug!("[{}] sleep interrupted by close", self.settings.name);
        }
    }

    /// Give in-flight submissions a chance to land and report their failures.
    fn drain(&self, writer: &BulkWriter<B>, failures: &Receiver<SubmissionError>) {
        if !writer.wait_idle(self.settings.shutdown_timeout) {
            log::warn!(
                "[{}] abandoning {} bulk requests still active after {:?}",
                self.settings.name,
                writer.in_flight(),
                self.settings.shutdown_timeout
            );
        }
        for err in failures.try_iter() {
            log::error!("[{}] {err}", self.settings.name);
        }
        let stats = writer.stats();
        log::debug!(
            "[{}] writer totals: {} documents, {} bulk requests ({} failed, {} over limit)",
            self.settings.name,
            stats.documents,
            stats.batches_submitted,
            stats.batches_failed,
            stats.overdrawn
        );
    }

    fn closed_error(&self) -> CycleError {
        CycleError {
            cycle: 0,
            phase: self.phase(),
            sql: self.settings.sql.clone(),
            target: self.settings.target.to_string(),
            kind: CycleErrorKind::Closed,
        }
    }

    fn source_error(&self, cycle: u64, phase: Phase, e: SourceError) -> CycleError {
        CycleError {
            cycle,
            phase,
            sql: self.settings.sql.clone(),
            target: self.settings.target.to_string(),
            kind: CycleErrorKind::Source(e),
        }
    }
}
