//! Flow-controlled bulk writer.
//!
//! Documents are grouped into batches of `bulk_size`. A full batch is sealed
//! on the caller's thread and handed to a task on the shared runtime, which
//! owns it until the backend answers. Each in-flight task holds one
//! [`Permit`] of a semaphore sized `max_active_requests`; when none is free
//! the caller blocks, which throttles the row stream to the backend's pace.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use serde::Deserialize;

use crate::backend::{Batch, IndexBackend, IndexTarget};
use crate::document::Document;
use crate::error::SubmissionError;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::runtime::runtime_handle;
use crate::semaphore::{Permit, Semaphore};

pub const DEFAULT_BULK_SIZE: usize = 100;
pub const DEFAULT_MAX_ACTIVE_REQUESTS: usize = 30;
pub const DEFAULT_MILLIS_BEFORE_CONTINUE: u64 = 60_000;

/// What to do when no submission slot frees up within `max_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverloadPolicy {
    /// Submit anyway, temporarily exceeding `max_active_requests`.
    /// The worker never stalls for longer than `max_wait` per batch.
    #[default]
    Proceed,
    /// Keep waiting until a slot frees. Never exceeds the bound and never
    /// drops data, but a hung backend stalls the worker indefinitely.
    Block,
}

#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub bulk_size: usize,
    pub max_active_requests: usize,
    /// How long to wait for a free slot before applying `overload`
    pub max_wait: Duration,
    pub overload: OverloadPolicy,
    pub retry: RetryPolicy,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            bulk_size: DEFAULT_BULK_SIZE,
            max_active_requests: DEFAULT_MAX_ACTIVE_REQUESTS,
            max_wait: Duration::from_millis(DEFAULT_MILLIS_BEFORE_CONTINUE),
            overload: OverloadPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    documents: AtomicU64,
    batches_submitted: AtomicU64,
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
    overdrawn: AtomicU64,
}

/// Point-in-time view of writer activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStats {
    /// Documents accepted by `write`
    pub documents: u64,
    pub batches_submitted: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    /// Submissions made past the concurrency bound
    pub overdrawn: u64,
    pub in_flight: usize,
}

pub struct BulkWriter<B: IndexBackend> {
    backend: Arc<B>,
    settings: WriterSettings,
    current: Option<Batch>,
    slots: Arc<Semaphore>,
    errors: Sender<SubmissionError>,
    counters: Arc<Counters>,
    runtime: tokio::runtime::Handle,
}

impl<B: IndexBackend> std::fmt::Debug for BulkWriter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkWriter")
            .field("settings", &self.settings)
            .field("pending", &self.pending())
            .field("in_flight", &self.slots.in_use())
            .finish_non_exhaustive()
    }
}

impl<B: IndexBackend> BulkWriter<B> {
    /// Create a writer and the channel on which failed submissions arrive.
    ///
    /// `bulk_size` and `max_active_requests` are clamped to at least 1.
    pub fn new(backend: Arc<B>, mut settings: WriterSettings) -> (Self, Receiver<SubmissionError>) {
        settings.bulk_size = settings.bulk_size.max(1);
        settings.max_active_requests = settings.max_active_requests.max(1);
        let (tx, rx) = mpsc::channel();
        let writer = Self {
            backend,
            slots: Semaphore::new(settings.max_active_requests),
            settings,
            current: None,
            errors: tx,
            counters: Arc::new(Counters::default()),
            runtime: runtime_handle(),
        };
        (writer, rx)
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    /// Queue one document. Submits the current batch once it reaches
    /// `bulk_size`, which may block while all slots are taken.
    ///
    /// A change of target seals the batch in progress first, so a batch
    /// never mixes targets.
    pub fn write(&mut self, target: &IndexTarget, id: Option<String>, doc: Document) {
        if self.current.as_ref().is_some_and(|b| b.target() != target) {
            self.seal();
        }
        let bulk_size = self.settings.bulk_size;
        let batch = self
            .current
            .get_or_insert_with(|| Batch::with_capacity(target.clone(), bulk_size));
        batch.push(id, doc);
        self.counters.documents.fetch_add(1, Ordering::Relaxed);
        if batch.len() >= bulk_size {
            self.seal();
        }
    }

    /// Submit the partial batch, if any.
    ///
    /// On return every document previously passed to `write` belongs to a
    /// submitted batch; completion is still asynchronous.
    pub fn flush(&mut self) {
        self.seal();
    }

    /// Documents waiting in the unsealed batch
    pub fn pending(&self) -> usize {
        self.current.as_ref().map_or(0, Batch::len)
    }

    pub fn in_flight(&self) -> usize {
        self.slots.in_use()
    }

    /// Wait for all in-flight submissions to finish. `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.slots.wait_idle(timeout)
    }

    pub fn stats(&self) -> BulkStats {
        BulkStats {
            documents: self.counters.documents.load(Ordering::Relaxed),
            batches_submitted: self.counters.batches_submitted.load(Ordering::Relaxed),
            batches_completed: self.counters.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.counters.batches_failed.load(Ordering::Relaxed),
            overdrawn: self.counters.overdrawn.load(Ordering::Relaxed),
            in_flight: self.slots.in_use(),
        }
    }

    fn seal(&mut self) {
        if let Some(batch) = self.current.take().filter(|b| !b.is_empty()) {
            self.submit(batch);
        }
    }

    fn acquire_slot(&self, batch: &Batch) -> Permit {
        if let Some(permit) = self.slots.acquire_timeout(self.settings.max_wait) {
            return permit;
        }
        match self.settings.overload {
            OverloadPolicy::Proceed => {
                log::warn!(
                    "{}/{} bulk requests still active after {:?}, submitting {} documents to [{}] anyway",
                    self.slots.in_use(),
                    self.slots.capacity(),
                    self.settings.max_wait,
                    batch.len(),
                    batch.target()
                );
                self.counters.overdrawn.fetch_add(1, Ordering::Relaxed);
                self.slots.overdraw()
            }
            OverloadPolicy::Block => {
                log::warn!(
                    "{}/{} bulk requests still active after {:?}, waiting for a free slot",
                    self.slots.in_use(),
                    self.slots.capacity(),
                    self.settings.max_wait
                );
                self.slots.acquire()
            }
        }
    }

    fn submit(&mut self, batch: Batch) {
        let permit = self.acquire_slot(&batch);
        let seq = self.counters.batches_submitted.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(
            "submitting bulk #{seq}: {} documents to [{}], {} active",
            batch.len(),
            batch.target(),
            self.slots.in_use()
        );

        let backend = Arc::clone(&self.backend);
        let errors = self.errors.clone();
        let counters = Arc::clone(&self.counters);
        let retry = self.settings.retry;
        self.runtime.spawn(async move {
            // released when the task ends, whatever the outcome
            let _permit = permit;
            let label = format!("bulk #{seq} to [{}]", batch.target());
            match retry_with_backoff(&label, retry, || backend.submit_batch(&batch)).await {
                Ok(()) => {
                    counters.batches_completed.fetch_add(1, Ordering::Relaxed);
                    log::debug!("{label}: {} documents indexed", batch.len());
                }
                Err((attempts, source)) => {
                    counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                    let err = SubmissionError {
                        target: batch.target().to_string(),
                        batch_len: batch.len(),
                        attempts,
                        source,
                    };
                    if let Err(mpsc::SendError(err)) = errors.send(err) {
                        // receiver gone: nobody left to report to
                        log::error!("{err}");
                    }
                }
            }
        });
    }
}
