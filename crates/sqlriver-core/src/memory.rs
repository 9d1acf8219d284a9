//! In-process index backend.
//!
//! Stores documents keyed by (index, id) and records every submitted batch.
//! Latency and failures can be injected to exercise backpressure and error
//! reporting without a live cluster.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::backend::{Batch, IndexBackend, IndexCreation, IndexTarget};
use crate::document::Document;
use crate::error::BackendError;

/// What the backend saw for one submission.
#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub target: IndexTarget,
    pub len: usize,
    pub ids: Vec<Option<String>>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    indices: Mutex<HashSet<String>>,
    docs: Mutex<BTreeMap<(String, String), Document>>,
    batches: Mutex<Vec<BatchRecord>>,
    next_auto_id: AtomicU64,
    latency_ms: AtomicU64,
    fail_next: AtomicUsize,
    cluster_blocked: AtomicBool,
    create_failure: Mutex<Option<u16>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Keeps the in-flight gauge honest even if a submission future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every submission by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Reject the next `n` submissions with HTTP 503.
    pub fn fail_next_submissions(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Answer index creation with a cluster-block error.
    pub fn set_cluster_blocked(&self, blocked: bool) {
        self.cluster_blocked.store(blocked, Ordering::SeqCst);
    }

    /// Answer index creation with an HTTP error of `status`.
    pub fn fail_create_with(&self, status: u16) {
        *self.create_failure.lock().expect("memory backend poisoned") = Some(status);
    }

    pub fn batches(&self) -> Vec<BatchRecord> {
        self.batches.lock().expect("memory backend poisoned").clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(|b| b.len).collect()
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Document> {
        self.docs
            .lock()
            .expect("memory backend poisoned")
            .get(&(index.to_string(), id.to_string()))
            .cloned()
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.docs
            .lock()
            .expect("memory backend poisoned")
            .keys()
            .filter(|(i, _)| i == index)
            .count()
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indices
            .lock()
            .expect("memory backend poisoned")
            .contains(index)
    }

    /// Submissions currently being processed
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent submissions observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn store(&self, batch: &Batch) {
        let index = &batch.target().index;
        let mut docs = self.docs.lock().expect("memory backend poisoned");
        for item in batch.items() {
            let id = match &item.id {
                Some(id) => id.clone(),
                None => format!("auto-{}", self.next_auto_id.fetch_add(1, Ordering::SeqCst)),
            };
            docs.insert((index.clone(), id), item.doc.clone());
        }
    }
}

impl IndexBackend for MemoryBackend {
    async fn create_index(&self, name: &str) -> Result<IndexCreation, BackendError> {
        if let Some(status) = *self.create_failure.lock().expect("memory backend poisoned") {
            return Err(BackendError::Http {
                status: Some(status),
                message: format!("create [{name}] refused"),
            });
        }
        if self.cluster_blocked.load(Ordering::SeqCst) {
            return Err(BackendError::ClusterBlocked(
                "state not recovered / initialized".to_string(),
            ));
        }
        let inserted = self
            .indices
            .lock()
            .expect("memory backend poisoned")
            .insert(name.to_string());
        if inserted {
            Ok(IndexCreation::Created)
        } else {
            Err(BackendError::IndexAlreadyExists(name.to_string()))
        }
    }

    async fn submit_batch(&self, batch: &Batch) -> Result<(), BackendError> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.take_failure() {
            return Err(BackendError::Http {
                status: Some(503),
                message: "injected failure".to_string(),
            });
        }

        self.store(batch);
        self.batches
            .lock()
            .expect("memory backend poisoned")
            .push(BatchRecord {
                target: batch.target().clone(),
                len: batch.len(),
                ids: batch.items().iter().map(|i| i.id.clone()).collect(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldValue;
    use crate::runtime::SHARED_RUNTIME;

    fn batch_of(ids: &[Option<&str>]) -> Batch {
        let mut batch = Batch::with_capacity(IndexTarget::default(), ids.len());
        for (n, id) in ids.iter().enumerate() {
            let mut doc = Document::new();
            doc.insert("n", FieldValue::Long(n as i64));
            batch.push(id.map(str::to_string), doc);
        }
        batch
    }

    #[test]
    fn create_twice_reports_existing() {
        let backend = MemoryBackend::new();
        let first = SHARED_RUNTIME.block_on(backend.create_index("jdbc"));
        assert_eq!(first.unwrap(), IndexCreation::Created);
        let second = SHARED_RUNTIME.block_on(backend.create_index("jdbc"));
        assert!(matches!(second, Err(BackendError::IndexAlreadyExists(_))));
    }

    #[test]
    fn explicit_ids_overwrite() {
        let backend = MemoryBackend::new();
        SHARED_RUNTIME
            .block_on(backend.submit_batch(&batch_of(&[Some("a"), Some("b")])))
            .unwrap();
        SHARED_RUNTIME
            .block_on(backend.submit_batch(&batch_of(&[Some("a")])))
            .unwrap();
        assert_eq!(backend.document_count("jdbc"), 2);
        assert_eq!(
            backend.document("jdbc", "a").unwrap().get("n"),
            Some(&FieldValue::Long(0))
        );
    }

    #[test]
    fn missing_ids_are_assigned() {
        let backend = MemoryBackend::new();
        SHARED_RUNTIME
            .block_on(backend.submit_batch(&batch_of(&[None, None])))
            .unwrap();
        SHARED_RUNTIME
            .block_on(backend.submit_batch(&batch_of(&[None])))
            .unwrap();
        assert_eq!(backend.document_count("jdbc"), 3);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let backend = MemoryBackend::new();
        backend.fail_next_submissions(1);
        let batch = batch_of(&[None]);
        assert!(SHARED_RUNTIME.block_on(backend.submit_batch(&batch)).is_err());
        assert!(SHARED_RUNTIME.block_on(backend.submit_batch(&batch)).is_ok());
        assert_eq!(backend.batch_sizes(), vec![1]);
    }
}
