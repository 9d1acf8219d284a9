//! Index backend contract and the batch type submitted to it

use std::fmt;
use std::future::Future;

use crate::document::Document;
use crate::error::BackendError;

/// Destination collection for documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexTarget {
    pub index: String,
    pub doc_type: String,
}

impl IndexTarget {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }
}

impl Default for IndexTarget {
    fn default() -> Self {
        Self::new("jdbc", "jdbc")
    }
}

impl fmt::Display for IndexTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.doc_type)
    }
}

/// One document queued for indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    /// `None` lets the backend assign an identifier
    pub id: Option<String>,
    pub doc: Document,
}

/// Ordered group of documents bound for a single target.
#[derive(Debug, Clone)]
pub struct Batch {
    target: IndexTarget,
    items: Vec<BulkItem>,
}

impl Batch {
    pub fn with_capacity(target: IndexTarget, capacity: usize) -> Self {
        Self {
            target,
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, id: Option<String>, doc: Document) {
        self.items.push(BulkItem { id, doc });
    }

    pub fn target(&self) -> &IndexTarget {
        &self.target
    }

    pub fn items(&self) -> &[BulkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Outcome of a successful index creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    Created,
    AlreadyExisted,
}

/// Search/index service receiving bulk submissions.
///
/// Implementations are shared across submission tasks on the tokio runtime,
/// hence `Send + Sync + 'static` and `Send` futures.
pub trait IndexBackend: Send + Sync + 'static {
    /// Create `name`. An existing index may be reported either as
    /// `Ok(AlreadyExisted)` or as [`BackendError::IndexAlreadyExists`].
    fn create_index(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<IndexCreation, BackendError>> + Send;

    /// Index every item of `batch`. Items with an identifier overwrite any
    /// document already stored under it.
    fn submit_batch(&self, batch: &Batch) -> impl Future<Output = Result<(), BackendError>> + Send;
}
