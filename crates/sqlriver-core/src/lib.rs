//! sqlriver core: periodically re-runs a SQL query and streams every row as
//! a document into a search index.
//!
//! The data source and the index are reached through the [`SqlDriver`] and
//! [`IndexBackend`] traits; concrete adapters live in sibling crates.

pub mod assembler;
pub mod backend;
pub mod document;
pub mod error;
pub mod logging;
pub mod memory;
pub mod progress;
pub mod retry;
pub mod river;
pub mod runtime;
pub mod semaphore;
pub mod shutdown;
pub mod source;
pub mod writer;

// Re-exports for convenience
pub use assembler::DocumentAssembler;
pub use backend::{Batch, BulkItem, IndexBackend, IndexCreation, IndexTarget};
pub use document::{Document, FieldValue};
pub use error::{
    BackendError, CycleError, CycleErrorKind, SourceError, StartupError, SubmissionError,
};
pub use logging::{IndicatifLogger, init_logging};
pub use memory::MemoryBackend;
pub use progress::{ProgressContext, fmt_num};
pub use retry::RetryPolicy;
pub use river::{CycleErrorPolicy, CycleStats, Lifecycle, Phase, River, RiverSettings};
pub use runtime::{SHARED_RUNTIME, runtime_handle};
pub use shutdown::Shutdown;
pub use source::{ConnectParams, RowCursor, RowListener, SqlConnection, SqlDriver, SqlStatement};
pub use writer::{BulkStats, BulkWriter, OverloadPolicy, WriterSettings};
