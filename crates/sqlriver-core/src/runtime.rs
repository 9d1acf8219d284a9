//! Shared tokio runtime for backend I/O.
//!
//! The poll worker is a plain thread doing synchronous source I/O. Bulk
//! submissions are spawned onto this runtime so they complete
//! independently of the worker, and one-off backend calls (index creation)
//! are driven with `block_on` from sync code.

use std::sync::LazyLock;

/// Worker threads for in-flight submissions. Submissions are I/O bound,
/// so a small pool serves many concurrent requests.
const RUNTIME_WORKERS: usize = 2;

pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(RUNTIME_WORKERS)
        .thread_name("sqlriver-bulk")
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Handle to the shared runtime.
pub fn runtime_handle() -> tokio::runtime::Handle {
    SHARED_RUNTIME.handle().clone()
}
