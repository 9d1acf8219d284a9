//! Error types for sources, backends, submissions and poll cycles

use std::fmt;

use crate::river::Phase;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure while talking to the data source.
#[derive(Debug)]
pub enum SourceError {
    UnknownDriver(String),
    Connect(BoxError),
    Prepare(BoxError),
    Execute(BoxError),
    Fetch(BoxError),
    /// Column type with no scalar document representation
    UnsupportedType { column: String, type_name: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDriver(d) => write!(f, "unknown driver [{d}]"),
            Self::Connect(e) => write!(f, "connect: {e}"),
            Self::Prepare(e) => write!(f, "prepare: {e}"),
            Self::Execute(e) => write!(f, "execute: {e}"),
            Self::Fetch(e) => write!(f, "fetch: {e}"),
            Self::UnsupportedType { column, type_name } => {
                write!(f, "column [{column}] has unsupported type {type_name}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Failure reported by an index backend.
#[derive(Debug)]
pub enum BackendError {
    Http {
        status: Option<u16>,
        message: String,
    },
    IndexAlreadyExists(String),
    /// Cluster is up but not ready to accept writes (recovering, blocked)
    ClusterBlocked(String),
    /// Request went through but some items were rejected
    Rejected {
        failed: usize,
        total: usize,
        reason: String,
    },
    Serialize(serde_json::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::IndexAlreadyExists(i) => write!(f, "index [{i}] already exists"),
            Self::ClusterBlocked(m) => write!(f, "cluster blocked: {m}"),
            Self::Rejected {
                failed,
                total,
                reason,
            } => write!(f, "{failed}/{total} items rejected, first failure: {reason}"),
            Self::Serialize(e) => write!(f, "serialize: {e}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        match self {
            // 429 = throttled, 5xx = server side; other 4xx will fail again
            Self::Http { status, .. } => match status {
                Some(429) => true,
                Some(s) => *s >= 500,
                None => true,
            },
            Self::ClusterBlocked(_) | Self::Rejected { .. } => true,
            Self::IndexAlreadyExists(_) | Self::Serialize(_) => false,
        }
    }

    /// Conditions that do not prevent startup when creating the index
    pub fn is_soft_for_create(&self) -> bool {
        matches!(self, Self::IndexAlreadyExists(_) | Self::ClusterBlocked(_))
    }
}

/// A batch that could not be delivered after all attempts.
#[derive(Debug)]
pub struct SubmissionError {
    pub target: String,
    pub batch_len: usize,
    pub attempts: u32,
    pub source: BackendError,
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bulk of {} documents to [{}] failed after {} attempt(s): {}",
            self.batch_len, self.target, self.attempts, self.source
        )
    }
}

impl std::error::Error for SubmissionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// The river could not be started; no worker is running.
#[derive(Debug)]
pub enum StartupError {
    /// Index creation failed for a reason other than already-exists / cluster-blocked
    CreateIndex { index: String, source: BackendError },
    Spawn(std::io::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateIndex { index, source } => {
                write!(f, "failed to create index [{index}]: {source}")
            }
            Self::Spawn(e) => write!(f, "failed to spawn poll worker: {e}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateIndex { source, .. } => Some(source),
            Self::Spawn(e) => Some(e),
        }
    }
}

#[derive(Debug)]
pub enum CycleErrorKind {
    Source(SourceError),
    Submission(SubmissionError),
    /// The river was already running or closed; nothing was polled
    Closed,
}

impl fmt::Display for CycleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "{e}"),
            Self::Submission(e) => write!(f, "{e}"),
            Self::Closed => write!(f, "river already started or closed"),
        }
    }
}

/// Failure that ends a poll cycle, with the context needed to diagnose it.
#[derive(Debug)]
pub struct CycleError {
    pub cycle: u64,
    pub phase: Phase,
    pub sql: String,
    pub target: String,
    pub kind: CycleErrorKind,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle {} failed while {}: sql [{}], target [{}]: {}",
            self.cycle, self.phase, self.sql, self.target, self.kind
        )
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            CycleErrorKind::Source(e) => Some(e),
            CycleErrorKind::Submission(e) => Some(e),
            CycleErrorKind::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> BackendError {
        BackendError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn http_429_retryable() {
        assert!(http_err(429).is_retryable());
    }

    #[test]
    fn http_503_retryable() {
        assert!(http_err(503).is_retryable());
    }

    #[test]
    fn http_400_not_retryable() {
        assert!(!http_err(400).is_retryable());
    }

    #[test]
    fn http_without_status_retryable() {
        let err = BackendError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn soft_create_conditions() {
        assert!(BackendError::IndexAlreadyExists("jdbc".into()).is_soft_for_create());
        assert!(BackendError::ClusterBlocked("recovering".into()).is_soft_for_create());
        assert!(!http_err(500).is_soft_for_create());
    }

    #[test]
    fn display_http_with_status() {
        assert_eq!(format!("{}", http_err(404)), "HTTP 404: test");
    }

    #[test]
    fn cycle_error_carries_context() {
        let err = CycleError {
            cycle: 3,
            phase: Phase::Streaming,
            sql: "SELECT 1".into(),
            target: "jdbc/jdbc".into(),
            kind: CycleErrorKind::Source(SourceError::UnsupportedType {
                column: "tags".into(),
                type_name: "LIST".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("cycle 3"));
        assert!(msg.contains("streaming"));
        assert!(msg.contains("SELECT 1"));
        assert!(msg.contains("jdbc/jdbc"));
        assert!(msg.contains("[tags]"));
    }
}
