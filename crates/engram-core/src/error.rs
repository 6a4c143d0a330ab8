//! Tagged error kinds shared across the engine
//!
//! Every facade-visible failure normalizes into [`EngineError`]. Per-subsystem
//! errors (storage, encoding, ingestion, ...) carry their own `thiserror` enum
//! and convert into this one at the boundary, so callers never match on
//! strings.

use std::time::Instant;

use thiserror::Error;

/// Coarse outcome attached to every facade-visible report (spec §7):
/// whether the call fully succeeded, partially succeeded (some work was
/// skipped, degraded, or counted as a recoverable failure), or failed
/// outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationStatus {
    #[default]
    Ok,
    Partial,
    Error,
}

/// Top-level error returned by [`crate::facade::Engine`] operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller-side error: empty text, malformed path, bad identifier.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No memory, connection, or path matched the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempted creation with an id that already exists.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// `parent_id` missing or not at a strictly lower level.
    #[error("invalid parent: {0}")]
    InvalidParent(String),

    /// `level` outside the valid {0,1,2} range.
    #[error("level out of range: {0}")]
    LevelOutOfRange(i32),

    /// A vector was upserted into a collection with a different dimensionality.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimensionality the collection was created with.
        expected: usize,
        /// Dimensionality of the rejected vector.
        got: usize,
    },

    /// A query or write attempted to cross a project namespace boundary.
    #[error("namespace violation: {0}")]
    NamespaceViolation(String),

    /// Vector or metadata backend unreachable; caller may retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Embedding model failure.
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// Ingestion input failed validation (not a repo, unreadable file, ...).
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// Deadline exceeded; partial results may be attached by the caller.
    #[error("operation timed out")]
    Timeout,

    /// Unexpected invariant violation. Never swallowed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::storage::metadata::StoreError> for EngineError {
    fn from(e: crate::storage::metadata::StoreError) -> Self {
        use crate::storage::metadata::StoreError as S;
        match e {
            S::Database(err) => EngineError::StoreUnavailable(err.to_string()),
            S::Io(err) => EngineError::StoreUnavailable(err.to_string()),
            S::NotFound(id) => EngineError::NotFound(id),
            S::DuplicateId(id) => EngineError::DuplicateId(id),
            S::InvalidParent(msg) => EngineError::InvalidParent(msg),
            S::LevelOutOfRange(l) => EngineError::LevelOutOfRange(l),
            S::InvalidEdge(msg) => EngineError::InvalidInput(msg),
            S::Init(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<crate::storage::vector::VectorStoreError> for EngineError {
    fn from(e: crate::storage::vector::VectorStoreError) -> Self {
        use crate::storage::vector::VectorStoreError as V;
        match e {
            V::DimensionMismatch { expected, got } => {
                EngineError::DimensionMismatch { expected, got }
            }
            V::NamespaceViolation(msg) => EngineError::NamespaceViolation(msg),
            V::Backend(msg) => EngineError::StoreUnavailable(msg),
        }
    }
}

impl From<crate::embeddings::EmbeddingError> for EngineError {
    fn from(e: crate::embeddings::EmbeddingError) -> Self {
        EngineError::EncodingError(e.to_string())
    }
}

impl From<crate::ingest::git::GitIngestError> for EngineError {
    fn from(e: crate::ingest::git::GitIngestError) -> Self {
        use crate::ingest::git::GitIngestError as G;
        match e {
            G::Timeout => EngineError::Timeout,
            other => EngineError::InvalidSource(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the facade layer.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Checked at the entry of every deadline-aware facade operation and at
/// each natural checkpoint within its loop (one chunk, one commit, one
/// consolidation candidate). Returns [`EngineError::Timeout`] only when no
/// partial result exists yet to return instead (spec §5); once work is
/// under way, callers stop at the next checkpoint and return what they
/// have with `status: OperationStatus::Partial`.
pub fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(EngineError::Timeout),
        _ => Ok(()),
    }
}

/// `true` once `deadline` has elapsed. Used inside loops that have already
/// produced partial work, where a bare `Err` would discard it.
pub fn deadline_elapsed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}
