//! # Engram Core
//!
//! Cognitive memory engine: a hybrid semantic + rule-derived encoder, a
//! dual-store memory engine (vectors + metadata + connection graph), a
//! hierarchical-seed/spread/bridge retrieval pipeline, and an episodic/
//! semantic memory lifecycle with consolidation and expiry.
//!
//! Every operation reaches the engine through [`facade::Engine`] — nothing
//! else in the crate is meant to be driven directly by external
//! collaborators.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use engram_core::prelude::*;
//!
//! let mut config = EngineConfig::default();
//! config.project_id = "my-project".to_string();
//! let engine = Engine::open(config)?;
//!
//! let stored = engine.store_experience(
//!     "JWT tokens expire after 24 hours of inactivity",
//!     &StoreOptions::default(),
//! )?;
//!
//! let result = engine.retrieve_memories(
//!     "how long do tokens last?",
//!     &RetrievalOptions::default(),
//!     None,
//! )?;
//! # Ok::<(), engram_core::EngineError>(())
//! ```
//!
//! ## Feature flags
//!
//! - `embeddings` (default): local semantic embeddings via `fastembed`.
//! - `vector-search` (default): HNSW vector search via `usearch`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod activation;
pub mod activity;
pub mod bridge;
pub mod config;
pub mod dimensions;
pub mod embeddings;
pub mod encoder;
pub mod error;
pub mod facade;
pub mod ids;
pub mod ingest;
pub mod lifecycle;
pub mod memory;
pub mod retrieval;
pub mod storage;

pub use config::EngineConfig;
pub use error::{EngineError, OperationStatus, Result};
pub use facade::{DeleteResult, Engine, StatusReport, StoreOptions, StoreResult};
pub use memory::{Connection, ConnectionType, Kind, Level, Memory, MemoryPayload, RetrievalClass};
pub use retrieval::{RetrievalOptions, RetrievalResult, RetrievalTypes};

/// Crate version, exposed for `status` reporting and diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Width of the rule-derived dimensional block fused into every cognitive
/// vector (spec §4.2, §4.3).
pub const DIMENSIONAL_WIDTH: usize = 16;

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::error::{EngineError, OperationStatus, Result};
    pub use crate::facade::{DeleteResult, Engine, StatusReport, StoreOptions, StoreResult};
    pub use crate::ingest::{DocumentLoadReport, GitIngestReport, MarkdownLoader};
    pub use crate::lifecycle::ConsolidationReport;
    pub use crate::memory::{
        Connection, ConnectionType, Kind, Level, Memory, MemoryPayload, RetrievalClass,
    };
    pub use crate::retrieval::{RetrievalOptions, RetrievalResult, RetrievalTypes};

    #[cfg(feature = "embeddings")]
    pub use crate::embeddings::LocalEmbeddingProvider;
}
