//! IngestionPipeline — structured documents (§4.11) and git history (§4.12)

pub mod document;
pub mod git;

pub use document::{DocumentLoadReport, MarkdownLoader};
pub use git::{GitIngestError, GitIngestReport, GitPatternLoader};
