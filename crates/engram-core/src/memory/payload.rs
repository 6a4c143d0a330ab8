//! Tagged payload variant carried alongside the common `Memory` header
//! (Design Notes §9). Kept out of the hot path: activation and vector
//! search never need to deserialize it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type-specific attributes for a memory, distinguished by ingestion origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryPayload {
    /// A chunk produced by the structured-document ingestion pipeline.
    DocumentChunk {
        /// `"<breadcrumb title path>"`, e.g. `"Authentication :: JWT"`.
        breadcrumb: String,
        /// Heading indices from the document root to this chunk's section.
        section_path: Vec<usize>,
    },
    /// A git commit.
    Commit {
        sha: String,
        parents: Vec<String>,
        author: String,
        committer: String,
        authored_at: DateTime<Utc>,
        files_changed: Vec<FileChange>,
        commit_type: CommitType,
    },
    /// Two files that tend to change together.
    CoChangePattern {
        path_a: String,
        path_b: String,
        support: u32,
        confidence: f64,
    },
    /// A file with disproportionately many problem-fixing commits.
    Hotspot {
        path: String,
        problem_count: u32,
        score: f64,
    },
    /// A recorded fix approach for a class of problem.
    Solution {
        problem_type: String,
        solution_approach: String,
        success_rate: f64,
        total_attempts: u32,
    },
    /// No type-specific attributes (explicit `store_experience` calls).
    Generic,
}

/// A single file's change within a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub change_kind: FileChangeKind,
    pub lines_added: u32,
    pub lines_removed: u32,
}

/// How a file changed within a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Add,
    Modify,
    Delete,
    Rename,
}

/// Commit type inferred from the message (spec §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitType {
    BugFix,
    Feature,
    Refactor,
    Docs,
    Test,
    Chore,
}

impl CommitType {
    /// The tag string this commit type maps to when assigned to a memory.
    pub fn as_tag(&self) -> &'static str {
        match self {
            CommitType::BugFix => "bug_fix",
            CommitType::Feature => "feature",
            CommitType::Refactor => "refactor",
            CommitType::Docs => "docs",
            CommitType::Test => "test",
            CommitType::Chore => "chore",
        }
    }
}
