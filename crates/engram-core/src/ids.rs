//! Identifier generation
//!
//! Episodic/generic memories get an opaque UUID v4. Git artifacts and
//! derived patterns get deterministic `namespace::kind::hash` ids so
//! re-ingesting the same source is a no-op at the data level (spec §3, §4.12).

use sha2::{Digest, Sha256};

/// Generate a fresh opaque memory id.
pub fn new_opaque_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `git::commit::<sha>` — the raw commit SHA is the id itself, not a hash of it.
pub fn git_commit_id(sha: &str) -> String {
    format!("git::commit::{sha}")
}

/// `git::cochange::sha256(canonical(path_a)|canonical(path_b))`, paths sorted lex.
pub fn git_cochange_id(path_a: &str, path_b: &str) -> String {
    let (a, b) = if path_a <= path_b {
        (path_a, path_b)
    } else {
        (path_b, path_a)
    };
    format!("git::cochange::{}", sha256_hex(&format!("{a}|{b}")))
}

/// `git::hotspot::sha256(canonical(path))`.
pub fn git_hotspot_id(path: &str) -> String {
    format!("git::hotspot::{}", sha256_hex(path))
}

/// `git::solution::sha256(lower(problem_type)|lower(solution_approach))`.
pub fn git_solution_id(problem_type: &str, solution_approach: &str) -> String {
    let input = format!(
        "{}|{}",
        problem_type.to_lowercase(),
        solution_approach.to_lowercase()
    );
    format!("git::solution::{}", sha256_hex(&input))
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Canonicalize a source path per spec §3: lowercased on case-insensitive
/// hosts, forward slashes, no trailing separator. We treat all hosts as
/// case-sensitive except when the path already looks like a Windows path
/// (drive letter), matching the common cross-platform default.
pub fn canonicalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    let looks_case_insensitive = normalized.len() >= 2
        && normalized.as_bytes()[1] == b':'
        && normalized.as_bytes()[0].is_ascii_alphabetic();
    if looks_case_insensitive {
        normalized = normalized.to_lowercase();
    }
    normalized
}
