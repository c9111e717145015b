//! Git history extraction for strata.
//!
//! Mines a repository's commits with git2 into a flat, commit-ordered stream
//! of `(commit, path, content, message, author)` records, and folds that
//! stream into one snapshot per path: the latest content plus every commit
//! message that touched it.

pub mod fold;
pub mod mining;

pub use fold::{fold_history, FileHistory};
pub use mining::{CommitRecord, GitHistory, HistorySource, MiningOptions};
