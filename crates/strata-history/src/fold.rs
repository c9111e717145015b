//! Folding commit records into one snapshot per path.

use std::collections::BTreeMap;

use crate::mining::CommitRecord;

/// The latest content of a path plus every commit message that touched it.
///
/// # Examples
///
/// ```
/// use strata_history::fold::FileHistory;
///
/// let file = FileHistory {
///     path: "README.md".into(),
///     content: "# Hello\n".into(),
///     messages: vec!["Add readme".into()],
/// };
/// assert_eq!(file.messages.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHistory {
    /// File path relative to the repository root.
    pub path: String,
    /// Content after the last commit that touched the path.
    pub content: String,
    /// Messages of all commits touching the path, oldest first.
    pub messages: Vec<String>,
}

/// Fold records (in commit order) into per-path snapshots, sorted by path.
///
/// The last record for a path decides its content; messages accumulate.
///
/// # Examples
///
/// ```
/// use strata_history::fold::fold_history;
/// use strata_history::mining::CommitRecord;
///
/// let record = |content: &str, message: &str| CommitRecord {
///     commit: "c".into(),
///     path: "vehicles.txt".into(),
///     content: content.into(),
///     message: message.into(),
///     author: "alice".into(),
/// };
/// let files = fold_history(&[record("Ford", "Add vehicles"), record("Ford, Audi", "More vehicles")]);
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].content, "Ford, Audi");
/// assert_eq!(files[0].messages, vec!["Add vehicles", "More vehicles"]);
/// ```
pub fn fold_history(records: &[CommitRecord]) -> Vec<FileHistory> {
    let mut files: BTreeMap<&str, FileHistory> = BTreeMap::new();

    for record in records {
        let entry = files
            .entry(record.path.as_str())
            .or_insert_with(|| FileHistory {
                path: record.path.clone(),
                content: String::new(),
                messages: Vec::new(),
            });
        entry.content.clone_from(&record.content);
        entry.messages.push(record.message.clone());
    }

    files.into_values().collect()
}
