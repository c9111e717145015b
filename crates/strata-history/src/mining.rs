//! History extraction via git2.
//!
//! Walks a repository from its first commit to HEAD and emits one
//! [`CommitRecord`] per file touched by each commit, carrying the file's
//! content at that commit and the commit message.

use std::path::{Path, PathBuf};

use git2::{Delta, DiffFindOptions, DiffOptions, FileMode, Oid, Repository, Sort};
use strata_core::StrataError;
use tracing::debug;

/// One file touched by one commit.
///
/// # Examples
///
/// ```
/// use strata_history::mining::CommitRecord;
///
/// let record = CommitRecord {
///     commit: "4b825dc".into(),
///     path: "src/main.rs".into(),
///     content: "fn main() {}\n".into(),
///     message: "Add entry point".into(),
///     author: "alice".into(),
/// };
/// assert_eq!(record.path, "src/main.rs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Full commit hash.
    pub commit: String,
    /// File path relative to the repository root.
    pub path: String,
    /// File content after the commit; empty when the commit deleted the file.
    pub content: String,
    /// Full commit message, trimmed.
    pub message: String,
    /// Author name.
    pub author: String,
}

/// A supplier of commit records in commit order (oldest first).
pub trait HistorySource: Send + Sync {
    /// Produce every record of the history.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Git`] if the underlying history cannot be read.
    fn commits(&self) -> Result<Vec<CommitRecord>, StrataError>;
}

impl HistorySource for Vec<CommitRecord> {
    fn commits(&self) -> Result<Vec<CommitRecord>, StrataError> {
        Ok(self.clone())
    }
}

/// Options for history mining.
///
/// # Examples
///
/// ```
/// use strata_history::mining::MiningOptions;
///
/// let opts = MiningOptions::default();
/// assert!(opts.branch.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MiningOptions {
    /// Branch to walk (default: HEAD).
    pub branch: Option<String>,
}

/// Git-backed [`HistorySource`].
///
/// # Examples
///
/// ```no_run
/// use strata_history::mining::{GitHistory, HistorySource, MiningOptions};
///
/// let history = GitHistory::new(".", MiningOptions::default());
/// for record in history.commits().unwrap() {
///     println!("{} {}", &record.commit[..8], record.path);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GitHistory {
    repo_path: PathBuf,
    options: MiningOptions,
}

impl GitHistory {
    /// Create a history source for the repository at `repo_path`.
    pub fn new(repo_path: impl Into<PathBuf>, options: MiningOptions) -> Self {
        Self {
            repo_path: repo_path.into(),
            options,
        }
    }

    /// Path of the repository this source reads.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}

impl HistorySource for GitHistory {
    fn commits(&self) -> Result<Vec<CommitRecord>, StrataError> {
        mine_history(&self.repo_path, &self.options)
    }
}

/// Mine file-level commit records from a git repository.
///
/// Returns records in commit order, oldest first. Merge commits are diffed
/// against their first parent. Binary and non-UTF-8 blobs are skipped, as are
/// submodule entries. A repository without commits yields no records.
///
/// # Errors
///
/// Returns [`StrataError::Git`] if the repository cannot be opened or walked.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use strata_history::mining::{mine_history, MiningOptions};
///
/// let records = mine_history(Path::new("."), &MiningOptions::default()).unwrap();
/// println!("{} file revisions", records.len());
/// ```
pub fn mine_history(
    repo_path: &Path,
    options: &MiningOptions,
) -> Result<Vec<CommitRecord>, StrataError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| StrataError::Git(format!("failed to open repository: {e}")))?;

    if repo
        .is_empty()
        .map_err(|e| StrataError::Git(format!("failed to inspect repository: {e}")))?
    {
        return Ok(Vec::new());
    }

    let mut revwalk = repo
        .revwalk()
        .map_err(|e| StrataError::Git(format!("failed to create revwalk: {e}")))?;

    revwalk
        .set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
        .map_err(|e| StrataError::Git(format!("failed to set revwalk order: {e}")))?;

    if let Some(ref branch) = options.branch {
        let reference = repo
            .resolve_reference_from_short_name(branch)
            .map_err(|e| StrataError::Git(format!("failed to resolve branch '{branch}': {e}")))?;
        let oid = reference
            .target()
            .ok_or_else(|| StrataError::Git("branch has no target".into()))?;
        revwalk
            .push(oid)
            .map_err(|e| StrataError::Git(format!("failed to push oid: {e}")))?;
    } else {
        revwalk
            .push_head()
            .map_err(|e| StrataError::Git(format!("failed to push HEAD: {e}")))?;
    }

    let mut records = Vec::new();

    for oid_result in revwalk {
        let oid = oid_result.map_err(|e| StrataError::Git(format!("revwalk error: {e}")))?;

        let commit = repo
            .find_commit(oid)
            .map_err(|e| StrataError::Git(format!("failed to find commit: {e}")))?;

        let message = commit.message().unwrap_or("").trim().to_string();
        let author = commit.author().name().unwrap_or("unknown").to_string();
        let hash = oid.to_string();

        for (path, content) in extract_file_contents(&repo, &commit)? {
            records.push(CommitRecord {
                commit: hash.clone(),
                path,
                content,
                message: message.clone(),
                author: author.clone(),
            });
        }
    }

    debug!(records = records.len(), "mined history");
    Ok(records)
}

fn extract_file_contents(
    repo: &Repository,
    commit: &git2::Commit,
) -> Result<Vec<(String, String)>, StrataError> {
    let commit_tree = commit
        .tree()
        .map_err(|e| StrataError::Git(format!("failed to get commit tree: {e}")))?;

    let parent_tree = if commit.parent_count() > 0 {
        let parent = commit
            .parent(0)
            .map_err(|e| StrataError::Git(format!("failed to get parent: {e}")))?;
        Some(
            parent
                .tree()
                .map_err(|e| StrataError::Git(format!("failed to get parent tree: {e}")))?,
        )
    } else {
        None
    };

    let mut diff_opts = DiffOptions::new();
    let mut diff = repo
        .diff_tree_to_tree(
            parent_tree.as_ref(),
            Some(&commit_tree),
            Some(&mut diff_opts),
        )
        .map_err(|e| StrataError::Git(format!("failed to compute diff: {e}")))?;

    let mut find_opts = DiffFindOptions::new();
    find_opts.renames(true);
    diff.find_similar(Some(&mut find_opts))
        .map_err(|e| StrataError::Git(format!("failed to find renames: {e}")))?;

    let mut files = Vec::new();

    for delta in diff.deltas() {
        if delta.status() == Delta::Deleted {
            if let Some(path) = delta.old_file().path() {
                files.push((path_string(path), String::new()));
            }
            continue;
        }

        // The old path of a rename no longer exists, same as a deletion.
        if delta.status() == Delta::Renamed {
            if let Some(path) = delta.old_file().path() {
                files.push((path_string(path), String::new()));
            }
        }

        let new_file = delta.new_file();
        let Some(path) = new_file.path() else {
            continue;
        };
        if new_file.mode() == FileMode::Commit {
            continue;
        }

        match read_text_blob(repo, new_file.id())? {
            Some(content) => files.push((path_string(path), content)),
            None => debug!(path = %path.display(), "skipping binary or non-UTF-8 blob"),
        }
    }

    Ok(files)
}

fn read_text_blob(repo: &Repository, oid: Oid) -> Result<Option<String>, StrataError> {
    let blob = repo
        .find_blob(oid)
        .map_err(|e| StrataError::Git(format!("failed to read blob {oid}: {e}")))?;

    if blob.is_binary() {
        return Ok(None);
    }

    Ok(std::str::from_utf8(blob.content()).ok().map(str::to_string))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
