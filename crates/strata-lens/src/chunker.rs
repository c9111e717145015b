//! Line-packing chunker for file content and commit messages.
//!
//! Splits text into bounded chunks of whole lines. Each chunk carries the
//! line range it came from and a content address derived from its path,
//! source kind and text, so unchanged text always maps to the same id.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_core::{LineRange, SourceKind};
use strata_history::FileHistory;

/// Content address of a chunk: hex SHA-256 over path, source kind and text.
///
/// # Examples
///
/// ```
/// use strata_core::SourceKind;
/// use strata_lens::chunker::ChunkId;
///
/// let a = ChunkId::derive("a.txt", SourceKind::Content, "hello");
/// let b = ChunkId::derive("a.txt", SourceKind::Content, "hello");
/// let c = ChunkId::derive("a.txt", SourceKind::CommitMessage, "hello");
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// assert_eq!(a.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Compute the id for a chunk of `text` from `path`.
    pub fn derive(path: &str, kind: SourceKind, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an id read back from storage.
    pub fn from_stored(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bounded unit of text that is embedded on its own.
///
/// # Examples
///
/// ```
/// use strata_core::{LineRange, SourceKind};
/// use strata_lens::chunker::{Chunk, ChunkId};
///
/// let chunk = Chunk {
///     id: ChunkId::derive("notes.md", SourceKind::Content, "# Notes"),
///     path: "notes.md".into(),
///     text: "# Notes".into(),
///     source_kind: SourceKind::Content,
///     line_range: LineRange::new(1, 1),
/// };
/// assert_eq!(chunk.embedding_input(), "notes.md\n# Notes");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Content address.
    pub id: ChunkId,
    /// Path of the file the text belongs to.
    pub path: String,
    /// Chunk text (lines joined with `\n`, overlong lines truncated).
    pub text: String,
    /// Whether the text is file content or a commit message.
    pub source_kind: SourceKind,
    /// Lines of the source text the chunk covers.
    pub line_range: LineRange,
}

impl Chunk {
    /// Text handed to the embedding provider: the path on its own line
    /// followed by the chunk text, so the file name weighs in on similarity.
    pub fn embedding_input(&self) -> String {
        format!("{}\n{}", self.path, self.text)
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Lines longer than `max_chars` are cut to their first `max_chars`
/// characters. Blank lines never start or end a chunk, so whitespace-only
/// text yields no chunks.
///
/// # Examples
///
/// ```
/// use strata_core::SourceKind;
/// use strata_lens::chunker::chunk_text;
///
/// let chunks = chunk_text("a.txt", "alpha\n\nbeta\n", SourceKind::Content, 400);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "alpha\n\nbeta");
/// assert_eq!((chunks[0].line_range.start, chunks[0].line_range.end), (1, 3));
///
/// assert!(chunk_text("a.txt", "", SourceKind::Content, 400).is_empty());
/// ```
pub fn chunk_text(path: &str, text: &str, kind: SourceKind, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut pending: Vec<(u32, &str)> = Vec::new();
    let mut pending_len = 0usize;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let line = truncate_chars(raw_line, max_chars);
        let line_len = line.chars().count();

        if line.trim().is_empty() {
            if !pending.is_empty() {
                pending.push((line_no, line));
                pending_len += 1 + line_len;
            }
            continue;
        }

        if !pending.is_empty() && pending_len + 1 + line_len > max_chars {
            flush(path, kind, &mut pending, &mut chunks);
            pending_len = 0;
        }

        if pending.is_empty() {
            pending_len = line_len;
        } else {
            pending_len += 1 + line_len;
        }
        pending.push((line_no, line));
    }

    flush(path, kind, &mut pending, &mut chunks);
    chunks
}

/// Chunk a folded file: its latest content plus each commit message.
///
/// # Examples
///
/// ```
/// use strata_core::SourceKind;
/// use strata_history::FileHistory;
/// use strata_lens::chunker::chunk_file;
///
/// let file = FileHistory {
///     path: "vehicles.txt".into(),
///     content: "motorbike, ford\n".into(),
///     messages: vec!["Add vehicle information".into()],
/// };
/// let chunks = chunk_file(&file, 400);
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[0].source_kind, SourceKind::Content);
/// assert_eq!(chunks[1].source_kind, SourceKind::CommitMessage);
/// ```
pub fn chunk_file(file: &FileHistory, max_chars: usize) -> Vec<Chunk> {
    let mut chunks = chunk_text(&file.path, &file.content, SourceKind::Content, max_chars);
    for message in &file.messages {
        chunks.extend(chunk_text(
            &file.path,
            message,
            SourceKind::CommitMessage,
            max_chars,
        ));
    }
    chunks
}

fn flush(path: &str, kind: SourceKind, pending: &mut Vec<(u32, &str)>, chunks: &mut Vec<Chunk>) {
    while pending.last().is_some_and(|(_, line)| line.trim().is_empty()) {
        pending.pop();
    }
    let (Some(&(start, _)), Some(&(end, _))) = (pending.first(), pending.last()) else {
        return;
    };

    let text = pending
        .iter()
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n");

    chunks.push(Chunk {
        id: ChunkId::derive(path, kind, &text),
        path: path.to_string(),
        text,
        source_kind: kind,
        line_range: LineRange::new(start, end),
    });
    pending.clear();
}

fn truncate_chars(line: &str, max_chars: usize) -> &str {
    match line.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &line[..byte_idx],
        None => line,
    }
}
