//! Vector store contract and its SQLite implementation.
//!
//! Records are keyed by [`ChunkId`] and carry the chunk's provenance next to
//! its vector. Vectors are stored as little-endian `f32` BLOBs and cosine
//! similarity is computed in Rust.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use strata_core::{LineRange, SourceKind, StrataError};

use crate::chunker::{Chunk, ChunkId};

/// Provenance stored next to a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// File the chunk belongs to.
    pub path: String,
    /// Chunk text.
    pub text: String,
    /// Lines of the source text the chunk covers.
    pub line_range: LineRange,
    /// File content or commit message.
    pub source_kind: SourceKind,
}

/// A persisted embedding.
///
/// # Examples
///
/// ```
/// use strata_core::SourceKind;
/// use strata_lens::chunker::chunk_text;
/// use strata_lens::store::EmbeddingRecord;
///
/// let chunk = chunk_text("a.txt", "hello", SourceKind::Content, 400).remove(0);
/// let record = EmbeddingRecord::from_chunk(&chunk, vec![1.0, 0.0]);
/// assert_eq!(record.chunk_id, chunk.id);
/// assert_eq!(record.metadata.text, "hello");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    /// Content address of the chunk.
    pub chunk_id: ChunkId,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Provenance.
    pub metadata: ChunkMetadata,
}

impl EmbeddingRecord {
    /// Pair a chunk with its vector.
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            vector,
            metadata: ChunkMetadata {
                path: chunk.path.clone(),
                text: chunk.text.clone(),
                line_range: chunk.line_range,
                source_kind: chunk.source_kind,
            },
        }
    }
}

/// Store statistics.
///
/// # Examples
///
/// ```
/// use strata_lens::store::IndexStats;
///
/// let stats = IndexStats { total_records: 12, total_files: 3, index_size_bytes: 4096 };
/// assert_eq!(stats.total_files, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Number of stored records.
    pub total_records: usize,
    /// Number of distinct paths among the records.
    pub total_files: usize,
    /// Size of the backing database in bytes.
    pub index_size_bytes: u64,
}

/// Operations strata needs from a vector store.
///
/// `upsert` must be idempotent, and a store re-opened at the same location
/// must see every record upserted before.
pub trait VectorStore: Send {
    /// Insert or replace the record with `record.chunk_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on write failure.
    fn upsert(&self, record: &EmbeddingRecord) -> Result<(), StrataError>;

    /// Look up a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on read failure.
    fn get(&self, id: &ChunkId) -> Result<Option<EmbeddingRecord>, StrataError>;

    /// Whether a record with this id exists.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on read failure.
    fn contains(&self, id: &ChunkId) -> Result<bool, StrataError> {
        Ok(self.get(id)?.is_some())
    }

    /// The `top_k` records most similar to `vector`, most similar first.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on read failure.
    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<(EmbeddingRecord, f64)>, StrataError> {
        self.query_where(vector, top_k, &|_| true)
    }

    /// Like [`VectorStore::query`], but only records accepted by `keep`
    /// compete for the `top_k` slots.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on read failure.
    fn query_where(
        &self,
        vector: &[f32],
        top_k: usize,
        keep: &dyn Fn(&EmbeddingRecord) -> bool,
    ) -> Result<Vec<(EmbeddingRecord, f64)>, StrataError>;

    /// Reject vectors whose length differs from what the store already holds.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on a mismatch.
    fn check_dimensions(&self, _dimensions: usize) -> Result<(), StrataError> {
        Ok(())
    }

    /// Record counts and size.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on read failure.
    fn stats(&self) -> Result<IndexStats, StrataError>;

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on read failure.
    fn len(&self) -> Result<usize, StrataError> {
        Ok(self.stats()?.total_records)
    }

    /// Whether the store holds no records.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on read failure.
    fn is_empty(&self) -> Result<bool, StrataError> {
        Ok(self.len()? == 0)
    }
}

/// SQLite-backed [`VectorStore`].
///
/// # Examples
///
/// ```
/// use strata_lens::store::{SqliteStore, VectorStore};
///
/// let store = SqliteStore::in_memory().unwrap();
/// assert_eq!(store.stats().unwrap().total_records, 0);
/// ```
pub struct SqliteStore {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

const DIMENSIONS_KEY: &str = "embedding_dimensions";

impl SqliteStore {
    /// Open or create a store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the file cannot be opened or is
    /// not a valid store.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use strata_lens::store::SqliteStore;
    ///
    /// let store = SqliteStore::open(Path::new(".strata/index.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self, StrataError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StrataError::Database(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StrataError::Database(format!("failed to open database: {e}")))?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, StrataError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StrataError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StrataError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS embeddings (
                    chunk_id TEXT PRIMARY KEY,
                    path TEXT NOT NULL,
                    text TEXT NOT NULL,
                    start_line INTEGER NOT NULL,
                    end_line INTEGER NOT NULL,
                    source_kind TEXT NOT NULL,
                    vector BLOB NOT NULL
                );

                CREATE INDEX IF NOT EXISTS embeddings_path ON embeddings(path);
                ",
            )
            .map_err(|e| StrataError::Database(format!("failed to create schema: {e}")))?;

        Ok(())
    }

    /// Embedding dimensions recorded by the first upsert, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure or corrupt metadata.
    pub fn dimensions(&self) -> Result<Option<usize>, StrataError> {
        match self.get_metadata(DIMENSIONS_KEY)? {
            Some(v) => {
                let dims: usize = v.parse().map_err(|_| {
                    StrataError::Database(format!("corrupted dimension metadata in index: '{v}'"))
                })?;
                Ok(Some(dims))
            }
            None => Ok(None),
        }
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>, StrataError> {
        self.conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StrataError::Database(format!("failed to get metadata '{key}': {e}")))
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<(), StrataError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| StrataError::Database(format!("failed to set metadata '{key}': {e}")))?;
        Ok(())
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmbeddingRecord> {
    let kind: String = row.get(5)?;
    let source_kind = kind.parse::<SourceKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
    })?;
    let vector_bytes: Vec<u8> = row.get(6)?;

    Ok(EmbeddingRecord {
        chunk_id: ChunkId::from_stored(row.get::<_, String>(0)?),
        vector: bytes_to_floats(&vector_bytes),
        metadata: ChunkMetadata {
            path: row.get(1)?,
            text: row.get(2)?,
            line_range: LineRange::new(row.get(3)?, row.get(4)?),
            source_kind,
        },
    })
}

const SELECT_RECORD: &str =
    "SELECT chunk_id, path, text, start_line, end_line, source_kind, vector FROM embeddings";

impl VectorStore for SqliteStore {
    fn upsert(&self, record: &EmbeddingRecord) -> Result<(), StrataError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO embeddings
                 (chunk_id, path, text, start_line, end_line, source_kind, vector)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.chunk_id.as_str(),
                    record.metadata.path,
                    record.metadata.text,
                    record.metadata.line_range.start,
                    record.metadata.line_range.end,
                    record.metadata.source_kind.as_str(),
                    floats_to_bytes(&record.vector),
                ],
            )
            .map_err(|e| StrataError::Database(format!("failed to upsert record: {e}")))?;
        Ok(())
    }

    fn get(&self, id: &ChunkId) -> Result<Option<EmbeddingRecord>, StrataError> {
        self.conn
            .query_row(
                &format!("{SELECT_RECORD} WHERE chunk_id = ?1"),
                params![id.as_str()],
                record_from_row,
            )
            .optional()
            .map_err(|e| StrataError::Database(format!("failed to read record: {e}")))
    }

    fn contains(&self, id: &ChunkId) -> Result<bool, StrataError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM embeddings WHERE chunk_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StrataError::Database(format!("failed to check record: {e}")))?;
        Ok(count > 0)
    }

    fn query_where(
        &self,
        vector: &[f32],
        top_k: usize,
        keep: &dyn Fn(&EmbeddingRecord) -> bool,
    ) -> Result<Vec<(EmbeddingRecord, f64)>, StrataError> {
        let mut stmt = self
            .conn
            .prepare(SELECT_RECORD)
            .map_err(|e| StrataError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], record_from_row)
            .map_err(|e| StrataError::Database(format!("failed to query records: {e}")))?;

        let mut scored = Vec::new();
        for row in rows {
            let record =
                row.map_err(|e| StrataError::Database(format!("failed to read row: {e}")))?;
            if !keep(&record) {
                continue;
            }
            let score = cosine_similarity(vector, &record.vector);
            scored.push((record, score));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
        });
        scored.truncate(top_k);

        Ok(scored)
    }

    fn check_dimensions(&self, dimensions: usize) -> Result<(), StrataError> {
        if let Some(stored) = self.dimensions()? {
            if stored != dimensions {
                return Err(StrataError::Database(format!(
                    "index was created with {stored} dimensions but the embedding provider produces {dimensions}; \
                     delete the index to rebuild it"
                )));
            }
            return Ok(());
        }

        self.set_metadata(DIMENSIONS_KEY, &dimensions.to_string())
    }

    fn stats(&self) -> Result<IndexStats, StrataError> {
        let (total_records, total_files): (i64, i64) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT path) FROM embeddings",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| StrataError::Database(format!("failed to count records: {e}")))?;

        // For in-memory databases, page_count returns a small number
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(IndexStats {
            total_records: total_records as usize,
            total_files: total_files as usize,
            index_size_bytes: (page_count * page_size) as u64,
        })
    }
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, zero or mismatched vectors.
///
/// # Examples
///
/// ```
/// use strata_lens::store::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
/// assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}
