//! Content-addressed chunk cache.
//!
//! A chunk is embedded only if the store does not already hold its id. Since
//! ids are derived from path, source kind and text, re-indexing unchanged
//! history costs no embedding calls, within one process or across restarts.

use std::collections::HashSet;

use serde::Serialize;
use strata_core::{SourceKind, StrataError};
use tracing::{debug, warn};

use crate::chunker::{Chunk, ChunkId};
use crate::embedding::Embedder;
use crate::store::{EmbeddingRecord, VectorStore};

/// A chunk the embedding provider failed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedFailure {
    pub chunk_id: ChunkId,
    pub path: String,
    pub source_kind: SourceKind,
    pub message: String,
}

/// Outcome of one indexing run.
///
/// # Examples
///
/// ```
/// use strata_lens::cache::IndexReport;
///
/// let report = IndexReport::default();
/// assert!(report.is_complete());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    /// Files seen in history.
    pub files: usize,
    /// Distinct chunks produced.
    pub chunks: usize,
    /// Chunks embedded and stored during this run.
    pub embedded: usize,
    /// Chunks already present in the store.
    pub reused: usize,
    /// Chunks skipped because embedding failed.
    pub failures: Vec<EmbedFailure>,
}

impl IndexReport {
    /// Whether every chunk ended up in the store.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Embeds chunks the store has not seen yet.
pub struct ChunkCache<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    batch_size: usize,
}

impl<'a> ChunkCache<'a> {
    /// Create a cache over `store` that embeds with `embedder`, sending at
    /// most `batch_size` chunks per provider call.
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn Embedder, batch_size: usize) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Make sure `chunk` is in the store. Returns `true` if it was embedded
    /// and inserted, `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Embedding`] if the provider fails and
    /// [`StrataError::Database`] if the store does.
    pub async fn ensure_embedded(&self, chunk: &Chunk) -> Result<bool, StrataError> {
        if self.store.contains(&chunk.id)? {
            return Ok(false);
        }

        let vector = self.embed_one(chunk).await?;
        self.insert(chunk, vector)?;
        Ok(true)
    }

    /// Make sure every chunk is in the store.
    ///
    /// New chunks are embedded in batches. When a batch fails, its chunks
    /// are retried one at a time so a single bad chunk does not take the
    /// rest down with it; chunks that still fail are reported, and chunks
    /// stored before the failure stay stored.
    ///
    /// # Errors
    ///
    /// Only store failures are returned as errors.
    pub async fn ensure_all(&self, chunks: &[Chunk]) -> Result<IndexReport, StrataError> {
        let mut report = IndexReport::default();
        let mut seen = HashSet::new();
        let mut paths = HashSet::new();
        let mut pending = Vec::new();

        for chunk in chunks {
            if !seen.insert(&chunk.id) {
                continue;
            }
            paths.insert(chunk.path.as_str());
            if self.store.contains(&chunk.id)? {
                report.reused += 1;
            } else {
                pending.push(chunk);
            }
        }
        report.chunks = seen.len();
        report.files = paths.len();

        debug!(
            new = pending.len(),
            reused = report.reused,
            "chunks checked against store"
        );

        for batch in pending.chunks(self.batch_size) {
            let inputs: Vec<String> = batch.iter().map(|c| c.embedding_input()).collect();
            match self.embedder.embed_documents(&inputs).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for (chunk, vector) in batch.iter().zip(vectors) {
                        self.insert(chunk, vector)?;
                        report.embedded += 1;
                    }
                }
                outcome => {
                    if let Err(e) = outcome {
                        warn!(batch = batch.len(), error = %e, "batch embedding failed, retrying chunks one by one");
                    }
                    for chunk in batch {
                        match self.embed_one(chunk).await {
                            Ok(vector) => {
                                self.insert(chunk, vector)?;
                                report.embedded += 1;
                            }
                            Err(e) => {
                                warn!(path = %chunk.path, chunk = %chunk.id, error = %e, "skipping chunk");
                                report.failures.push(EmbedFailure {
                                    chunk_id: chunk.id.clone(),
                                    path: chunk.path.clone(),
                                    source_kind: chunk.source_kind,
                                    message: e.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    async fn embed_one(&self, chunk: &Chunk) -> Result<Vec<f32>, StrataError> {
        self.embedder
            .embed_documents(&[chunk.embedding_input()])
            .await?
            .pop()
            .ok_or_else(|| StrataError::Embedding("provider returned no vector".into()))
    }

    fn insert(&self, chunk: &Chunk, vector: Vec<f32>) -> Result<(), StrataError> {
        self.store.check_dimensions(vector.len())?;
        self.store.upsert(&EmbeddingRecord::from_chunk(chunk, vector))
    }
}
