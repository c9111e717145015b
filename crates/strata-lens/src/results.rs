//! File-level results and on-demand line mapping.
//!
//! Chunk embeddings say which files match, not which lines. A [`FileMatch`]
//! re-scores the lines of its file against a query when asked, using the
//! same embedder and lexical signals as ranking.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use strata_core::{SearchConfig, StrataError};

use crate::blocking;
use crate::embedding::Embedder;
use crate::scoring::QueryTerms;
use crate::store::cosine_similarity;

/// Scores the lines of a text against a query.
pub struct LineMapper {
    embedder: Arc<dyn Embedder>,
    threshold: f64,
    token_boost: f64,
}

impl fmt::Debug for LineMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineMapper")
            .field("model", &self.embedder.model())
            .field("threshold", &self.threshold)
            .field("token_boost", &self.token_boost)
            .finish()
    }
}

impl LineMapper {
    /// Create a mapper using `config.line_threshold` and `config.token_boost`.
    pub fn new(embedder: Arc<dyn Embedder>, config: &SearchConfig) -> Self {
        Self {
            embedder,
            threshold: config.line_threshold,
            token_boost: config.token_boost,
        }
    }

    /// 1-based numbers of the lines in `content` relevant to `query`.
    ///
    /// Whitespace-only lines never match. When some lines contain the whole
    /// query phrase, exactly those lines are returned. Otherwise a line
    /// matches when its similarity to the query plus its token overlap
    /// exceeds the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Embedding`] if the provider fails.
    pub async fn matching_lines(
        &self,
        content: &str,
        query: &str,
    ) -> Result<BTreeSet<usize>, StrataError> {
        let terms = QueryTerms::parse(query);
        let candidates: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| (idx + 1, line))
            .collect();

        if candidates.is_empty() {
            return Ok(BTreeSet::new());
        }

        let exact: BTreeSet<usize> = candidates
            .iter()
            .filter(|(_, line)| terms.is_exact_in(line))
            .map(|(number, _)| *number)
            .collect();
        if !exact.is_empty() {
            return Ok(exact);
        }

        let query_vector = self.embedder.embed_query(query).await?;
        let texts: Vec<String> = candidates.iter().map(|(_, line)| line.to_string()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != candidates.len() {
            return Err(StrataError::Embedding(format!(
                "provider returned {} vectors for {} lines",
                vectors.len(),
                candidates.len()
            )));
        }

        Ok(candidates
            .iter()
            .zip(&vectors)
            .filter(|((_, line), vector)| {
                let score = cosine_similarity(&query_vector, vector)
                    + self.token_boost * terms.overlap(line);
                score > self.threshold
            })
            .map(|((number, _), _)| *number)
            .collect())
    }
}

/// One ranked file in a query's results.
#[derive(Clone)]
pub struct FileMatch {
    path: String,
    score: f64,
    content: Arc<str>,
    mapper: Arc<LineMapper>,
}

impl fmt::Debug for FileMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMatch")
            .field("path", &self.path)
            .field("score", &self.score)
            .finish_non_exhaustive()
    }
}

impl FileMatch {
    pub(crate) fn new(path: String, score: f64, content: Arc<str>, mapper: Arc<LineMapper>) -> Self {
        Self {
            path,
            score,
            content,
            mapper,
        }
    }

    /// Path relative to the repository root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Ranking score; higher is more relevant.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Latest content of the file.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Lines of the file relevant to `query`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Embedding`] if the provider fails.
    pub async fn lines(&self, query: &str) -> Result<BTreeSet<usize>, StrataError> {
        self.mapper.matching_lines(&self.content, query).await
    }

    /// Blocking form of [`FileMatch::lines`].
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Embedding`] if the provider fails.
    pub fn get_lines(&self, query: &str) -> Result<BTreeSet<usize>, StrataError> {
        blocking::block_on(|rt| rt.block_on(self.lines(query)))
    }
}
