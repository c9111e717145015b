//! Hit scoring and file ranking.
//!
//! Raw similarity from the vector store is combined with three lexical
//! signals: the whole query phrase appearing in the hit, the fraction of
//! query tokens appearing in the hit, and the fraction of query tokens
//! appearing in the file path. A file scores as its best hit.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use strata_core::{LineRange, SearchConfig, SourceKind};

use crate::chunker::ChunkId;
use crate::store::EmbeddingRecord;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "to", "with",
];

/// Lowercase `text` and split it on anything that is not alphanumeric.
///
/// # Examples
///
/// ```
/// use strata_lens::scoring::tokenize;
///
/// assert_eq!(tokenize("Apple iPhone-12!"), vec!["apple", "iphone", "12"]);
/// assert!(tokenize(" ... ").is_empty());
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

/// A parsed query: its normalised phrase and its distinct content tokens.
///
/// # Examples
///
/// ```
/// use strata_lens::scoring::QueryTerms;
///
/// let terms = QueryTerms::parse("Apple iPhone 12");
/// assert!(terms.is_exact_in("7: apple iphone 12"));
/// assert!(!terms.is_exact_in("apple iphone 123"));
/// assert_eq!(terms.overlap("an iphone"), 1.0 / 3.0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerms {
    phrase: String,
    tokens: Vec<String>,
}

impl QueryTerms {
    /// Parse a free-text query. Stop words are dropped from the token list
    /// but kept in the phrase.
    pub fn parse(query: &str) -> Self {
        let phrase = normalize(query);
        let mut seen = HashSet::new();
        let tokens = tokenize(query)
            .into_iter()
            .filter(|token| !STOP_WORDS.contains(&token.as_str()))
            .filter(|token| seen.insert(token.clone()))
            .collect();
        Self { phrase, tokens }
    }

    /// The query tokens used for overlap scoring.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether the whole query phrase occurs in `text` on token boundaries,
    /// ignoring case and punctuation.
    pub fn is_exact_in(&self, text: &str) -> bool {
        if self.phrase.is_empty() {
            return false;
        }
        format!(" {} ", normalize(text)).contains(&format!(" {} ", self.phrase))
    }

    /// Fraction of query tokens present in `text`, in `[0, 1]`.
    pub fn overlap(&self, text: &str) -> f64 {
        if self.tokens.is_empty() {
            return 0.0;
        }
        let present: HashSet<String> = tokenize(text).into_iter().collect();
        let found = self
            .tokens
            .iter()
            .filter(|token| present.contains(*token))
            .count();
        found as f64 / self.tokens.len() as f64
    }
}

/// Boost weights applied on top of raw similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    /// Added when the query phrase occurs in the hit text.
    pub exact: f64,
    /// Scaled by the query-token overlap with the hit text.
    pub token: f64,
    /// Scaled by the query-token overlap with the file path.
    pub filename: f64,
}

impl From<&SearchConfig> for Weights {
    fn from(config: &SearchConfig) -> Self {
        Self {
            exact: config.exact_boost,
            token: config.token_boost,
            filename: config.filename_boost,
        }
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

/// One chunk returned by a vector-store query.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub chunk_id: ChunkId,
    pub path: String,
    pub text: String,
    pub line_range: LineRange,
    pub source_kind: SourceKind,
    pub similarity: f64,
}

impl From<(EmbeddingRecord, f64)> for RawHit {
    fn from((record, similarity): (EmbeddingRecord, f64)) -> Self {
        Self {
            chunk_id: record.chunk_id,
            path: record.metadata.path,
            text: record.metadata.text,
            line_range: record.metadata.line_range,
            source_kind: record.metadata.source_kind,
            similarity,
        }
    }
}

/// Similarity plus lexical boosts for one hit.
///
/// Content and commit-message hits are scored the same way.
///
/// # Examples
///
/// ```
/// use strata_core::{LineRange, SourceKind};
/// use strata_lens::chunker::ChunkId;
/// use strata_lens::scoring::{adjusted_score, QueryTerms, RawHit, Weights};
///
/// let hit = RawHit {
///     chunk_id: ChunkId::derive("recipes.txt", SourceKind::Content, "tomato pizza"),
///     path: "recipes.txt".into(),
///     text: "tomato pizza".into(),
///     line_range: LineRange::new(1, 1),
///     source_kind: SourceKind::Content,
///     similarity: 0.5,
/// };
/// let terms = QueryTerms::parse("tomato pizza");
/// let weights = Weights { exact: 1.0, token: 1.0, filename: 0.5 };
/// assert_eq!(adjusted_score(&terms, &hit, &weights), 2.5);
/// ```
pub fn adjusted_score(terms: &QueryTerms, hit: &RawHit, weights: &Weights) -> f64 {
    let exact = if terms.is_exact_in(&hit.text) {
        weights.exact
    } else {
        0.0
    };
    hit.similarity
        + exact
        + weights.token * terms.overlap(&hit.text)
        + weights.filename * terms.overlap(&hit.path)
}

/// A ranked file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileScore {
    pub path: String,
    pub score: f64,
}

/// Group hits by path, score each file by its best hit, and rank files by
/// descending score with ties broken by path.
///
/// # Examples
///
/// ```
/// use strata_core::{LineRange, SourceKind};
/// use strata_lens::chunker::ChunkId;
/// use strata_lens::scoring::{rank_files, QueryTerms, RawHit, Weights};
///
/// let hit = |path: &str, text: &str, similarity: f64| RawHit {
///     chunk_id: ChunkId::derive(path, SourceKind::Content, text),
///     path: path.into(),
///     text: text.into(),
///     line_range: LineRange::new(1, 1),
///     source_kind: SourceKind::Content,
///     similarity,
/// };
/// let hits = vec![hit("b.txt", "x", 0.4), hit("a.txt", "y", 0.1), hit("b.txt", "z", 0.2)];
/// let ranked = rank_files(&QueryTerms::parse("query"), &hits, &Weights::default());
/// assert_eq!(ranked.len(), 2);
/// assert_eq!(ranked[0].path, "b.txt");
/// assert_eq!(ranked[0].score, 0.4);
/// ```
pub fn rank_files(terms: &QueryTerms, hits: &[RawHit], weights: &Weights) -> Vec<FileScore> {
    let mut best: BTreeMap<&str, f64> = BTreeMap::new();
    for hit in hits {
        let score = adjusted_score(terms, hit, weights);
        best.entry(hit.path.as_str())
            .and_modify(|current| *current = current.max(score))
            .or_insert(score);
    }

    let mut ranked: Vec<FileScore> = best
        .into_iter()
        .map(|(path, score)| FileScore {
            path: path.to_string(),
            score,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    ranked
}
