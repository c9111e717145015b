//! The search engine: indexing, query registration and resolution.
//!
//! An [`Engine`] is bound to one working directory and owns the store kept
//! there. Results only become visible through [`Engine::get_results`] after
//! the `fetch` that followed the latest `query`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_core::{StrataConfig, StrataError};
use strata_history::{fold_history, GitHistory, HistorySource, MiningOptions};
use tracing::{debug, info};

use crate::blocking;
use crate::cache::{ChunkCache, IndexReport};
use crate::chunker::{chunk_file, ChunkId};
use crate::embedding::{embedder_from_config, Embedder};
use crate::results::{FileMatch, LineMapper};
use crate::scoring::{rank_files, QueryTerms, RawHit, Weights};
use crate::store::{EmbeddingRecord, IndexStats, SqliteStore, VectorStore};

/// Where an [`Engine`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing indexed yet.
    Idle,
    /// History indexed, no query registered.
    Indexed,
    /// A query is registered but not fetched.
    QueryPending,
    /// The latest query has been fetched.
    Resolved,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Indexed => "indexed",
            EngineState::QueryPending => "query pending",
            EngineState::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// History as of the latest analysis.
///
/// Only chunks in `live` are searched: the store keeps records of content
/// that has since changed, and those must not rank a file.
struct Snapshot {
    contents: BTreeMap<String, Arc<str>>,
    live: HashSet<ChunkId>,
}

/// Semantic search over a repository's history.
///
/// # Examples
///
/// ```no_run
/// use strata_lens::Engine;
///
/// let mut engine = Engine::open(".").unwrap();
/// engine.analyze_codebase().unwrap();
/// engine.query("tomato pizza");
/// engine.fetch_sync().unwrap();
/// for result in engine.get_results() {
///     println!("{} {:.3} {:?}", result.path(), result.score(), result.get_lines("tomato pizza").unwrap());
/// }
/// ```
pub struct Engine {
    working_dir: PathBuf,
    config: StrataConfig,
    embedder: Arc<dyn Embedder>,
    store: Box<dyn VectorStore>,
    history: Box<dyn HistorySource>,
    mapper: Arc<LineMapper>,
    snapshot: Option<Snapshot>,
    state: EngineState,
    pending: Option<String>,
    results: Vec<FileMatch>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("working_dir", &self.working_dir)
            .field("model", &self.embedder.model())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Open an engine on `working_dir`, reading `.strata.toml` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot
    /// be opened.
    pub fn open(working_dir: impl AsRef<Path>) -> Result<Self, StrataError> {
        let working_dir = working_dir.as_ref();
        let config = StrataConfig::load(working_dir)?;
        let embedder = embedder_from_config(&config.embedding)?;
        Self::open_with(working_dir, config, embedder)
    }

    /// Open an engine with explicit configuration and embedder.
    ///
    /// The store is opened at `config.index.path` under `working_dir` and
    /// history is mined from the git repository there.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the store is missing, corrupt or
    /// inaccessible.
    pub fn open_with(
        working_dir: impl AsRef<Path>,
        config: StrataConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StrataError> {
        let working_dir = working_dir.as_ref().to_path_buf();
        let store_path = config.index.resolve(&working_dir);
        let store = SqliteStore::open(&store_path)?;
        debug!(path = %store_path.display(), "opened index");

        let history = GitHistory::new(
            working_dir.clone(),
            MiningOptions {
                branch: config.history.branch.clone(),
            },
        );
        let mapper = Arc::new(LineMapper::new(Arc::clone(&embedder), &config.search));

        Ok(Self {
            working_dir,
            config,
            embedder,
            store: Box::new(store),
            history: Box::new(history),
            mapper,
            snapshot: None,
            state: EngineState::Idle,
            pending: None,
            results: Vec::new(),
        })
    }

    /// Replace the history source (git by default).
    pub fn with_history(mut self, history: impl HistorySource + 'static) -> Self {
        self.history = Box::new(history);
        self
    }

    /// Replace the vector store (the SQLite index by default).
    pub fn with_store(mut self, store: impl VectorStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// The directory this engine indexes.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Effective configuration.
    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Mine history, chunk every file and embed chunks the store lacks.
    ///
    /// Repeating this on unchanged history embeds nothing. Chunks the
    /// provider fails on are listed in [`IndexReport::failures`] and do not
    /// abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be read or the store fails.
    pub fn analyze_codebase(&mut self) -> Result<IndexReport, StrataError> {
        let records = self.history.commits()?;
        let files = fold_history(&records);
        let chunks: Vec<_> = files
            .iter()
            .flat_map(|file| chunk_file(file, self.config.index.max_chunk_chars))
            .collect();
        debug!(
            commits = records.len(),
            files = files.len(),
            chunks = chunks.len(),
            "history folded"
        );
        let live: HashSet<ChunkId> = chunks.iter().map(|chunk| chunk.id.clone()).collect();

        let store: &mut dyn VectorStore = self.store.as_mut();
        let embedder = Arc::clone(&self.embedder);
        let batch_size = self.config.index.batch_size;
        let mut report = blocking::block_on(move |rt| {
            let cache = ChunkCache::new(store, embedder.as_ref(), batch_size);
            rt.block_on(cache.ensure_all(&chunks))
        })?;
        report.files = files.len();

        info!(
            files = report.files,
            embedded = report.embedded,
            reused = report.reused,
            failed = report.failures.len(),
            "index updated"
        );

        self.snapshot = Some(Snapshot {
            contents: files
                .into_iter()
                .map(|file| (file.path, Arc::from(file.content)))
                .collect(),
            live,
        });
        if self.state == EngineState::Idle {
            self.state = EngineState::Indexed;
        }
        Ok(report)
    }

    /// Register `text` as the query to resolve on the next fetch.
    ///
    /// Touches neither the embedder nor the store, and hides any earlier
    /// results until the next fetch completes.
    pub fn query(&mut self, text: impl Into<String>) {
        self.pending = Some(text.into());
        self.results.clear();
        self.state = EngineState::QueryPending;
    }

    /// Resolve the pending query.
    ///
    /// Embeds the query, reads the nearest chunks of the analyzed history
    /// from the store and ranks their files. Does nothing without a pending
    /// query. If the engine has not analyzed yet the query resolves to no
    /// results.
    ///
    /// The returned future is `Send`, so it can run on a spawned task.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or reading the store fails;
    /// the query then stays pending.
    pub async fn fetch(&mut self) -> Result<(), StrataError> {
        let Some(query) = self.pending.clone() else {
            return Ok(());
        };

        let results = if self.snapshot.is_some() {
            let embedder = Arc::clone(&self.embedder);
            let vector = embedder.embed_query(&query).await?;
            self.rank(&query, &vector)?
        } else {
            Vec::new()
        };

        debug!(query = %query, results = results.len(), "query resolved");
        self.results = results;
        self.pending = None;
        self.state = EngineState::Resolved;
        Ok(())
    }

    /// Blocking form of [`Engine::fetch`].
    ///
    /// # Errors
    ///
    /// Same as [`Engine::fetch`].
    pub fn fetch_sync(&mut self) -> Result<(), StrataError> {
        blocking::block_on(|rt| rt.block_on(self.fetch()))
    }

    /// Ranked results of the latest fetched query; empty otherwise.
    pub fn get_results(&self) -> &[FileMatch] {
        match self.state {
            EngineState::Resolved => &self.results,
            _ => &[],
        }
    }

    /// Store statistics.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the store cannot be read.
    pub fn stats(&self) -> Result<IndexStats, StrataError> {
        self.store.stats()
    }

    fn rank(&self, query: &str, vector: &[f32]) -> Result<Vec<FileMatch>, StrataError> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Ok(Vec::new());
        };

        let hits: Vec<RawHit> = self
            .store
            .query_where(vector, self.config.search.top_k, &|record: &EmbeddingRecord| {
                snapshot.live.contains(&record.chunk_id)
            })?
            .into_iter()
            .map(RawHit::from)
            .collect();

        let terms = QueryTerms::parse(query);
        let weights = Weights::from(&self.config.search);
        Ok(rank_files(&terms, &hits, &weights)
            .into_iter()
            .map(|file| {
                // Live chunks only come from analyzed files.
                let content = snapshot
                    .contents
                    .get(&file.path)
                    .map_or_else(|| Arc::from(""), Arc::clone);
                FileMatch::new(file.path, file.score, content, Arc::clone(&self.mapper))
            })
            .collect())
    }
}
