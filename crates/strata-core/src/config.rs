use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StrataError;

/// Name of the per-repository configuration file.
pub const CONFIG_FILE_NAME: &str = ".strata.toml";

/// Top-level configuration loaded from `.strata.toml`.
///
/// Every section is optional; a missing file or an empty file yields the
/// defaults.
///
/// # Examples
///
/// ```
/// use strata_core::StrataConfig;
///
/// let config = StrataConfig::default();
/// assert_eq!(config.embedding.provider, "candle");
/// assert_eq!(config.search.top_k, 50);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Chunking and persistence settings.
    #[serde(default)]
    pub index: IndexConfig,
    /// History mining settings.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Ranking and line-mapping settings.
    #[serde(default)]
    pub search: SearchConfig,
}

impl StrataConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Io`] if the file cannot be read, or
    /// [`StrataError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use strata_core::StrataConfig;
    /// use std::path::Path;
    ///
    /// let config = StrataConfig::from_file(Path::new(".strata.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, StrataError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_core::StrataConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// top_k = 10
    /// "#;
    /// let config = StrataConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.top_k, 10);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, StrataError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load `.strata.toml` from `working_dir`, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(working_dir: &Path) -> Result<Self, StrataError> {
        let path = working_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Configuration for the embedding provider.
///
/// # Examples
///
/// ```
/// use strata_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "candle");
/// assert!(config.model.is_none());
/// assert_eq!(config.dimensions, 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `"candle"` (local sentence-transformer), `"hashing"` (feature
    /// hashing, no semantics) or `"voyage"` (default: `"candle"`).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// API key for a remote provider. Falls back to `VOYAGE_API_KEY`.
    pub api_key: Option<String>,
    /// Model name. For `"candle"` a Hugging Face repository id or a local
    /// model directory (default: `sentence-transformers/all-MiniLM-L6-v2`);
    /// for `"voyage"` the API model (default: `voyage-code-3`).
    pub model: Option<String>,
    /// Vector dimensions of the `"hashing"` provider (default: 1024).
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Custom base URL for the remote provider.
    pub base_url: Option<String>,
}

fn default_embedding_provider() -> String {
    "candle".into()
}

fn default_embedding_dimensions() -> usize {
    1024
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: None,
            dimensions: default_embedding_dimensions(),
            base_url: None,
        }
    }
}

/// Chunking and persistence configuration.
///
/// # Examples
///
/// ```
/// use strata_core::IndexConfig;
///
/// let config = IndexConfig::default();
/// assert_eq!(config.max_chunk_chars, 400);
/// assert_eq!(config.batch_size, 64);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Store location, relative to the working directory unless absolute
    /// (default: `.strata/index.db`).
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Upper bound on a chunk's length in characters (default: 400).
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// Number of chunks sent to the embedding provider per call (default: 64).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".strata").join("index.db")
}

fn default_max_chunk_chars() -> usize {
    400
}

fn default_batch_size() -> usize {
    64
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            max_chunk_chars: default_max_chunk_chars(),
            batch_size: default_batch_size(),
        }
    }
}

impl IndexConfig {
    /// Resolve the store location against a working directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use strata_core::IndexConfig;
    ///
    /// let config = IndexConfig::default();
    /// let path = config.resolve(Path::new("/repo"));
    /// assert_eq!(path, Path::new("/repo/.strata/index.db"));
    /// ```
    pub fn resolve(&self, working_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            working_dir.join(&self.path)
        }
    }
}

/// History mining configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Branch to walk (default: HEAD).
    pub branch: Option<String>,
}

/// Ranking and line-mapping configuration.
///
/// The boosts are added to the raw cosine similarity of a hit, so a value of
/// `1.0` is enough to lift an exact match above any paraphrase.
///
/// # Examples
///
/// ```
/// use strata_core::SearchConfig;
///
/// let config = SearchConfig::default();
/// assert_eq!(config.exact_boost, 1.0);
/// assert_eq!(config.line_threshold, 0.2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Nearest neighbours fetched from the store per query (default: 50).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Added when the whole query phrase appears in a hit (default: 1.0).
    #[serde(default = "default_exact_boost")]
    pub exact_boost: f64,
    /// Scaled by the fraction of query tokens found in a hit (default: 1.0).
    #[serde(default = "default_token_boost")]
    pub token_boost: f64,
    /// Scaled by the fraction of query tokens found in the file path (default: 0.5).
    #[serde(default = "default_filename_boost")]
    pub filename_boost: f64,
    /// Minimum line score reported by line mapping (default: 0.2).
    #[serde(default = "default_line_threshold")]
    pub line_threshold: f64,
}

fn default_top_k() -> usize {
    50
}

fn default_exact_boost() -> f64 {
    1.0
}

fn default_token_boost() -> f64 {
    1.0
}

fn default_filename_boost() -> f64 {
    0.5
}

fn default_line_threshold() -> f64 {
    0.2
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            exact_boost: default_exact_boost(),
            token_boost: default_token_boost(),
            filename_boost: default_filename_boost(),
            line_threshold: default_line_threshold(),
        }
    }
}
