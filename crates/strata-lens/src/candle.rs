//! Local sentence embeddings with candle.
//!
//! [`CandleEmbedder`] runs a BERT sentence-transformer on the CPU, mean-pools
//! the last hidden state and L2-normalizes the result. `model` is either a
//! Hugging Face Hub repository id (all-MiniLM-L6-v2 by default) or a local
//! directory holding `config.json`, `tokenizer.json` and `model.safetensors`.
//! Weights are loaded on the first embedding call, so opening an engine never
//! touches the network.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use strata_core::{EmbeddingConfig, StrataError};
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;
use tracing::info;

use crate::embedding::Embedder;

/// Default model: all-MiniLM-L6-v2, 384 dimensions.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Longest token sequence fed to the model, special tokens included.
const MAX_TOKENS: usize = 256;

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        }
    }

    fn from_hub(repo_id: &str) -> Result<Self, StrataError> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| {
            StrataError::Embedding(format!("failed to create Hugging Face API client: {e}"))
        })?;
        let repo = api.model(repo_id.to_owned());
        let get = |name: &str| {
            repo.get(name).map_err(|e| {
                StrataError::Embedding(format!("failed to download {name} from {repo_id}: {e}"))
            })
        };

        Ok(Self {
            config: get("config.json")?,
            tokenizer: get("tokenizer.json")?,
            weights: get("model.safetensors")?,
        })
    }
}

struct SentenceModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceModel {
    fn load(source: &str, device: &Device) -> Result<Self, StrataError> {
        let dir = Path::new(source);
        let files = if dir.is_dir() {
            ModelFiles::in_dir(dir)
        } else {
            ModelFiles::from_hub(source)?
        };

        let config = std::fs::read_to_string(&files.config)
            .map_err(|e| StrataError::Embedding(format!("failed to read model config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config)
            .map_err(|e| StrataError::Embedding(format!("invalid model config: {e}")))?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| StrataError::Embedding(format!("failed to load tokenizer: {e}")))?;

        // SAFETY: the safetensors file is not modified while the VarBuilder maps it.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, device)
        }
        .map_err(|e| StrataError::Embedding(format!("failed to map model weights: {e}")))?;
        let model = BertModel::load(vb, &config)
            .map_err(|e| StrataError::Embedding(format!("failed to load BERT model: {e}")))?;

        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
        })
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, StrataError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| StrataError::Embedding(format!("tokenizer encode failed: {e}")))?;

        let mut ids = encoding.get_ids().to_vec();
        if ids.len() > MAX_TOKENS {
            // Keep the trailing separator token.
            let last = ids[ids.len() - 1];
            ids.truncate(MAX_TOKENS - 1);
            ids.push(last);
        }

        self.forward(&ids)
            .map_err(|e| StrataError::Embedding(format!("model forward pass failed: {e}")))
    }

    fn forward(&self, ids: &[u32]) -> candle_core::Result<Vec<f32>> {
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;

        let (_, seq_len, _) = hidden.dims3()?;
        let pooled = (hidden.sum(1)? / seq_len as f64)?;
        let norm = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        pooled.broadcast_div(&norm)?.squeeze(0)?.to_vec1::<f32>()
    }
}

/// Sentence-transformer embeddings computed in-process.
///
/// # Examples
///
/// ```
/// use strata_lens::candle::{CandleEmbedder, DEFAULT_MODEL};
/// use strata_lens::embedding::Embedder;
///
/// // Nothing is downloaded until the first embedding call.
/// let embedder = CandleEmbedder::new(DEFAULT_MODEL);
/// assert_eq!(embedder.model(), "sentence-transformers/all-MiniLM-L6-v2");
/// ```
pub struct CandleEmbedder {
    source: String,
    loaded: OnceCell<Arc<SentenceModel>>,
}

impl std::fmt::Debug for CandleEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbedder")
            .field("source", &self.source)
            .field("loaded", &self.loaded.initialized())
            .finish()
    }
}

impl CandleEmbedder {
    /// Embedder for a Hub repository id or a local model directory.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            loaded: OnceCell::new(),
        }
    }

    /// Embedder for `config.model`, or [`DEFAULT_MODEL`] when unset.
    pub fn with_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        )
    }

    async fn model_handle(&self) -> Result<Arc<SentenceModel>, StrataError> {
        let model = self
            .loaded
            .get_or_try_init(|| async {
                info!(model = %self.source, "loading embedding model");
                let source = self.source.clone();
                let model = tokio::task::spawn_blocking(move || {
                    SentenceModel::load(&source, &Device::Cpu)
                })
                .await
                .map_err(|e| StrataError::Embedding(format!("model loading task failed: {e}")))??;
                Ok::<_, StrataError>(Arc::new(model))
            })
            .await?;
        Ok(Arc::clone(model))
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model(&self) -> &str {
        &self.source
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StrataError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model_handle().await?;
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|text| model.embed(text))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| StrataError::Embedding(format!("embedding task failed: {e}")))?
    }
}
