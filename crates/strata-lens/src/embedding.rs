//! Embedding providers.
//!
//! [`Embedder`] is the seam between strata and whatever turns text into
//! vectors. Three providers ship with the crate:
//!
//! - `"candle"` (default): a local sentence-transformer, see
//!   [`CandleEmbedder`](crate::candle::CandleEmbedder). Requires the
//!   `candle` feature.
//! - `"hashing"`: the offline
//!   [`HashingEmbedder`](crate::hashing::HashingEmbedder), with no semantic
//!   knowledge.
//! - `"voyage"`: [`VoyageClient`], a client for the Voyage AI embeddings API
//!   that uses `input_type: "document"` for indexing and
//!   `input_type: "query"` for search.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_core::{EmbeddingConfig, StrataError};

use crate::hashing::HashingEmbedder;

/// Turns text into vectors.
///
/// Implementations must be deterministic for identical input: the chunk
/// cache relies on stored vectors staying valid for unchanged text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for logs and diagnostics.
    fn model(&self) -> &str;

    /// Embed a batch of documents. Returns vectors in input order.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Embedding`] if the provider fails.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StrataError>;

    /// Embed a search query.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Embedding`] if the provider fails.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, StrataError> {
        self.embed_documents(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StrataError::Embedding("provider returned no vector".into()))
    }
}

/// Build the provider named in `config.provider`.
///
/// # Errors
///
/// Returns [`StrataError::Config`] for an unknown provider or a remote
/// provider without an API key.
///
/// # Examples
///
/// ```
/// use strata_core::EmbeddingConfig;
/// use strata_lens::embedding::embedder_from_config;
///
/// let config = EmbeddingConfig { provider: "hashing".into(), ..EmbeddingConfig::default() };
/// let embedder = embedder_from_config(&config).unwrap();
/// assert_eq!(embedder.model(), "feature-hashing");
/// ```
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, StrataError> {
    match config.provider.as_str() {
        "candle" => candle_embedder(config),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        "voyage" => Ok(Arc::new(VoyageClient::with_config(config)?)),
        other => Err(StrataError::Config(format!(
            "unknown embedding provider '{other}': expected \"candle\", \"hashing\" or \"voyage\""
        ))),
    }
}

#[cfg(feature = "candle")]
fn candle_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, StrataError> {
    Ok(Arc::new(crate::candle::CandleEmbedder::with_config(config)))
}

#[cfg(not(feature = "candle"))]
fn candle_embedder(_config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, StrataError> {
    Err(StrataError::Config(
        "strata-lens was built without the `candle` feature: set embedding.provider to \"hashing\" or \"voyage\"".into(),
    ))
}

/// Client for the Voyage AI embedding API.
///
/// # Examples
///
/// ```
/// use strata_lens::embedding::{Embedder, VoyageClient};
///
/// let client = VoyageClient::new("test-key");
/// assert_eq!(client.model(), "voyage-code-3");
/// ```
pub struct VoyageClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for VoyageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoyageClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";
const DEFAULT_MODEL: &str = "voyage-code-3";
const BATCH_SIZE: usize = 64;
const BATCH_DELAY_MS: u64 = 200;

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    input_type: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
}

impl VoyageClient {
    /// Create a client with the given API key and the default model.
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to the `VOYAGE_API_KEY` env var if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] if no API key is available.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use strata_core::EmbeddingConfig;
    /// use strata_lens::embedding::VoyageClient;
    ///
    /// let config = EmbeddingConfig { provider: "voyage".into(), ..EmbeddingConfig::default() };
    /// let client = VoyageClient::with_config(&config).unwrap();
    /// ```
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, StrataError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("VOYAGE_API_KEY").ok())
            .ok_or_else(|| {
                StrataError::Config(
                    "embedding API key not found: set embedding.api_key in .strata.toml or VOYAGE_API_KEY env var".into(),
                )
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    async fn post(&self, request: &EmbedRequest) -> Result<Vec<Vec<f32>>, StrataError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| StrataError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(StrataError::Embedding(format!(
                "Voyage API returned {status}: {body}"
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| StrataError::Embedding(format!("failed to parse response: {e}")))?;

        if embed_response.data.len() != request.input.len() {
            return Err(StrataError::Embedding(format!(
                "Voyage API returned {} vectors for {} inputs",
                embed_response.data.len(),
                request.input.len()
            )));
        }

        Ok(embed_response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect())
    }

    fn build_request(&self, texts: &[String], input_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            input_type: input_type.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for VoyageClient {
    fn model(&self) -> &str {
        &self.model
    }

    /// Voyage accepts up to 128 texts per call; batches of 64 are sent with
    /// a 200ms pause between them to stay under the rate limit.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StrataError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(BATCH_DELAY_MS)).await;
            }
            let request = self.build_request(batch, "document");
            all_embeddings.extend(self.post(&request).await?);
        }

        Ok(all_embeddings)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, StrataError> {
        let request = self.build_request(&[query.to_string()], "query");
        self.post(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StrataError::Embedding("empty response from Voyage API".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_format_is_correct() {
        let client = VoyageClient::new("test-key");
        let texts = vec!["fn main() {}".to_string(), "struct Foo {}".to_string()];
        let request = client.build_request(&texts, "document");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "voyage-code-3");
        assert_eq!(json["input_type"], "document");
        assert_eq!(json["input"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn query_request_uses_query_input_type() {
        let client = VoyageClient::new("test-key");
        let request = client.build_request(&["auth logic".to_string()], "query");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input_type"], "query");
    }

    #[test]
    fn response_parsing_works() {
        let json = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3]},
                {"embedding": [0.4, 0.5, 0.6]}
            ]
        }"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[1].embedding, vec![0.4, 0.5, 0.6]);
    }

    #[test]
    fn batch_splitting_calculates_correctly() {
        let texts: Vec<String> = (0..150).map(|i| format!("text {i}")).collect();
        let batches: Vec<&[String]> = texts.chunks(BATCH_SIZE).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 22);
    }

    #[test]
    fn config_base_url_overrides_default() {
        let config = EmbeddingConfig {
            provider: "voyage".into(),
            api_key: Some("k".into()),
            base_url: Some("http://localhost:9999/v1".into()),
            ..EmbeddingConfig::default()
        };
        let client = VoyageClient::with_config(&config).unwrap();
        assert!(format!("{client:?}").contains("localhost:9999"));
    }

    #[test]
    fn missing_api_key_gives_clear_error() {
        std::env::remove_var("VOYAGE_API_KEY");
        let config = EmbeddingConfig {
            provider: "voyage".into(),
            api_key: None,
            ..EmbeddingConfig::default()
        };
        let err = VoyageClient::with_config(&config).unwrap_err().to_string();
        assert!(err.contains("API key"), "error should mention API key: {err}");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        let err = embedder_from_config(&config).err().unwrap().to_string();
        assert!(err.contains("word2vec"));
    }

    #[test]
    fn voyage_defaults_to_its_own_model() {
        let config = EmbeddingConfig {
            provider: "voyage".into(),
            api_key: Some("k".into()),
            ..EmbeddingConfig::default()
        };
        let embedder = embedder_from_config(&config).unwrap();
        assert_eq!(embedder.model(), "voyage-code-3");
    }

    #[cfg(feature = "candle")]
    #[test]
    fn default_provider_is_the_local_sentence_model() {
        let embedder = embedder_from_config(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model(), crate::candle::DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn hashing_query_embedding_matches_document_embedding() {
        let config = EmbeddingConfig {
            provider: "hashing".into(),
            ..EmbeddingConfig::default()
        };
        let embedder = embedder_from_config(&config).unwrap();
        let query = embedder.embed_query("tomato pizza").await.unwrap();
        let docs = embedder
            .embed_documents(&["tomato pizza".to_string()])
            .await
            .unwrap();
        assert_eq!(query, docs[0]);
    }
}
