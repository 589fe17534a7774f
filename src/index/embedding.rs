//! Embedding collaborators
//!
//! Ollama and OpenAI-compatible HTTP providers, plus a deterministic
//! token-hashing provider for offline use and tests.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Trait for embedding providers
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Identifier of the model producing the vectors
    fn model_id(&self) -> &str;
}

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// POST a JSON body and decode the JSON reply
async fn post_json<Req, Resp>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &Req,
) -> Result<Resp>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("Embedding service at {} is unreachable", url))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        anyhow::bail!("Embedding service returned {}: {}", status, detail.trim());
    }

    response
        .json()
        .await
        .context("Embedding service returned an unexpected body")
}

/// Embeddings from a local Ollama server
///
/// Uses the batched `/api/embed` endpoint, one request per batch.
pub struct LocalEmbedding {
    endpoint: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
}

impl LocalEmbedding {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(60),
            dimension: 384,
        }
    }

    /// Ollama on its default port
    pub fn ollama(model: &str) -> Self {
        Self::new("http://localhost:11434", model)
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.client = http_client(secs);
        self
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.endpoint);
        let reply: OllamaEmbedResponse = post_json(
            &self.client,
            &url,
            None,
            &OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            },
        )
        .await?;

        tracing::debug!("Ollama returned {} embeddings", reply.embeddings.len());

        Ok(reply.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Embeddings from an OpenAI-compatible `/v1/embeddings` endpoint
pub struct OpenAIEmbedding {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
    dimension: usize,
}

impl OpenAIEmbedding {
    pub fn new(endpoint: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            client: http_client(60),
            dimension: 1536,
        }
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.client = http_client(secs);
        self
    }
}

#[derive(Debug, Serialize)]
struct OpenAIEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedResponse {
    data: Vec<OpenAIEmbedItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Put vectors back in input order, rejecting gaps and duplicates
fn order_by_index(items: Vec<OpenAIEmbedItem>, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];

    for item in items {
        let Some(slot) = slots.get_mut(item.index) else {
            anyhow::bail!(
                "Embedding index {} is out of range for {} inputs",
                item.index,
                expected
            );
        };
        if slot.is_some() {
            anyhow::bail!("Duplicate embedding for input {}", item.index);
        }
        *slot = Some(item.embedding);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or_else(|| anyhow::anyhow!("No embedding returned for input {}", i)))
        .collect()
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.endpoint);
        let reply: OpenAIEmbedResponse = post_json(
            &self.client,
            &url,
            self.api_key.as_deref(),
            &OpenAIEmbedRequest {
                model: &self.model,
                input: texts,
            },
        )
        .await?;

        order_by_index(reply.data, texts.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Mock embedding provider for testing
///
/// Hashes lowercase word tokens into buckets, so texts sharing words get
/// similar vectors. Texts containing a configured failure marker error out.
pub struct MockEmbedding {
    dimension: usize,
    model: String,
    fail_marker: Option<String>,
}

impl MockEmbedding {
    /// Create a new mock embedding provider
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: format!("mock-{}", dimension),
            fail_marker: None,
        }
    }

    /// Report a different model identifier
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Fail any batch containing a text with this marker
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
            vector[bucket % self.dimension] += 1.0;
        }

        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.dimension == 0 {
            anyhow::bail!("mock embedding dimension must be positive");
        }
        if let Some(ref marker) = self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                anyhow::bail!("mock embedding service unavailable");
            }
        }

        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedding() {
        let provider = MockEmbedding::new(384);
        let embedding = provider.embed("Hello, world!").await.unwrap();
        assert_eq!(embedding.len(), 384);

        // Same text should produce same embedding
        let embedding2 = provider.embed("Hello, world!").await.unwrap();
        assert_eq!(embedding, embedding2);

        // Different text should produce different embedding
        let embedding3 = provider.embed("Goodbye, moon!").await.unwrap();
        assert_ne!(embedding, embedding3);
    }

    #[test]
    fn test_openai_items_reordered() {
        let items = vec![
            OpenAIEmbedItem {
                index: 1,
                embedding: vec![2.0],
            },
            OpenAIEmbedItem {
                index: 0,
                embedding: vec![1.0],
            },
        ];
        assert_eq!(order_by_index(items, 2).unwrap(), vec![vec![1.0], vec![2.0]]);

        let missing = vec![OpenAIEmbedItem {
            index: 0,
            embedding: vec![1.0],
        }];
        assert!(order_by_index(missing, 2).is_err());

        let out_of_range = vec![OpenAIEmbedItem {
            index: 3,
            embedding: vec![1.0],
        }];
        assert!(order_by_index(out_of_range, 1).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let provider = LocalEmbedding::ollama("all-minilm");
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_embedding_failure_marker() {
        let provider = MockEmbedding::new(16).failing_on("BOOM");
        let texts = vec!["fine".to_string(), "BOOM here".to_string()];
        assert!(provider.embed_batch(&texts).await.is_err());
        assert!(provider.embed("fine").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_zero_dimension_errors() {
        let provider = MockEmbedding::new(0);
        let err = provider.embed("discount").await.unwrap_err();
        assert!(err.to_string().contains("must be positive"));
    }
}
