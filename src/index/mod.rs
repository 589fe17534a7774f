//! Vector index over document chunks
//!
//! This module handles:
//! - Embedding chunks through an [`EmbeddingProvider`]
//! - Brute-force cosine nearest-neighbour search
//! - Serialized knowledge-base builds ([`KnowledgeBase`])
//! - Ranked, filtered retrieval ([`Retriever`])

mod embedding;
mod knowledge;
mod retriever;

pub use embedding::{EmbeddingProvider, LocalEmbedding, MockEmbedding, OpenAIEmbedding};
pub use knowledge::{BuildReport, KnowledgeBase};
pub use retriever::{format_context, RetrievalFilter, RetrievalResult, Retriever};

use crate::error::{QaError, Result};
use crate::extract::{Chunk, DocumentKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Source metadata stored alongside each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source_name: String,
    pub kind: DocumentKind,
}

/// One stored vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: String,
    /// Cosine similarity, higher is more relevant
    pub score: f64,
}

/// Everything needed to persist and reload an index
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    pub model: Option<String>,
    pub dimension: Option<usize>,
    /// Chunks and their records in insertion order
    pub entries: Vec<(Chunk, EmbeddingRecord)>,
}

#[derive(Default)]
struct IndexState {
    model: Option<String>,
    dimension: Option<usize>,
    entries: Vec<(Chunk, EmbeddingRecord)>,
    positions: HashMap<String, usize>,
}

impl IndexState {
    fn upsert(&mut self, chunk: Chunk, record: EmbeddingRecord) {
        match self.positions.get(&chunk.id) {
            Some(&pos) => self.entries[pos] = (chunk, record),
            None => {
                self.positions.insert(chunk.id.clone(), self.entries.len());
                self.entries.push((chunk, record));
            }
        }
    }
}

/// In-memory vector index keyed by chunk id
///
/// The index owns the chunks it embeds, so retrieval can hydrate hits back
/// into text without a separate store. Insertion order is kept and used to
/// break score ties.
pub struct EmbeddingIndex {
    provider: Arc<dyn EmbeddingProvider>,
    state: RwLock<IndexState>,
}

impl EmbeddingIndex {
    /// Create an empty index embedding through `provider`
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            state: RwLock::new(IndexState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identifier of the model this index embeds with
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a stored chunk
    pub fn chunk(&self, chunk_id: &str) -> Option<Chunk> {
        let state = self.read();
        state
            .positions
            .get(chunk_id)
            .map(|&pos| state.entries[pos].0.clone())
    }

    /// Look up a stored record
    pub fn record(&self, chunk_id: &str) -> Option<EmbeddingRecord> {
        let state = self.read();
        state
            .positions
            .get(chunk_id)
            .map(|&pos| state.entries[pos].1.clone())
    }

    fn check_model(&self, state: &IndexState) -> Result<()> {
        match state.model {
            Some(ref model) if model != self.provider.model_id() => {
                Err(QaError::DimensionMismatch(format!(
                    "index was built with model '{}' but is embedding with '{}'",
                    model,
                    self.provider.model_id()
                )))
            }
            _ => Ok(()),
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.provider.embed_batch(texts).await.map_err(|e| {
            tracing::debug!("Embedding collaborator error: {:#}", e);
            QaError::EmbeddingFailure(format!(
                "embedding model '{}' failed for {} text(s)",
                self.provider.model_id(),
                texts.len()
            ))
        })?;

        if vectors.len() != texts.len() {
            return Err(QaError::EmbeddingFailure(format!(
                "embedding model returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        if vectors.iter().any(|v| v.is_empty()) {
            return Err(QaError::EmbeddingFailure(
                "embedding model returned an empty vector".to_string(),
            ));
        }

        let configured = self.provider.dimension();
        if configured > 0 {
            if let Some(bad) = vectors.iter().find(|v| v.len() != configured) {
                return Err(QaError::DimensionMismatch(format!(
                    "embedding model '{}' returned {}-dimensional vectors, {} configured",
                    self.provider.model_id(),
                    bad.len(),
                    configured
                )));
            }
        }

        Ok(vectors)
    }

    /// Embed and upsert chunks. Returns the number of chunks written.
    ///
    /// Every vector is computed and checked before the index is touched, so a
    /// failed call leaves the index as it was.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        self.check_model(&self.read())?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed(&texts).await?;

        let dimension = vectors[0].len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(QaError::EmbeddingFailure(format!(
                "embedding model returned vectors of mixed dimension ({} and {})",
                dimension,
                bad.len()
            )));
        }

        let mut state = self.write();
        self.check_model(&state)?;
        if let Some(existing) = state.dimension {
            if existing != dimension {
                return Err(QaError::DimensionMismatch(format!(
                    "index holds {}-dimensional vectors, got {}",
                    existing, dimension
                )));
            }
        }

        state.model = Some(self.provider.model_id().to_string());
        state.dimension = Some(dimension);

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let record = EmbeddingRecord {
                chunk_id: chunk.id.clone(),
                vector,
                metadata: RecordMetadata {
                    source_name: chunk.source_name.clone(),
                    kind: chunk.kind,
                },
            };
            state.upsert(chunk.clone(), record);
        }

        tracing::debug!("Indexed {} chunks ({} total)", chunks.len(), state.entries.len());

        Ok(chunks.len())
    }

    /// Top `k` chunks by cosine similarity to `text`
    pub async fn query(&self, text: &str, k: i64) -> Result<Vec<ScoredChunk>> {
        if k <= 0 {
            return Err(QaError::invalid_argument(format!(
                "k must be positive, got {}",
                k
            )));
        }

        {
            let state = self.read();
            if state.entries.is_empty() {
                return Ok(Vec::new());
            }
            self.check_model(&state)?;
        }

        let query_vector = self.embed(&[text.to_string()]).await?.remove(0);

        let state = self.read();
        if let Some(dimension) = state.dimension {
            if dimension != query_vector.len() {
                return Err(QaError::DimensionMismatch(format!(
                    "index holds {}-dimensional vectors, query embedding has {}",
                    dimension,
                    query_vector.len()
                )));
            }
        }

        let mut scored: Vec<(usize, f64)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, record))| (i, cosine_similarity(&query_vector, &record.vector)))
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(usize::try_from(k).unwrap_or(usize::MAX));

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk_id: state.entries[i].1.chunk_id.clone(),
                score,
            })
            .collect())
    }

    /// Drop the chunks and vectors of the given documents. Returns the number removed.
    pub fn remove_documents(&self, document_ids: &HashSet<String>) -> usize {
        if document_ids.is_empty() {
            return 0;
        }

        let mut state = self.write();
        let before = state.entries.len();

        let kept: Vec<(Chunk, EmbeddingRecord)> = std::mem::take(&mut state.entries)
            .into_iter()
            .filter(|(chunk, _)| !document_ids.contains(&chunk.document_id))
            .collect();

        state.positions.clear();
        for (chunk, record) in kept {
            state.upsert(chunk, record);
        }

        before - state.entries.len()
    }

    /// Drop every stored vector and chunk
    pub fn reset(&self) {
        *self.write() = IndexState::default();
    }

    /// Copy out the index contents for persistence
    pub fn snapshot(&self) -> IndexSnapshot {
        let state = self.read();
        IndexSnapshot {
            model: state.model.clone(),
            dimension: state.dimension,
            entries: state.entries.clone(),
        }
    }

    /// Replace the index contents with a previously persisted snapshot
    pub fn restore(&self, snapshot: IndexSnapshot) -> Result<()> {
        if let Some(dimension) = snapshot.dimension {
            if let Some((_, record)) = snapshot
                .entries
                .iter()
                .find(|(_, r)| r.vector.len() != dimension)
            {
                return Err(QaError::DimensionMismatch(format!(
                    "stored vector for {} has {} dimensions, index expects {}",
                    record.chunk_id,
                    record.vector.len(),
                    dimension
                )));
            }
        }

        let mut state = IndexState {
            model: snapshot.model,
            dimension: snapshot.dimension,
            ..Default::default()
        };
        for (chunk, record) in snapshot.entries {
            state.upsert(chunk, record);
        }

        *self.write() = state;
        Ok(())
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ChunkConfig, Chunker, Document};

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::new(Arc::new(MockEmbedding::new(64)))
    }

    fn chunks_of(name: &str, text: &str) -> Vec<Chunk> {
        let doc = Document::new(name, text, DocumentKind::Markdown);
        Chunker::new(ChunkConfig::new(80, 10).unwrap()).chunk(&doc)
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - (-1.0)).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_query_empty_index() {
        let results = index().query("discount code", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_rejects_non_positive_k() {
        let idx = index();
        assert!(matches!(
            idx.query("anything", -1).await,
            Err(QaError::InvalidArgument(_))
        ));
        assert!(matches!(
            idx.query("anything", 0).await,
            Err(QaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let idx = index();
        idx.add(&chunks_of("shipping.md", "Express shipping costs ten dollars."))
            .await
            .unwrap();
        idx.add(&chunks_of("discounts.md", "Discount code SAVE15 gives 15 percent off."))
            .await
            .unwrap();
        idx.add(&chunks_of("payment.md", "Payment by credit card or PayPal."))
            .await
            .unwrap();

        let results = idx.query("discount code SAVE15", 2).await.unwrap();
        assert_eq!(results.len(), 2);

        let top = idx.chunk(&results[0].chunk_id).unwrap();
        assert_eq!(top.source_name, "discounts.md");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_query_ties_prefer_earlier_insertion() {
        let idx = index();
        let first = chunks_of("a.md", "same words here");
        let second = chunks_of("b.md", "same words here");
        idx.add(&first).await.unwrap();
        idx.add(&second).await.unwrap();

        let results = idx.query("same words here", 2).await.unwrap();
        assert_eq!(results[0].chunk_id, first[0].id);
        assert_eq!(results[1].chunk_id, second[0].id);
        assert_eq!(results[0].score, results[1].score);
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let idx = index();
        let chunks = chunks_of("specs.md", &"Cart rules apply to every order. ".repeat(10));
        idx.add(&chunks).await.unwrap();
        let once = idx.snapshot();

        idx.add(&chunks).await.unwrap();
        let twice = idx.snapshot();

        assert_eq!(idx.len(), chunks.len());
        assert_eq!(once.entries, twice.entries);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_index_untouched() {
        let idx = EmbeddingIndex::new(Arc::new(MockEmbedding::new(32).failing_on("BOOM")));
        idx.add(&chunks_of("ok.md", "all good")).await.unwrap();

        let mut bad = chunks_of("bad.md", "first part");
        bad.extend(chunks_of("worse.md", "BOOM second part"));
        let err = idx.add(&bad).await.unwrap_err();

        assert!(matches!(err, QaError::EmbeddingFailure(_)));
        assert_eq!(idx.len(), 1);
        assert!(!err.to_string().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_model_mismatch_is_dimension_error() {
        let built = index();
        built
            .add(&chunks_of("specs.md", "Shipping is free over fifty dollars."))
            .await
            .unwrap();

        let other = EmbeddingIndex::new(Arc::new(MockEmbedding::new(64).with_model("other")));
        other.restore(built.snapshot()).unwrap();

        assert!(matches!(
            other.query("shipping", 3).await,
            Err(QaError::DimensionMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_on_query() {
        let built = index();
        built
            .add(&chunks_of("specs.md", "Shipping is free over fifty dollars."))
            .await
            .unwrap();

        let mut snapshot = built.snapshot();
        snapshot.model = Some("mock-32".to_string());
        let smaller = EmbeddingIndex::new(Arc::new(MockEmbedding::new(32)));
        smaller.restore(snapshot).unwrap();

        assert!(matches!(
            smaller.query("shipping", 3).await,
            Err(QaError::DimensionMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let idx = index();
        idx.add(&chunks_of("specs.md", "Payment rules.")).await.unwrap();
        assert!(!idx.is_empty());

        idx.reset();
        assert!(idx.is_empty());
        assert!(idx.snapshot().model.is_none());
        assert!(idx.query("payment", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_bounded_and_sorted() {
        let idx = index();
        let text = "Cart totals update when quantity changes.\n\n\
                    Discount SAVE15 reduces subtotal by 15 percent.\n\n\
                    Express shipping adds ten dollars to the total.\n\n\
                    Submitting the form shows Payment Successful.";
        idx.add(&chunks_of("specs.md", text)).await.unwrap();

        let results = idx.query("shipping total", 3).await.unwrap();
        assert!(results.len() <= 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for r in &results {
            assert!(idx.chunk(&r.chunk_id).is_some());
        }
    }

    /// Reports one dimension but embeds with another
    struct MisreportedDimension {
        inner: MockEmbedding,
        reported: usize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for MisreportedDimension {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.inner.embed_batch(texts).await
        }

        fn dimension(&self) -> usize {
            self.reported
        }

        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
    }

    #[tokio::test]
    async fn test_query_embedding_failure_is_sanitized() {
        let idx = EmbeddingIndex::new(Arc::new(MockEmbedding::new(32).failing_on("BOOM")));
        idx.add(&chunks_of("specs.md", "Checkout totals update live."))
            .await
            .unwrap();

        let err = idx.query("BOOM checkout", 3).await.unwrap_err();

        assert!(matches!(err, QaError::EmbeddingFailure(_)));
        assert!(err.to_string().contains("mock-32"));
        assert!(!err.to_string().contains("mock embedding service unavailable"));
    }

    #[tokio::test]
    async fn test_configured_dimension_is_enforced() {
        let idx = EmbeddingIndex::new(Arc::new(MisreportedDimension {
            inner: MockEmbedding::new(64),
            reported: 768,
        }));

        let err = idx
            .add(&chunks_of("specs.md", "Express shipping costs ten dollars."))
            .await
            .unwrap_err();

        match err {
            QaError::DimensionMismatch(message) => {
                assert!(message.contains("64"));
                assert!(message.contains("768"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(idx.is_empty());
    }

    #[tokio::test]
    async fn test_remove_documents_keeps_others_queryable() {
        let idx = index();
        let old = chunks_of("specs.md", "Discount code SAVE15 gives 15 percent off.");
        let other = chunks_of("shipping.md", "Express shipping costs ten dollars.");
        idx.add(&old).await.unwrap();
        idx.add(&other).await.unwrap();

        let ids: HashSet<String> = [old[0].document_id.clone()].into_iter().collect();
        assert_eq!(idx.remove_documents(&ids), old.len());
        assert_eq!(idx.len(), other.len());
        assert!(idx.chunk(&old[0].id).is_none());

        let results = idx.query("discount SAVE15", 5).await.unwrap();
        assert!(results
            .iter()
            .all(|r| idx.chunk(&r.chunk_id).unwrap().source_name == "shipping.md"));
    }
}
