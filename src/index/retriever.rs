//! Ranked retrieval of chunk text for prompt context

use super::EmbeddingIndex;
use crate::error::{QaError, Result};
use crate::extract::{Chunk, DocumentKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// A retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub text: String,
    /// Similarity score, higher is more relevant
    pub score: f64,
    pub source_name: String,
    pub kind: DocumentKind,
}

/// Metadata restrictions applied before truncating to `k`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalFilter {
    /// Allowed document kinds (empty = any)
    pub kinds: Vec<DocumentKind>,
    /// Allowed source names (empty = any)
    pub sources: Vec<String>,
}

impl RetrievalFilter {
    pub fn kind(kind: DocumentKind) -> Self {
        Self {
            kinds: vec![kind],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty() && self.sources.is_empty()
    }

    fn matches(&self, chunk: &Chunk) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&chunk.kind))
            && (self.sources.is_empty() || self.sources.contains(&chunk.source_name))
    }
}

/// Retrieves the most relevant passages for a query
#[derive(Clone)]
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
}

impl Retriever {
    pub fn new(index: Arc<EmbeddingIndex>) -> Self {
        Self { index }
    }

    /// Top `k` passages for `query`, best first
    ///
    /// A `k` larger than the corpus returns everything available.
    pub async fn retrieve(
        &self,
        query: &str,
        k: i64,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        if k <= 0 {
            return Err(QaError::invalid_argument(format!(
                "k must be positive, got {}",
                k
            )));
        }

        let filter = filter.filter(|f| !f.is_empty());
        let limit = usize::try_from(k).unwrap_or(usize::MAX);

        // Filters drop hits, so score the whole corpus before truncating
        let fetch = match filter {
            Some(_) => self.index.len().max(1) as i64,
            None => k,
        };

        let hits = self.index.query(query, fetch).await?;

        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(limit.min(hits.len()));

        for hit in hits {
            if results.len() == limit {
                break;
            }
            if !seen.insert(hit.chunk_id.clone()) {
                continue;
            }

            let Some(chunk) = self.index.chunk(&hit.chunk_id) else {
                tracing::warn!("Chunk {} vanished from the index", hit.chunk_id);
                continue;
            };

            if filter.is_some_and(|f| !f.matches(&chunk)) {
                continue;
            }

            results.push(RetrievalResult {
                chunk_id: chunk.id,
                text: chunk.text,
                score: hit.score,
                source_name: chunk.source_name,
                kind: chunk.kind,
            });
        }

        tracing::debug!("Retrieved {} passages for '{}'", results.len(), query);

        Ok(results)
    }
}

/// Render passages as source-attributed prompt context
pub fn format_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return "No relevant documentation found.".to_string();
    }

    results
        .iter()
        .map(|r| format!("[Source: {}]\n{}", r.source_name, r.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ChunkConfig, Chunker, Document};
    use crate::index::MockEmbedding;

    async fn retriever() -> Retriever {
        let index = Arc::new(EmbeddingIndex::new(Arc::new(MockEmbedding::new(64))));
        let chunker = Chunker::new(ChunkConfig::new(200, 20).unwrap());

        for doc in [
            Document::new(
                "product_specs.md",
                "Discount code SAVE15 gives 15% off the subtotal.",
                DocumentKind::Markdown,
            ),
            Document::new(
                "checkout.html",
                "HTML Content:\nDiscount code\nApply\n\nHTML Structure:\ninput: id='discount-code'",
                DocumentKind::Html,
            ),
            Document::new(
                "ui_guide.txt",
                "Invalid discount code shows an error in red.",
                DocumentKind::Text,
            ),
        ] {
            index.add(&chunker.chunk(&doc)).await.unwrap();
        }

        Retriever::new(index)
    }

    #[tokio::test]
    async fn test_k_larger_than_corpus_returns_all() {
        let r = retriever().await;
        let results = r.retrieve("discount code", 50, None).await.unwrap();
        assert_eq!(results.len(), 3);

        let ids: HashSet<_> = results.iter().map(|r| r.chunk_id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_filter_applies_before_truncation() {
        let r = retriever().await;
        let filter = RetrievalFilter::kind(DocumentKind::Text);
        let results = r.retrieve("discount code", 1, Some(&filter)).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_name, "ui_guide.txt");
    }

    #[tokio::test]
    async fn test_source_filter() {
        let r = retriever().await;
        let filter = RetrievalFilter {
            sources: vec!["checkout.html".to_string()],
            ..Default::default()
        };
        let results = r.retrieve("apply", 5, Some(&filter)).await.unwrap();
        assert!(results.iter().all(|r| r.source_name == "checkout.html"));
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_k() {
        let r = retriever().await;
        assert!(matches!(
            r.retrieve("discount", 0, None).await,
            Err(QaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_format_context() {
        let results = vec![RetrievalResult {
            chunk_id: "c1".to_string(),
            text: "SAVE15 gives 15% off".to_string(),
            score: 0.9,
            source_name: "product_specs.md".to_string(),
            kind: DocumentKind::Markdown,
        }];
        assert_eq!(
            format_context(&results),
            "[Source: product_specs.md]\nSAVE15 gives 15% off"
        );
        assert_eq!(format_context(&[]), "No relevant documentation found.");
    }
}
