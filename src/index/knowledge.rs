//! Knowledge-base builds over a shared index

use super::EmbeddingIndex;
use crate::error::Result;
use crate::extract::{Chunk, Chunker, Document};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Summary of a build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Documents that produced at least one chunk
    pub documents: usize,
    /// Chunks written to the index
    pub chunks: usize,
    /// Documents skipped because they had no text
    pub skipped: Vec<String>,
}

/// Owns the index handle and serializes builds against it
///
/// Builds hold an exclusive build lock. Queries do not take it: a query that
/// runs while [`KnowledgeBase::rebuild`] is between its reset and its last
/// `add` sees a partially populated index.
pub struct KnowledgeBase {
    index: Arc<EmbeddingIndex>,
    chunker: Chunker,
    build_lock: Mutex<()>,
}

impl KnowledgeBase {
    pub fn new(index: Arc<EmbeddingIndex>, chunker: Chunker) -> Self {
        Self {
            index,
            chunker,
            build_lock: Mutex::new(()),
        }
    }

    /// Shared handle to the underlying index
    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunk and add documents on top of the current contents
    pub async fn ingest(&self, documents: &[Document]) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;
        self.add_documents(documents).await
    }

    /// Clear the index and build it from `documents`
    pub async fn rebuild(&self, documents: &[Document]) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;
        tracing::info!("Rebuilding knowledge base from {} documents", documents.len());
        self.index.reset();
        self.add_documents(documents).await
    }

    /// Clear the index
    pub async fn reset(&self) {
        let _guard = self.build_lock.lock().await;
        self.index.reset();
        tracing::info!("Knowledge base cleared");
    }

    async fn add_documents(&self, documents: &[Document]) -> Result<BuildReport> {
        let mut report = BuildReport::default();

        for document in documents {
            let chunks: Vec<Chunk> = self.chunker.chunk(document);
            if chunks.is_empty() {
                tracing::warn!("Skipping {}: no text to index", document.source_name);
                report.skipped.push(document.source_name.clone());
                continue;
            }

            report.chunks += self.index.add(&chunks).await?;
            report.documents += 1;

            tracing::info!("Indexed {} ({} chunks)", document.source_name, chunks.len());
        }

        Ok(report)
    }
}
