//! LLM-assisted test case synthesis
//!
//! This module handles:
//! - Completion clients for Ollama and OpenAI-compatible APIs
//! - Structured prompt generation
//! - Parsing and validating generator output into test cases

mod client;
mod prompts;
mod schema;

pub use client::{
    ApiFlavor, CompletionProvider, LlmClient, LlmConfig, LlmResponse, MockLlmClient, ScriptedLlm,
};
pub use prompts::{feature_query, SelectorPrompt, TestCasePrompt, EXHAUSTIVE_QUERIES};
pub use schema::{extract_json, parse_test_cases, Priority, TestCase, TestCaseDraft, TestStep};

use crate::error::{QaError, Result};
use crate::index::{RetrievalResult, Retriever};
use std::sync::Arc;

/// What to generate test cases for
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationMode {
    /// A single free-text request
    Custom { query: String },
    /// Every functional area, one request each
    Exhaustive,
    /// Positive, negative and edge cases for one named feature
    Feature { name: String },
}

/// Turns retrieved documentation into validated test cases
pub struct TestCaseSynthesizer {
    llm: Arc<dyn CompletionProvider>,
    retriever: Retriever,
    top_k: i64,
    exhaustive_top_k: i64,
}

impl TestCaseSynthesizer {
    /// Create a new synthesizer
    pub fn new(llm: Arc<dyn CompletionProvider>, retriever: Retriever) -> Self {
        Self {
            llm,
            retriever,
            top_k: 10,
            exhaustive_top_k: 15,
        }
    }

    /// Set how many passages are retrieved per request
    pub fn with_top_k(mut self, top_k: i64, exhaustive_top_k: i64) -> Self {
        self.top_k = top_k;
        self.exhaustive_top_k = exhaustive_top_k;
        self
    }

    /// Generate test cases for `mode`
    pub async fn synthesize(&self, mode: &GenerationMode) -> Result<Vec<TestCase>> {
        match mode {
            GenerationMode::Custom { query } => {
                if query.trim().is_empty() {
                    return Err(QaError::invalid_argument("query must not be empty"));
                }
                self.generate_for(query, self.top_k).await
            }
            GenerationMode::Feature { name } => {
                if name.trim().is_empty() {
                    return Err(QaError::invalid_argument("feature name must not be empty"));
                }
                self.generate_for(&feature_query(name.trim()), self.top_k)
                    .await
            }
            GenerationMode::Exhaustive => {
                let mut cases = Vec::new();

                for query in EXHAUSTIVE_QUERIES {
                    let generated = self.generate_for(query, self.exhaustive_top_k).await?;
                    tracing::info!("Generated {} test cases for area", generated.len());
                    cases.extend(generated);
                }

                Ok(cases)
            }
        }
    }

    async fn generate_for(&self, query: &str, k: i64) -> Result<Vec<TestCase>> {
        let context = self.retriever.retrieve(query, k, None).await?;
        tracing::info!("Retrieved {} passages for generation", context.len());
        self.generate_from_context(query, &context).await
    }

    /// Generate test cases for `query` from already retrieved passages
    ///
    /// Invalid output gets exactly one corrective retry.
    pub async fn generate_from_context(
        &self,
        query: &str,
        context: &[RetrievalResult],
    ) -> Result<Vec<TestCase>> {
        let prompt = TestCasePrompt::generate(query, context);
        tracing::debug!("Test case prompt:\n{}", prompt);

        let first = self.complete(query, &prompt).await?;
        let reason = match parse_test_cases(&first) {
            Ok(drafts) => return Ok(assign_ids(drafts)),
            Err(reason) => reason,
        };

        tracing::warn!("Rejected generator output ({}), retrying once", reason);
        tracing::debug!("Rejected output:\n{}", first);

        let retry_prompt = TestCasePrompt::corrective(&prompt, &reason);
        let second = self.complete(query, &retry_prompt).await?;

        parse_test_cases(&second)
            .map(assign_ids)
            .map_err(|reason| {
                tracing::debug!("Rejected output after retry:\n{}", second);
                QaError::GenerationParseError {
                    query: query.to_string(),
                    reason,
                }
            })
    }

    async fn complete(&self, query: &str, prompt: &str) -> Result<String> {
        match self.llm.complete(prompt).await {
            Ok(response) => {
                if let Some(tokens) = response.tokens_used {
                    tracing::debug!("Generation used {} tokens", tokens);
                }
                Ok(response.content)
            }
            Err(e) => {
                tracing::debug!("Generation collaborator error: {:#}", e);
                Err(QaError::GenerationFailure {
                    query: query.to_string(),
                    message: "the generation service did not return a response".to_string(),
                })
            }
        }
    }
}

fn assign_ids(drafts: Vec<TestCaseDraft>) -> Vec<TestCase> {
    drafts
        .into_iter()
        .map(|draft| draft.into_test_case(uuid::Uuid::new_v4().to_string()))
        .collect()
}
