//! Confidence-scored selector resolution with a per-target cache

use crate::extract::ElementInfo;
use crate::llm::{extract_json, CompletionProvider, SelectorPrompt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of resolving a natural-language target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SelectorResolution {
    Resolved { selector: String, confidence: f64 },
    Unresolved { reason: String },
}

impl SelectorResolution {
    fn unresolved(reason: impl Into<String>) -> Self {
        SelectorResolution::Unresolved {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SelectorAnswer {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Resolves step targets to CSS selectors against a known element inventory
pub struct SelectorResolver {
    llm: Arc<dyn CompletionProvider>,
    elements: Vec<ElementInfo>,
    min_confidence: f64,
    cache: Mutex<HashMap<String, SelectorResolution>>,
}

impl SelectorResolver {
    pub fn new(llm: Arc<dyn CompletionProvider>, elements: Vec<ElementInfo>) -> Self {
        Self {
            llm,
            elements,
            min_confidence: 0.5,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Set the lowest confidence accepted as resolved
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Seed the cache with earlier resolutions
    pub fn with_cached(
        mut self,
        entries: impl IntoIterator<Item = (String, SelectorResolution)>,
    ) -> Self {
        self.cache
            .get_mut()
            .extend(entries.into_iter().map(|(k, v)| (cache_key(&k), v)));
        self
    }

    /// Snapshot of every cached resolution
    pub async fn cached_entries(&self) -> Vec<(String, SelectorResolution)> {
        let cache = self.cache.lock().await;
        let mut entries: Vec<_> = cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Resolve `target` for a step performing `action`
    ///
    /// Failures never propagate: they come back as
    /// [`SelectorResolution::Unresolved`].
    pub async fn resolve(&self, target: &str, action: &str) -> SelectorResolution {
        let key = cache_key(target);
        if key.is_empty() {
            return SelectorResolution::unresolved("step has no target");
        }

        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache.get(&key) {
            return hit.clone();
        }

        let resolution = self.ask(target, action).await;
        if let SelectorResolution::Unresolved { ref reason } = resolution {
            tracing::warn!("Could not resolve selector for '{}': {}", target, reason);
        }

        cache.insert(key, resolution.clone());
        resolution
    }

    async fn ask(&self, target: &str, action: &str) -> SelectorResolution {
        let prompt = SelectorPrompt::generate(target, action, &self.elements);
        tracing::debug!("Selector prompt:\n{}", prompt);

        let response = match self.llm.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Selector collaborator error: {:#}", e);
                return SelectorResolution::unresolved("selector service unavailable");
            }
        };

        let answer = extract_json(&response.content)
            .and_then(|value| serde_json::from_value::<SelectorAnswer>(value).ok());

        let Some(answer) = answer else {
            tracing::debug!("Malformed selector response: {}", response.content);
            return SelectorResolution::unresolved("malformed selector response");
        };

        let selector = answer.selector.unwrap_or_default().trim().to_string();
        let confidence = answer.confidence.unwrap_or(0.0).clamp(0.0, 1.0);

        if selector.is_empty() {
            return SelectorResolution::unresolved("no matching element");
        }
        if !confidence.is_finite() || confidence < self.min_confidence {
            return SelectorResolution::unresolved(format!(
                "confidence {:.2} below {:.2}",
                confidence, self.min_confidence
            ));
        }

        SelectorResolution::Resolved {
            selector,
            confidence,
        }
    }
}

fn cache_key(target: &str) -> String {
    target
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
