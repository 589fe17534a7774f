//! Project configuration for qaforge

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directory holding configuration and the database
pub const PROJECT_DIR: &str = ".qaforge";

/// Configuration file name inside [`PROJECT_DIR`]
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration for a qaforge project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub chunk: ChunkSettings,

    #[serde(default)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub script: ScriptSettings,

    #[serde(default)]
    pub ingest: IngestSettings,
}

/// Service a collaborator talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
    /// Offline hashing embedder, embeddings only
    Mock,
}

/// Chunking windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSettings {
    /// Maximum window size in characters
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Characters shared by consecutive windows
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

/// Passages retrieved per generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_top_k")]
    pub top_k: i64,

    /// Used for each functional area in exhaustive mode
    #[serde(default = "default_exhaustive_top_k")]
    pub exhaustive_top_k: i64,
}

/// Generation service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_provider")]
    pub provider: Provider,

    /// API endpoint URL (e.g., http://localhost:11434 for Ollama)
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    /// Model name to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key (if required)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Request JSON-constrained output (disable for servers without support)
    #[serde(default = "default_true")]
    pub json_mode: bool,
}

/// Embedding service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_provider")]
    pub provider: Provider,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

/// Script generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSettings {
    /// URL the generated script opens
    #[serde(default = "default_page_url")]
    pub page_url: String,

    /// Lowest selector confidence accepted (0.0 - 1.0)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Explicit wait used for every element lookup
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u64,
}

/// Which files `build` picks up from directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Patterns to ignore (glob patterns)
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// File extensions to ingest
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_max_size() -> usize {
    500
}

fn default_overlap() -> usize {
    50
}

fn default_top_k() -> i64 {
    10
}

fn default_exhaustive_top_k() -> i64 {
    15
}

fn default_provider() -> Provider {
    Provider::Ollama
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "llama3".to_string()
}

fn default_max_tokens() -> usize {
    4000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_page_url() -> String {
    "file:///path/to/checkout.html".to_string()
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_wait_seconds() -> u64 {
    10
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".qaforge/**".to_string(),
        ".git/**".to_string(),
        "target/**".to_string(),
        "node_modules/**".to_string(),
    ]
}

fn default_extensions() -> Vec<String> {
    ["txt", "md", "markdown", "json", "html", "htm", "pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            overlap: default_overlap(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            exhaustive_top_k: default_exhaustive_top_k(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: default_ollama_endpoint(),
            model: default_llm_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            json_mode: true,
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            api_key: None,
            dimension: default_dimension(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            min_confidence: default_min_confidence(),
            wait_seconds: default_wait_seconds(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
            extensions: default_extensions(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the project or return defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(PROJECT_DIR).join(CONFIG_FILE);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the project
    pub fn save(&self, root: &Path) -> Result<()> {
        let project_dir = root.join(PROJECT_DIR);
        std::fs::create_dir_all(&project_dir)?;

        let config_path = project_dir.join(CONFIG_FILE);
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Check if a path (relative to the project root) should be ignored
    pub fn should_ignore(&self, path: &str) -> bool {
        self.ingest
            .ignore_patterns
            .iter()
            .any(|pattern| glob_match_simple(pattern, path))
    }

    /// Check if a file has an ingestible extension
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.ingest.extensions.iter().any(|e| *e == ext))
    }
}

/// Simple glob matching helper
fn glob_match_simple(pattern: &str, path: &str) -> bool {
    if pattern.contains("**") {
        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');
            return (prefix.is_empty() || path.starts_with(prefix))
                && (suffix.is_empty() || path.ends_with(suffix));
        }
    }

    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.split('*').collect();
        if parts.len() == 2 {
            return path.starts_with(parts[0]) && path.ends_with(parts[1]);
        }
    }

    path == pattern || path.ends_with(&format!("/{}", pattern))
}
