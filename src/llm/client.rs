//! Text-completion collaborators
//!
//! [`LlmClient`] talks to Ollama or an OpenAI-compatible chat endpoint.
//! [`MockLlmClient`] and [`ScriptedLlm`] stand in for it offline.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Response from LLM
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated content
    pub content: String,
    /// Number of tokens used
    pub tokens_used: Option<usize>,
}

/// Text-completion collaborator
///
/// Output is untrusted: callers validate whatever comes back.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for `prompt`
    async fn complete(&self, prompt: &str) -> Result<LlmResponse>;
}

/// Wire protocol spoken by the completion endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiFlavor {
    #[default]
    Ollama,
    OpenAI,
}

/// Configuration for LLM client
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Wire protocol
    pub flavor: ApiFlavor,
    /// API endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Maximum tokens for response
    pub max_tokens: usize,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// System instruction sent with every request
    pub system_prompt: Option<String>,
    /// Ask the service to constrain output to a JSON object
    pub json_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            flavor: ApiFlavor::Ollama,
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            max_tokens: 4000,
            temperature: 0.3,
            timeout_secs: 120,
            system_prompt: Some(
                "You are a professional QA engineer who creates detailed, accurate test cases. \
                 Always respond with valid JSON."
                    .to_string(),
            ),
            json_mode: true,
        }
    }
}

/// LLM client speaking the Ollama or OpenAI-compatible chat protocol
pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Ollama on its default port
    pub fn ollama(model: &str) -> Self {
        Self::new(LlmConfig {
            model: model.to_string(),
            ..Default::default()
        })
    }

    /// OpenAI or any server exposing `/v1/chat/completions`
    pub fn openai_compatible(endpoint: &str, model: &str, api_key: Option<&str>) -> Self {
        Self::new(LlmConfig {
            flavor: ApiFlavor::OpenAI,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn messages<'a>(&'a self, prompt: &'a str) -> Vec<ChatMessage<'a>> {
        let system = self.config.system_prompt.as_deref().map(|content| ChatMessage {
            role: "system",
            content,
        });

        system
            .into_iter()
            .chain(std::iter::once(ChatMessage {
                role: "user",
                content: prompt,
            }))
            .collect()
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.endpoint, path);

        let mut request = self.client.post(&url).json(body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Generation service at {} is unreachable", url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Generation service returned {}: {}", status, detail.trim());
        }

        response
            .json()
            .await
            .context("Generation service returned an unexpected body")
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<LlmResponse> {
        let request = OllamaChatRequest {
            model: &self.config.model,
            messages: self.messages(prompt),
            stream: false,
            format: self.config.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let reply: OllamaChatResponse = self.post("/api/chat", &request).await?;

        let tokens_used = match (reply.prompt_eval_count, reply.eval_count) {
            (None, None) => None,
            (prompt_tokens, output_tokens) => {
                Some(prompt_tokens.unwrap_or(0) + output_tokens.unwrap_or(0))
            }
        };

        Ok(LlmResponse {
            content: reply.message.content,
            tokens_used,
        })
    }

    async fn complete_openai(&self, prompt: &str) -> Result<LlmResponse> {
        let request = OpenAIChatRequest {
            model: &self.config.model,
            messages: self.messages(prompt),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: self
                .config
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let reply: OpenAIChatResponse = self.post("/v1/chat/completions", &request).await?;

        let choice = reply
            .choices
            .into_iter()
            .next()
            .context("Generation service returned no choices")?;

        Ok(LlmResponse {
            content: choice.message.content,
            tokens_used: reply.usage.map(|u| u.total_tokens),
        })
    }
}

#[async_trait::async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        tracing::debug!(
            "Requesting completion from {} ({} chars)",
            self.config.model,
            prompt.len()
        );

        match self.config.flavor {
            ApiFlavor::Ollama => self.complete_ollama(prompt).await,
            ApiFlavor::OpenAI => self.complete_openai(prompt).await,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

// Ollama /api/chat

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ReplyMessage,
    prompt_eval_count: Option<usize>,
    eval_count: Option<usize>,
}

// OpenAI /v1/chat/completions

#[derive(Debug, Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: usize,
}

/// Mock LLM client for testing
///
/// Answers with the response registered for the first matching prompt
/// substring, in registration order.
pub struct MockLlmClient {
    responses: Vec<(String, String)>,
    default_response: String,
    calls: AtomicUsize,
}

impl MockLlmClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            default_response: r#"{"selector": "", "confidence": 0.0}"#.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a mock response
    pub fn add_response(&mut self, prompt_contains: &str, response: &str) {
        self.responses
            .push((prompt_contains.to_string(), response.to_string()));
    }

    /// Response used when nothing matches
    pub fn set_default(&mut self, response: &str) {
        self.default_response = response.to_string();
    }

    /// Number of completions served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let content = self
            .responses
            .iter()
            .find(|(key, _)| prompt.contains(key.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone());

        Ok(LlmResponse {
            content,
            tokens_used: Some(100),
        })
    }
}

/// Replays a fixed sequence of outcomes and records every prompt
pub struct ScriptedLlm {
    outcomes: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful completion
    pub fn then_respond(self, content: &str) -> Self {
        self.push(Ok(content.to_string()));
        self
    }

    /// Queue a collaborator failure
    pub fn then_fail(self, message: &str) -> Self {
        self.push(Err(message.to_string()));
        self
    }

    fn push(&self, outcome: std::result::Result<String, String>) {
        self.outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        self.prompts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(prompt.to_string());

        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();

        match outcome {
            Some(Ok(content)) => Ok(LlmResponse {
                content,
                tokens_used: None,
            }),
            Some(Err(message)) => anyhow::bail!(message),
            None => anyhow::bail!("scripted responses exhausted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client() {
        let mut client = MockLlmClient::new();
        client.add_response("test", r#"{"result": "success"}"#);

        let response = client.complete("this is a test prompt").await.unwrap();
        assert!(response.content.contains("success"));

        let fallback = client.complete("unrelated").await.unwrap();
        assert!(fallback.content.contains("confidence"));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_llm_replays_in_order() {
        let llm = ScriptedLlm::new().then_respond("first").then_fail("quota exceeded");

        assert_eq!(llm.complete("a").await.unwrap().content, "first");
        assert!(llm.complete("b").await.is_err());
        assert!(llm.complete("c").await.is_err());
        assert_eq!(llm.prompts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_openai_constructor() {
        let client = LlmClient::openai_compatible("https://api.example.com/", "gpt-4o-mini", Some("k"));
        assert_eq!(client.config().flavor, ApiFlavor::OpenAI);
        assert_eq!(client.config().endpoint, "https://api.example.com");
    }

    #[test]
    fn test_chat_messages_carry_system_prompt() {
        let client = LlmClient::ollama("llama3");
        let messages = client.messages("Generate test cases");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "Generate test cases");

        let bare = LlmClient::new(LlmConfig {
            system_prompt: None,
            ..Default::default()
        });
        assert_eq!(bare.messages("x").len(), 1);
    }

    #[test]
    fn test_openai_request_shape() {
        let client = LlmClient::openai_compatible("https://api.example.com", "gpt-4o-mini", None);
        let request = OpenAIChatRequest {
            model: &client.config().model,
            messages: client.messages("hi"),
            max_tokens: 10,
            temperature: 0.3,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.flavor, ApiFlavor::Ollama);
        assert!(config.endpoint.contains("11434"));
        assert!(config.temperature > 0.0);
        assert!(config.timeout_secs > 0);
    }
}
