//! Ollama / OpenAI-compatible LLM Client
//!
//! Implementation of `LlmClient` over the `/chat/completions` endpoint that
//! Ollama, vLLM and hosted gateways share.

use std::time::Duration;

use agent_core::{AgentError, ChatMessage, LlmClient, Result, provider::ChatResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

/// Client configuration
#[derive(Clone, Debug, PartialEq)]
pub struct OllamaConfig {
    /// Base URL up to and including the API version, e.g. `http://localhost:11434/v1`
    pub base_url: String,

    /// Bearer token; local servers need none
    pub api_key: Option<String>,

    pub model: String,

    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            api_key: None,
            model: "llama3.2".into(),
            temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// `LLM_BASE_URL` wins; otherwise `OLLAMA_HOST`/`OLLAMA_PORT` form
    /// `http://host:port/v1`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = non_empty("LLM_BASE_URL").unwrap_or_else(|| {
            let host = non_empty("OLLAMA_HOST").unwrap_or_else(|| "http://localhost".into());
            let host = if host.contains("://") {
                host
            } else {
                format!("http://{host}")
            };
            let port = non_empty("OLLAMA_PORT")
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(11434);
            format!("{}:{port}/v1", host.trim_end_matches('/'))
        });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: non_empty("LLM_API_KEY"),
            model: non_empty("LLM_MODEL").unwrap_or(defaults.model),
            temperature: non_empty("LLM_TEMPERATURE")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.temperature),
            timeout_secs: non_empty("LLM_TIMEOUT_SECS")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// HTTP chat-completions client
pub struct OllamaClient {
    http: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Request body; `tools` is omitted when nothing is enabled
    fn request_body(&self, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }
        body
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatResponse> {
        let body = self.request_body(messages, tools);
        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "Requesting chat completion"
        );

        let response = self
            .authorize(self.http.post(self.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::RateLimited(format!("429 {detail}")));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Transport(format!("HTTP {status}: {detail}")));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Transport(format!("undecodable response: {e}")))?;

        if let Some(usage) = &completion.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion received"
            );
        }
        Ok(completion)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.authorize(self.http.get(self.endpoint("models"))).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!(error = %e, "LLM health check failed");
                Ok(false)
            }
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
