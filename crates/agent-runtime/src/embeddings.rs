//! Embeddings Client
//!
//! Thin client for the OpenAI-compatible `/embeddings` endpoint. Vector
//! storage and retrieval live elsewhere; this module only produces vectors.
//!
//! Embedding calls are retried when the backend reports rate limiting.
//! Nothing else in the runtime retries.

use std::future::Future;
use std::time::Duration;

use agent_core::{AgentError, Result};
use serde::Deserialize;
use serde_json::json;

use crate::ollama::OllamaConfig;

/// Fixed-delay retry policy for rate-limited calls
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Whether an error reads like a rate-limit rejection
pub fn is_rate_limit(err: &AgentError) -> bool {
    if matches!(err, AgentError::RateLimited(_)) {
        return true;
    }
    let text = err.to_string().to_lowercase();
    text.contains("rate limit") || text.contains("429")
}

/// Run `op`, retrying rate-limit failures per `policy`.
///
/// Other errors and the last rate-limit error are returned unchanged.
pub async fn retry_on_rate_limit<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if attempt < attempts && is_rate_limit(&e) => {
                tracing::warn!(attempt, max_attempts = attempts, error = %e, "Rate limited; retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

pub struct EmbeddingsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    retry: RetryPolicy,
}

impl EmbeddingsClient {
    pub fn new(llm: &OllamaConfig, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: llm.base_url.clone(),
            api_key: llm.api_key.clone(),
            model: model.into(),
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One vector per input, in input order
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        retry_on_rate_limit(self.retry, || self.embed_once(inputs)).await
    }

    async fn embed_once(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut request = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({"model": self.model, "input": inputs}));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::RateLimited(status.to_string()));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Transport(format!("HTTP {status}: {detail}")));
        }

        let mut body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Transport(format!("undecodable embeddings: {e}")))?;
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}
