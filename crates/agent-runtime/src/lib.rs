//! # agent-runtime
//!
//! Concrete backends for `agent-core`:
//!
//! - [`OllamaClient`]: OpenAI-compatible chat completions over HTTP
//! - [`ProviderSession`]: one stdio JSON-RPC tool provider process
//! - [`ProviderRegistry`]: every configured provider and its tools
//! - [`Agent`]: composition root, cached per session in an [`AgentCache`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agent_runtime::{Agent, OllamaClient, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_env();
//! let client = Arc::new(OllamaClient::new(config.llm)?);
//! let mut agent = Agent::new(client, config.agent);
//! agent.initialize_provider_tools().await;
//!
//! if let Some(outcome) = agent.process_query("What time is it?").await {
//!     println!("{}", outcome.content);
//! }
//! ```

pub mod agent;
pub mod config;
pub mod embeddings;
pub mod ollama;
pub mod registry;
pub mod stdio;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentCache};
pub use config::{AgentConfig, ProviderConfig, ProvidersFile, RuntimeConfig};
pub use embeddings::{EmbeddingsClient, RetryPolicy};
pub use ollama::{OllamaClient, OllamaConfig};
pub use registry::ProviderRegistry;
pub use stdio::ProviderSession;
