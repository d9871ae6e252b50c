//! Provider Configuration
//!
//! Declarative list of external tool providers:
//!
//! ```json
//! {
//!   "servers": {
//!     "filesystem": {
//!       "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
//!       "env": {"API_KEY": "$FS_API_KEY"}
//!     }
//!   }
//! }
//! ```
//!
//! Also home of [`RuntimeConfig`], the environment-driven settings of the
//! agent runtime.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use agent_core::engine::DEFAULT_MAX_TOOL_ROUNDS;
use serde::{Deserialize, Serialize};

use crate::ollama::OllamaConfig;

/// Default provider file location
pub const DEFAULT_PROVIDERS_PATH: &str = "providers.json";

/// Default instructions preceding the generated tool section
pub const DEFAULT_BASE_PROMPT: &str = "You are a helpful assistant with access to tools.

Call a tool whenever it gives a more accurate answer than you could produce \
on your own, for example for dates, arithmetic, files or web content. When a \
tool returns an error, explain the problem instead of guessing the result. \
Keep answers concise.";

/// Launch description of one provider process
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Executable to spawn; required
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment; values starting with `$` name a host variable
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Provider configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProvidersFile {
    #[serde(default)]
    pub servers: BTreeMap<String, ProviderConfig>,
}

/// Resolve `$NAME` values against the host environment (missing ⇒ empty).
pub fn resolve_env(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| {
            let resolved = value
                .strip_prefix('$')
                .map_or_else(|| value.clone(), |var| std::env::var(var).unwrap_or_default());
            (key.clone(), resolved)
        })
        .collect()
}

/// Agent-level settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    /// Instructions placed before the tool section of the system prompt
    pub base_prompt: String,

    /// Provider file; `None` disables provider tools
    pub providers_path: Option<PathBuf>,

    /// Per-invocation tool budget
    pub tool_timeout: Option<Duration>,

    pub max_tool_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_prompt: DEFAULT_BASE_PROMPT.into(),
            providers_path: Some(PathBuf::from(DEFAULT_PROVIDERS_PATH)),
            tool_timeout: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

impl AgentConfig {
    /// No provider file, default prompt
    pub fn local_only() -> Self {
        Self {
            providers_path: None,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_providers_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.providers_path = Some(path.into());
        self
    }
}

/// Everything the runtime reads from the environment
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuntimeConfig {
    pub llm: OllamaConfig,
    pub agent: AgentConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `AGENT_PROVIDERS` set to an empty string disables providers.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = AgentConfig::default();

        let providers_path = match lookup("AGENT_PROVIDERS") {
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => defaults.providers_path,
        };
        let tool_timeout = lookup("AGENT_TOOL_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);
        let max_tool_rounds = lookup("AGENT_MAX_TOOL_ROUNDS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_tool_rounds);
        let base_prompt = lookup("AGENT_SYSTEM_PROMPT")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(defaults.base_prompt);

        Self {
            llm: OllamaConfig::from_lookup(&lookup),
            agent: AgentConfig {
                base_prompt,
                providers_path,
                tool_timeout,
                max_tool_rounds,
            },
        }
    }
}
