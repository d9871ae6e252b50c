//! Agent
//!
//! Composition root tying the model client, the tool registry, provider
//! processes and per-session history together.

use std::sync::Arc;

use agent_core::builtin::builtin_tools;
use agent_core::{
    ChatMessage, ConversationEngine, LlmClient, Result, SessionRegistry, Tool, ToolRegistry,
    Transcript, TurnOutcome,
};
use tokio::sync::Mutex;

use crate::config::AgentConfig;
use crate::registry::ProviderRegistry;

/// Per-session agents, shared by reference with every call site
pub type AgentCache = SessionRegistry<Mutex<Agent>>;

pub struct Agent {
    engine: ConversationEngine,
    tools: ToolRegistry,
    providers: Option<ProviderRegistry>,
    providers_initialized: bool,
    config: AgentConfig,
    system_prompt: String,
    history: Vec<ChatMessage>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("model", &self.engine.client().model())
            .field("tools", &self.tools.names())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Agent with the built-in tools registered; providers start later via
    /// [`Agent::initialize_provider_tools`]
    pub fn new(client: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        let engine = ConversationEngine::new(client).with_max_tool_rounds(config.max_tool_rounds);

        let mut tools = ToolRegistry::new();
        tools.set_call_timeout(config.tool_timeout);
        tools.register_all(builtin_tools());

        let mut agent = Self {
            engine,
            tools,
            providers: None,
            providers_initialized: false,
            config,
            system_prompt: String::new(),
            history: Vec::new(),
        };
        agent.refresh_system_prompt();
        agent
    }

    /// Use an already-loaded provider registry instead of the configured file
    #[must_use]
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub const fn providers(&self) -> Option<&ProviderRegistry> {
        self.providers.as_ref()
    }

    fn refresh_system_prompt(&mut self) {
        self.system_prompt = format!(
            "{}\n\n{}",
            self.config.base_prompt.trim_end(),
            self.tools.generate_prompt_section()
        );
    }

    /// Register or replace a tool
    pub fn add_tool(&mut self, tool: Tool) {
        self.tools.register(tool);
        self.refresh_system_prompt();
    }

    pub fn enable_tool(&mut self, name: &str) -> Result<()> {
        self.tools.enable(name)?;
        self.refresh_system_prompt();
        Ok(())
    }

    pub fn disable_tool(&mut self, name: &str) -> Result<()> {
        self.tools.disable(name)?;
        self.refresh_system_prompt();
        Ok(())
    }

    /// Load the provider file, discover tools and register them.
    ///
    /// Runs once; later calls return 0. Provider problems are logged, never
    /// raised.
    pub async fn initialize_provider_tools(&mut self) -> usize {
        if self.providers_initialized {
            return 0;
        }
        self.providers_initialized = true;

        if self.providers.is_none() {
            let Some(path) = self.config.providers_path.clone() else {
                tracing::debug!("No provider file configured");
                return 0;
            };
            let mut registry = ProviderRegistry::new();
            if !registry.load(&path).await {
                return 0;
            }
            self.providers = Some(registry);
        }

        let Some(providers) = self.providers.as_mut() else {
            return 0;
        };
        let provider_count = providers.len();
        let discovered = providers.discover_all().await.to_vec();
        let count = discovered.len();

        for tool in discovered {
            if self.tools.get(tool.name()).is_some() {
                tracing::warn!(tool = %tool.name(), "Provider tool replaces an existing tool");
            }
            self.tools.register(tool);
        }
        self.refresh_system_prompt();

        tracing::info!(count, providers = provider_count, "Provider tools registered");
        count
    }

    /// Run one turn on `[system, history.., prompt]`, propagating failures
    pub async fn run_query(&mut self, prompt: &str) -> Result<TurnOutcome> {
        let mut transcript = Transcript::with_system_prompt(self.system_prompt.as_str());
        transcript.extend(self.history.iter().cloned());

        let outcome = self
            .engine
            .run_turn(&mut transcript, &self.tools, prompt)
            .await?;

        if !outcome.is_empty() {
            self.history.push(ChatMessage::user(prompt));
            self.history.push(ChatMessage::assistant(outcome.content.as_str()));
        }
        Ok(outcome)
    }

    /// [`Agent::run_query`] with failures logged and reported as `None`
    pub async fn process_query(&mut self, prompt: &str) -> Option<TurnOutcome> {
        match self.run_query(prompt).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Query failed");
                None
            }
        }
    }

    /// Stop every provider process
    pub async fn shutdown(&self) {
        if let Some(providers) = &self.providers {
            providers.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedClient, answer, mock_provider, tool_round};
    use agent_core::{AgentError, Role, SessionId};
    use serde_json::{Value, json};

    fn agent(script: Vec<Result<agent_core::ChatResponse>>) -> (Agent, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(script));
        (Agent::new(client.clone(), AgentConfig::local_only()), client)
    }

    #[test]
    fn test_new_agent_has_builtins() {
        let (agent, _) = agent(vec![]);
        assert_eq!(agent.tools().names(), vec!["datetime", "calculate"]);
        assert!(agent.system_prompt().starts_with("You are a helpful assistant"));
        assert!(agent.system_prompt().contains("### calculate"));
    }

    #[test]
    fn test_prompt_follows_enabled_tools() {
        let (mut agent, _) = agent(vec![]);

        agent.disable_tool("calculate").unwrap();
        assert!(!agent.system_prompt().contains("### calculate"));

        agent.add_tool(Tool::local_sync("echo", "Echo input", json!({}), |args| {
            Ok(Value::Object(args))
        }));
        assert!(agent.system_prompt().contains("### echo"));

        agent.enable_tool("calculate").unwrap();
        assert!(agent.system_prompt().contains("### calculate"));

        let before = agent.system_prompt().to_string();
        assert!(matches!(
            agent.disable_tool("ghost"),
            Err(AgentError::ToolNotFound(_))
        ));
        assert_eq!(agent.system_prompt(), before);
    }

    #[tokio::test]
    async fn test_query_with_tool_round() {
        let (mut agent, client) = agent(vec![
            tool_round("c1", "calculate", r#"{"expression": "6 * 7"}"#),
            answer("6 times 7 is 42."),
        ]);

        let outcome = agent.process_query("What is 6 * 7?").await.unwrap();
        assert_eq!(outcome.content, "6 times 7 is 42.");
        assert_eq!(outcome.tools_used, vec!["calculate"]);
        assert_eq!(client.call_count(), 2);

        let seen = client.seen.lock().unwrap();
        let tool_message = seen[1].iter().find(|m| m.role == Role::Tool).unwrap();
        let content: Value = serde_json::from_str(tool_message.text()).unwrap();
        assert_eq!(content["result"], 42.0);
        assert_eq!(seen[0][0].role, Role::System);
    }

    #[tokio::test]
    async fn test_history_keeps_answered_turns_only() {
        let (mut agent, client) = agent(vec![
            answer("Hello!"),
            Ok(agent_core::ChatResponse::default()),
            answer("Still here."),
        ]);

        agent.process_query("hi").await.unwrap();
        assert_eq!(agent.history().len(), 2);

        let empty = agent.process_query("anything?").await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(agent.history().len(), 2);

        agent.process_query("you there?").await.unwrap();
        assert_eq!(agent.history().len(), 4);

        // system + first pair + prompt
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[2].len(), 4);
        assert_eq!(seen[2][1].text(), "hi");
        assert_eq!(seen[2][2].text(), "Hello!");
    }

    #[tokio::test]
    async fn test_transport_failure_is_swallowed() {
        let (mut agent, _) = agent(vec![Err(AgentError::Transport("connection refused".into()))]);

        assert!(agent.process_query("hi").await.is_none());
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn test_run_query_propagates() {
        let (mut agent, _) = agent(vec![Err(AgentError::Transport("502".into()))]);
        assert!(matches!(
            agent.run_query("hi").await,
            Err(AgentError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_tools_initialize_once() {
        let dir = tempfile::tempdir().unwrap();
        let (config, _) = mock_provider(dir.path());
        let path = dir.path().join("providers.json");
        std::fs::write(&path, json!({"servers": {"mock": config}}).to_string()).unwrap();

        let client = Arc::new(ScriptedClient::new(vec![
            tool_round("c1", "echo", r#"{"message": "from provider"}"#),
            answer("The provider said: from provider"),
        ]));
        let mut agent = Agent::new(
            client.clone(),
            AgentConfig::local_only().with_providers_path(&path),
        );

        assert_eq!(agent.initialize_provider_tools().await, 2);
        assert_eq!(agent.initialize_provider_tools().await, 0);
        assert_eq!(agent.tools().names(), vec!["datetime", "calculate", "echo", "fail"]);
        assert!(agent.system_prompt().contains("### echo"));

        let outcome = agent.process_query("echo something").await.unwrap();
        assert_eq!(outcome.tools_used, vec!["echo"]);

        let offered = client.offered.lock().unwrap();
        assert_eq!(offered[0].len(), 4);
        drop(offered);

        let seen = client.seen.lock().unwrap();
        let tool_message = seen[1].iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_message.text().contains("from provider"));
        drop(seen);

        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_provider_file() {
        let (mut agent, _) = agent(vec![]);
        let mut agent_with_path = Agent::new(
            Arc::new(ScriptedClient::new(vec![])),
            AgentConfig::local_only().with_providers_path("/nonexistent/providers.json"),
        );

        assert_eq!(agent.initialize_provider_tools().await, 0);
        assert_eq!(agent_with_path.initialize_provider_tools().await, 0);
        assert_eq!(agent_with_path.tools().len(), 2);
    }

    #[tokio::test]
    async fn test_agent_cache_is_per_session() {
        let cache = AgentCache::new();
        let client: Arc<dyn LlmClient> = Arc::new(ScriptedClient::new(vec![]));

        let first = cache
            .get_or_create(&SessionId::from_string("a"), || async {
                Ok(Mutex::new(Agent::new(client.clone(), AgentConfig::local_only())))
            })
            .await
            .unwrap();
        first.lock().await.disable_tool("datetime").unwrap();

        let again = cache
            .get_or_create(&SessionId::from_string("a"), || async {
                Ok(Mutex::new(Agent::new(client.clone(), AgentConfig::local_only())))
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!again.lock().await.tools().is_enabled("datetime"));

        let other = cache
            .get_or_create(&SessionId::from_string("b"), || async {
                Ok(Mutex::new(Agent::new(client.clone(), AgentConfig::local_only())))
            })
            .await
            .unwrap();
        assert!(other.lock().await.tools().is_enabled("datetime"));
        assert_eq!(cache.len().await, 2);
    }
}
