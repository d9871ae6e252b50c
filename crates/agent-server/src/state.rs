//! Application State

use std::sync::Arc;

use agent_core::{LlmClient, Result, SessionId};
use agent_runtime::{Agent, AgentCache, AgentConfig};
use tokio::sync::Mutex;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Model backend shared by every agent
    pub client: Arc<dyn LlmClient>,

    /// Per-session agents
    pub agents: Arc<AgentCache>,

    /// Settings for newly created agents
    pub config: Arc<AgentConfig>,
}

impl AppState {
    pub fn new(client: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        Self {
            client,
            agents: Arc::new(AgentCache::new()),
            config: Arc::new(config),
        }
    }

    /// Agent for `id`, created with provider tools on first use
    pub async fn agent(&self, id: &SessionId) -> Result<Arc<Mutex<Agent>>> {
        self.agents
            .get_or_create(id, || async {
                let mut agent = Agent::new(Arc::clone(&self.client), (*self.config).clone());
                let count = agent.initialize_provider_tools().await;
                tracing::info!(session = %id, provider_tools = count, "Agent created");
                Ok(Mutex::new(agent))
            })
            .await
    }

    /// Stop provider processes of every cached agent
    pub async fn shutdown(&self) {
        for id in self.agents.ids().await {
            if let Some(agent) = self.agents.evict(&id).await {
                agent.lock().await.shutdown().await;
            }
        }
    }
}
