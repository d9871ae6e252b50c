//! Conversation Engine
//!
//! Drives one turn: the model is called with the transcript and the active
//! tool definitions, every requested tool call is dispatched in order, and
//! the model is called again until it answers without tool calls.
//!
//! ```text
//! AwaitingUser ─▶ ModelRequested ─▶ HasToolCalls ─▶ ToolsExecuting ─┐
//!                      ▲                                             │
//!                      └─────────────────────────────────────────────┘
//!                      │ no tool calls / no choices
//!                      ▼
//!                   Terminal
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::{ChatMessage, Transcript};
use crate::provider::LlmClient;
use crate::tool::ToolRegistry;

/// Default cap on tool-call rounds per turn
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 32;

/// Result of a completed turn
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Content of the last assistant message, `""` when absent
    pub content: String,

    /// Distinct tool names invoked during the turn, in first-use order
    pub tools_used: Vec<String>,
}

impl TurnOutcome {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// The request/dispatch loop
#[derive(Clone)]
pub struct ConversationEngine {
    client: Arc<dyn LlmClient>,
    max_tool_rounds: usize,
}

impl ConversationEngine {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    #[must_use]
    pub const fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    /// Run one turn for `prompt`, appending every message to `transcript`.
    ///
    /// Tool failures never abort the loop; client errors do and are returned
    /// unchanged.
    pub async fn run_turn(
        &self,
        transcript: &mut Transcript,
        tools: &ToolRegistry,
        prompt: &str,
    ) -> Result<TurnOutcome> {
        transcript.push(ChatMessage::user(prompt));

        let response = self
            .client
            .chat(transcript.messages(), &tools.active_definitions())
            .await?;
        let mut message = response.first_message();
        transcript.push(message.clone());

        let mut tools_used: Vec<String> = Vec::new();
        let mut rounds = 0;

        while message.has_tool_calls() {
            rounds += 1;
            if rounds > self.max_tool_rounds {
                return Err(AgentError::MaxIterations(self.max_tool_rounds));
            }

            tracing::debug!(round = rounds, calls = message.requested_calls().len(), "Dispatching tool calls");
            for call in message.requested_calls() {
                let result = tools.dispatch(call).await;
                transcript.push(result);

                if !tools_used.iter().any(|used| used == call.name()) {
                    tools_used.push(call.name().to_string());
                }
            }

            let response = self
                .client
                .chat(transcript.messages(), &tools.active_definitions())
                .await?;
            if !response.has_choices() {
                tracing::info!(round = rounds, "Model returned no choices; ending turn");
                return Ok(TurnOutcome {
                    content: String::new(),
                    tools_used,
                });
            }

            message = response.first_message();
            transcript.push(message.clone());
        }

        Ok(TurnOutcome {
            content: message.text().to_string(),
            tools_used,
        })
    }

    /// Run a turn on a fresh transcript seeded with `system_prompt`
    pub async fn ask(
        &self,
        system_prompt: &str,
        tools: &ToolRegistry,
        prompt: &str,
    ) -> Result<TurnOutcome> {
        let mut transcript = Transcript::with_system_prompt(system_prompt);
        self.run_turn(&mut transcript, tools, prompt).await
    }
}
