//! LLM Client Strategy Pattern
//!
//! Defines the interface the conversation engine uses to reach a language
//! model. Backends (Ollama, OpenAI-compatible gateways, scripted test
//! doubles) implement [`LlmClient`]; the engine never sees the wire format.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::LlmClient;
//!
//! let response = client.chat(transcript.messages(), &tools.active_definitions()).await?;
//! let message = response.first_message();
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::ChatMessage;

/// One completion alternative
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChatMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Response from a chat completion call
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    /// `null` and any other non-array value decode as no choices
    #[serde(default, deserialize_with = "tolerant_choices")]
    pub choices: Vec<Choice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    /// Response with a single choice
    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            choices: vec![Choice {
                message: Some(message),
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// Whether the response carries at least one choice
    pub fn has_choices(&self) -> bool {
        !self.choices.is_empty()
    }

    /// `choices[0].message`, or an empty assistant message when missing
    pub fn first_message(&self) -> ChatMessage {
        self.choices
            .first()
            .and_then(|c| c.message.clone())
            .unwrap_or_else(ChatMessage::empty_assistant)
    }
}

fn tolerant_choices<'de, D>(deserializer: D) -> std::result::Result<Vec<Choice>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => {
            serde_json::from_value(Value::Array(items)).map_err(serde::de::Error::custom)
        }
        _ => Ok(Vec::new()),
    }
}

/// Strategy trait for chat-completion backends
///
/// Implement this trait to add support for new LLM backends.
/// The engine works exclusively through this interface.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the transcript plus the active tool definitions.
    ///
    /// Any transport failure is returned as an error and aborts the turn.
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatResponse>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Model identifier used for requests
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn test_missing_message_is_empty_assistant() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[{}]}"#).unwrap();
        assert!(response.has_choices());
        let message = response.first_message();
        assert_eq!(message.role, Role::Assistant);
        assert!(message.content.is_none());

        let empty: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(!empty.has_choices());
    }

    #[test]
    fn test_null_choices_mean_no_answer() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":null}"#).unwrap();
        assert!(!response.has_choices());

        let response: ChatResponse = serde_json::from_str(r#"{"choices":false,"usage":null}"#).unwrap();
        assert!(!response.has_choices());
    }

    #[test]
    fn test_message_without_role_is_assistant() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        let message = response.first_message();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text(), "hi");

        let response: ChatResponse = serde_json::from_str(r#"{"choices":[{"message":{}}]}"#).unwrap();
        let message = response.first_message();
        assert_eq!(message.role, Role::Assistant);
        assert!(!message.has_tool_calls());
        assert_eq!(message.text(), "");
    }
}
