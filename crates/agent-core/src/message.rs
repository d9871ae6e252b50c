//! Conversation Messages
//!
//! OpenAI-compatible chat message format shared by the engine, the tool
//! registry and every `LlmClient` backend.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Role of a message sender
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response; assumed when a message omits its role
    #[default]
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Function name and raw argument string of a tool call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    /// Arguments as emitted by the model; expected to be a JSON object string.
    #[serde(default, deserialize_with = "arguments_as_string")]
    pub arguments: String,
}

/// Tool call request emitted by the model inside an assistant message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id echoed back in the tool result message
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type", default = "default_call_type")]
    pub kind: String,

    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".into()
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Name of the requested tool
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Parse the argument string into a keyword map.
    ///
    /// Malformed JSON, or JSON that is not an object, yields an empty map.
    pub fn parsed_arguments(&self) -> serde_json::Map<String, Value> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return serde_json::Map::new();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                tracing::debug!(tool = %self.function.name, kind = ?other, "Non-object tool arguments ignored");
                serde_json::Map::new()
            }
            Err(e) => {
                tracing::debug!(tool = %self.function.name, error = %e, "Malformed tool arguments ignored");
                serde_json::Map::new()
            }
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by the assistant.
    ///
    /// `null`, `false`, a missing field and any other non-array value all
    /// decode to `None`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "tolerant_tool_calls"
    )]
    pub tool_calls: Option<Vec<ToolCallRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Optional name (tool name on tool messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant message with no content, used when the model returned nothing
    pub const fn empty_assistant() -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Assistant message carrying tool calls
    pub const fn assistant_with_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a tool result message
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: None,
        }
    }

    /// Tool calls requested by this message; empty when absent.
    pub fn requested_calls(&self) -> &[ToolCallRequest] {
        self.tool_calls.as_deref().unwrap_or_default()
    }

    /// Whether the message carries a non-empty tool call list
    pub fn has_tool_calls(&self) -> bool {
        !self.requested_calls().is_empty()
    }

    /// Content text, `""` when absent
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

fn tolerant_tool_calls<'de, D>(deserializer: D) -> Result<Option<Vec<ToolCallRequest>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => serde_json::from_value(Value::Array(items))
            .map(Some)
            .map_err(serde::de::Error::custom),
        None | Some(Value::Null | Value::Bool(false)) => Ok(None),
        Some(other) => {
            // TODO: decide whether non-array tool_calls should be rejected once upstream shaping is settled.
            tracing::debug!(value = %other, "Unexpected tool_calls shape treated as empty");
            Ok(None)
        }
    }
}

fn arguments_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Ordered list of messages in one logical conversation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.push(ChatMessage::system(prompt));
        transcript
    }

    /// Add a message
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append several messages in order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    /// Get all messages
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Replace the leading system message, inserting one if missing
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = Some(prompt.into()),
            _ => self.messages.insert(0, ChatMessage::system(prompt)),
        }
    }

    /// Clear all messages except system prompts
    pub fn clear_history(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> ChatMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_tool_calls_stop_forms() {
        for json in [
            r#"{"role":"assistant","content":"done"}"#,
            r#"{"role":"assistant","content":"done","tool_calls":null}"#,
            r#"{"role":"assistant","content":"done","tool_calls":false}"#,
            r#"{"role":"assistant","content":"done","tool_calls":[]}"#,
        ] {
            assert!(!decode(json).has_tool_calls(), "{json}");
        }
    }

    #[test]
    fn test_tool_calls_decoded() {
        let msg = decode(
            r#"{"role":"assistant","tool_calls":[
                {"id":"c1","type":"function","function":{"name":"read_file","arguments":"{\"path\":\"a.txt\"}"}},
                {"id":"c2","function":{"name":"write_file","arguments":{"path":"b.txt"}}}
            ]}"#,
        );
        let calls = msg.requested_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name(), "read_file");
        assert_eq!(calls[1].kind, "function");
        assert_eq!(calls[1].parsed_arguments()["path"], "b.txt");
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn test_malformed_arguments_are_empty() {
        let call = ToolCallRequest::new("c1", "read_file", "{bad json");
        assert!(call.parsed_arguments().is_empty());
        let call = ToolCallRequest::new("c2", "read_file", "[1, 2]");
        assert!(call.parsed_arguments().is_empty());
    }

    #[test]
    fn test_tool_result_serialization() {
        let msg = ChatMessage::tool_result("call_7", r#"{"ok":true}"#);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_7");
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn test_transcript_system_prompt() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("Hi"));
        transcript.set_system_prompt("v1");
        transcript.set_system_prompt("v2");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].text(), "v2");

        transcript.clear_history();
        assert_eq!(transcript.len(), 1);
    }
}
