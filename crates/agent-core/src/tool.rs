//! Tool System
//!
//! One [`Tool`] type covers both in-process functions and functions proxied
//! from an external provider process. The backend is a tagged enum, so the
//! registry and the engine invoke every tool the same way.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::message::{ChatMessage, ToolCallRequest};

/// Keyword arguments passed to a tool
pub type ToolArgs = serde_json::Map<String, Value>;

/// Boxed future returned by a local tool handler
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// In-process tool implementation
pub type LocalHandler = Arc<dyn Fn(ToolArgs) -> ToolFuture + Send + Sync>;

/// Remote side of a provider-backed tool
///
/// `call_tool` returns `None` when the provider could not answer; that is
/// distinct from a legitimate empty result.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Name of the provider, used in diagnostics
    fn provider_name(&self) -> &str;

    /// Forward a call to the provider
    async fn call_tool(&self, name: &str, arguments: Value) -> Option<Value>;
}

/// How a tool is executed
#[derive(Clone)]
pub enum ToolBackend {
    /// Rust closure running in this process
    Local(LocalHandler),
    /// Call forwarded to an external provider session
    Provider(Arc<dyn ToolProvider>),
}

impl std::fmt::Debug for ToolBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Local"),
            Self::Provider(p) => write!(f, "Provider({})", p.provider_name()),
        }
    }
}

/// Function definition advertised to the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// OpenAI-style tool definition (`{"type": "function", "function": {...}}`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

/// A named, schema-described capability the model may invoke
#[derive(Clone, Debug)]
pub struct Tool {
    name: String,
    description: String,
    parameters: Value,
    enabled: bool,
    backend: ToolBackend,
}

impl Tool {
    /// Tool backed by an async closure
    pub fn local<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: LocalHandler = Arc::new(move |args: ToolArgs| -> ToolFuture { Box::pin(func(args)) });
        Self::with_backend(name, description, parameters, ToolBackend::Local(handler))
    }

    /// Tool backed by a synchronous closure
    pub fn local_sync<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Self
    where
        F: Fn(ToolArgs) -> Result<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(func);
        Self::local(name, description, parameters, move |args| {
            let handler = Arc::clone(&handler);
            async move { handler(args) }
        })
    }

    /// Tool whose calls are forwarded to a provider
    pub fn remote(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        provider: Arc<dyn ToolProvider>,
    ) -> Self {
        Self::with_backend(name, description, parameters, ToolBackend::Provider(provider))
    }

    fn with_backend(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        backend: ToolBackend,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: normalize_schema(parameters),
            enabled: true,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub const fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn backend(&self) -> &ToolBackend {
        &self.backend
    }

    /// Whether calls leave the process
    pub const fn is_remote(&self) -> bool {
        matches!(self.backend, ToolBackend::Provider(_))
    }

    /// Start in the disabled state
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            kind: "function".into(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }

    /// Execute the tool with parsed keyword arguments
    pub async fn invoke(&self, args: ToolArgs) -> Result<Value> {
        match &self.backend {
            ToolBackend::Local(handler) => handler(args).await,
            ToolBackend::Provider(provider) => provider
                .call_tool(&self.name, Value::Object(args))
                .await
                .ok_or_else(|| {
                    AgentError::ProviderUnavailable(provider.provider_name().to_string())
                }),
        }
    }
}

/// Ensure the schema is a JSON object; anything else becomes an empty object schema.
fn normalize_schema(parameters: Value) -> Value {
    if parameters.is_object() {
        parameters
    } else {
        json!({"type": "object", "properties": {}})
    }
}

/// Registry for available tools
///
/// Tools are keyed by name and kept in registration order. They are never
/// removed, only disabled.
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
    call_timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every invocation; a timeout is reported like an execution error.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn set_call_timeout(&mut self, timeout: Option<Duration>) {
        self.call_timeout = timeout;
    }

    /// Register a tool, overwriting any tool with the same name in place
    pub fn register(&mut self, tool: Tool) {
        if let Some(&pos) = self.index.get(tool.name()) {
            tracing::debug!(tool = %tool.name(), "Replacing registered tool");
            self.tools[pos] = tool;
        } else {
            self.index.insert(tool.name().to_string(), self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Register several tools in order
    pub fn register_all(&mut self, tools: impl IntoIterator<Item = Tool>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn enable(&mut self, name: &str) -> Result<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> Result<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let pos = *self
            .index
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        self.tools[pos].enabled = enabled;
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&pos| &self.tools[pos])
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(Tool::is_enabled)
    }

    /// Iterate over every tool in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    /// Get tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn enabled_names(&self) -> Vec<&str> {
        self.enabled().map(Tool::name).collect()
    }

    fn enabled(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter().filter(|t| t.enabled)
    }

    /// Function definitions of every enabled tool, in registration order
    pub fn active_definitions(&self) -> Vec<Value> {
        self.enabled()
            .map(|t| json!(t.definition()))
            .collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one tool call and turn the outcome into a tool result message.
    ///
    /// Never fails: unknown tools, errors, panics and timeouts all become
    /// `{"error": ...}` content.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ChatMessage {
        let name = call.name();
        let content = match self.execute(call).await {
            Ok(value) => value.to_string(),
            Err(AgentError::ToolNotFound(_)) => {
                tracing::warn!(tool = %name, "Model requested unknown tool");
                json!({"error": format!("Tool '{name}' not found")}).to_string()
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool call failed");
                json!({"error": format!("Error running tool '{name}': {e}")}).to_string()
            }
        };
        ChatMessage::tool_result(call.id.clone(), content)
    }

    /// Execute a tool call, returning the raw value or the failure
    pub async fn execute(&self, call: &ToolCallRequest) -> Result<Value> {
        let tool = self
            .get(call.name())
            .ok_or_else(|| AgentError::ToolNotFound(call.name().to_string()))?;
        let args = call.parsed_arguments();

        tracing::debug!(tool = %tool.name(), remote = tool.is_remote(), "Executing tool");
        let invocation = AssertUnwindSafe(tool.invoke(args)).catch_unwind();

        let outcome = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .map_err(|_| AgentError::ToolTimeout(limit))?,
            None => invocation.await,
        };

        outcome.unwrap_or_else(|_| Err(AgentError::ToolExecution("tool panicked".into())))
    }

    /// Generate system prompt section describing the enabled tools
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        let mut any = false;

        for tool in self.enabled() {
            any = true;
            prompt.push_str(&format!("### {}\n{}\n", tool.name(), tool.description()));

            let required: Vec<&str> = tool.parameters["required"]
                .as_array()
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            if let Some(props) = tool.parameters["properties"].as_object().filter(|p| !p.is_empty()) {
                prompt.push_str("**Parameters:**\n");
                for (param, schema) in props {
                    let kind = schema["type"].as_str().unwrap_or("any");
                    let flag = if required.contains(&param.as_str()) { " (required)" } else { "" };
                    let description = schema["description"].as_str().unwrap_or("");
                    prompt.push_str(&format!("- `{param}` ({kind}){flag}: {description}\n"));
                }
            }
            prompt.push('\n');
        }

        if !any {
            prompt.push_str("No tools are currently enabled.\n");
        }
        prompt
    }
}
