//! Stdio Tool Provider
//!
//! One external tool provider reached as a child process speaking
//! newline-delimited JSON-RPC 2.0 (MCP method names) on stdin/stdout.
//!
//! The child is spawned lazily on first use and at most once per session.
//! Every protocol failure is absorbed here: listing degrades to no tools,
//! calls and pings degrade to `None`.

use std::collections::{BTreeMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agent_core::{AgentError, Result, Tool, ToolProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::config::{ProviderConfig, resolve_env};

/// Protocol revision announced during the handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Default time to wait for one response line
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Most `tools/list` pages read from one provider
const MAX_TOOL_PAGES: usize = 64;

/// JSON-RPC 2.0 request or notification
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// Any JSON-RPC message read from the provider
#[derive(Debug, Deserialize)]
struct JsonRpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Resolved process launch parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchParams {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Tool entry as advertised by a provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Protocol half of a connection: the pipes plus handshake state
struct StdioChannel {
    provider: String,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    initialized: bool,
}

impl StdioChannel {
    fn unavailable(&self, detail: impl std::fmt::Display) -> AgentError {
        AgentError::ProviderUnavailable(format!("{}: {detail}", self.provider))
    }

    async fn send(&mut self, message: &JsonRpcRequest<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        if let Err(e) = self.stdin.write_all(&line).await {
            return Err(self.unavailable(format!("write failed: {e}")));
        }
        if let Err(e) = self.stdin.flush().await {
            return Err(self.unavailable(format!("flush failed: {e}")));
        }
        Ok(())
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        self.send(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        })
        .await
    }

    async fn call(&mut self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        self.send(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        })
        .await?;

        let response = match tokio::time::timeout(timeout, self.read_response(id)).await {
            Ok(response) => response?,
            Err(_) => {
                return Err(self.unavailable(format!(
                    "no response to '{method}' within {}s",
                    timeout.as_secs()
                )));
            }
        };

        if let Some(error) = response.error {
            return Err(self.unavailable(format!(
                "{method} failed: code={}, message={}",
                error.code, error.message
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Read lines until the response carrying `id` arrives.
    ///
    /// Blank lines, non-JSON output, notifications, server-initiated requests
    /// and stale responses are skipped.
    async fn read_response(&mut self, id: u64) -> Result<JsonRpcMessage> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = match self.stdout.read_line(&mut line).await {
                Ok(read) => read,
                Err(e) => return Err(self.unavailable(format!("read failed: {e}"))),
            };
            if read == 0 {
                return Err(self.unavailable("closed stdout (process may have exited)"));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(message) = serde_json::from_str::<JsonRpcMessage>(trimmed) else {
                tracing::trace!(provider = %self.provider, line = %trimmed, "Skipping non-protocol output");
                continue;
            };
            if let Some(method) = &message.method {
                tracing::debug!(provider = %self.provider, %method, "Ignoring provider-initiated message");
                continue;
            }
            if message.id.as_ref().and_then(Value::as_u64) == Some(id) {
                return Ok(message);
            }
        }
    }
}

/// Live connection; fields drop in order, so the protocol pipes close
/// before the child (spawned with `kill_on_drop`) is reaped.
struct Connection {
    channel: Mutex<StdioChannel>,
    child: Mutex<Child>,
}

/// One external tool provider process
pub struct ProviderSession {
    name: String,
    config: ProviderConfig,
    launch: LaunchParams,
    request_timeout: Duration,
    connection: OnceCell<Connection>,
    spawns: AtomicUsize,
    server_info: RwLock<Option<Value>>,
    discovered: RwLock<Vec<RemoteToolInfo>>,
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("name", &self.name)
            .field("command", &self.launch.command)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl ProviderSession {
    /// Validate the config and resolve launch parameters; nothing is spawned yet.
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Result<Self> {
        let name = name.into();
        let command = config
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AgentError::Config(format!("provider '{name}' has no command")))?
            .to_string();

        let launch = LaunchParams {
            command,
            args: config.args.clone(),
            env: resolve_env(&config.env),
        };

        Ok(Self {
            name,
            config,
            launch,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connection: OnceCell::new(),
            spawns: AtomicUsize::new(0),
            server_info: RwLock::new(None),
            discovered: RwLock::new(Vec::new()),
        })
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub const fn launch(&self) -> &LaunchParams {
        &self.launch
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// Number of spawn attempts made so far
    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// `initialize` result reported by the provider, once handshaken
    pub async fn server_info(&self) -> Option<Value> {
        self.server_info.read().await.clone()
    }

    /// Tools found by the last successful listing
    pub async fn discovered(&self) -> Vec<RemoteToolInfo> {
        self.discovered.read().await.clone()
    }

    /// Tools from the last listing, bound to this session; no I/O.
    ///
    /// Only descriptors are cached: a cached `Tool` would hold an `Arc` back
    /// to its own session.
    pub async fn tools(self: &Arc<Self>) -> Vec<Tool> {
        let infos = self.discovered().await;
        self.bind(infos)
    }

    fn bind(self: &Arc<Self>, infos: Vec<RemoteToolInfo>) -> Vec<Tool> {
        let provider: Arc<dyn ToolProvider> = self.clone();
        infos
            .into_iter()
            .map(|info| {
                Tool::remote(info.name, info.description, info.input_schema, Arc::clone(&provider))
            })
            .collect()
    }

    fn unavailable(&self, detail: impl std::fmt::Display) -> AgentError {
        AgentError::ProviderUnavailable(format!("{}: {detail}", self.name))
    }

    /// Spawn the provider if not already running
    pub async fn connect(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<&Connection> {
        self.connection.get_or_try_init(|| self.spawn()).await
    }

    async fn spawn(&self) -> Result<Connection> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(provider = %self.name, command = %self.launch.command, "Spawning provider");

        let mut child = Command::new(&self.launch.command)
            .args(&self.launch.args)
            .envs(&self.launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(format!("failed to spawn '{}': {e}", self.launch.command)))?;

        // An early return drops `child`, which kills it.
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.unavailable("stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.unavailable("stdout not captured"))?;

        Ok(Connection {
            channel: Mutex::new(StdioChannel {
                provider: self.name.clone(),
                stdin,
                stdout: BufReader::new(stdout),
                next_id: 1,
                initialized: false,
            }),
            child: Mutex::new(child),
        })
    }

    /// Connect and perform the handshake; repeated calls are no-ops
    pub async fn initialize(&self) -> Result<()> {
        let connection = self.connection().await?;
        let mut channel = connection.channel.lock().await;
        self.handshake(&mut channel).await
    }

    async fn handshake(&self, channel: &mut StdioChannel) -> Result<()> {
        if channel.initialized {
            return Ok(());
        }

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = channel.call("initialize", Some(params), self.request_timeout).await?;
        channel.notify("notifications/initialized", Some(json!({}))).await?;
        channel.initialized = true;

        tracing::info!(
            provider = %self.name,
            protocol = result.get("protocolVersion").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Provider initialized"
        );
        *self.server_info.write().await = Some(result);
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let connection = self.connection().await?;
        let mut channel = connection.channel.lock().await;
        self.handshake(&mut channel).await?;
        channel.call(method, params, self.request_timeout).await
    }

    /// Discover the provider's tools, each bound to this session.
    ///
    /// Any protocol failure yields an empty list.
    pub async fn list_tools(self: &Arc<Self>) -> Vec<Tool> {
        let mut infos = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        for page in 1..=MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let listing = match self.request("tools/list", params).await {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::warn!(provider = %self.name, error = %e, "Tool listing failed");
                    return Vec::new();
                }
            };
            infos.extend(parse_tool_listing(&listing));

            let Some(next) = listing
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
            else {
                break;
            };
            if !seen.insert(next.to_string()) {
                tracing::warn!(provider = %self.name, cursor = %next, "Tool listing cursor repeated; stopping");
                break;
            }
            if page == MAX_TOOL_PAGES {
                tracing::warn!(provider = %self.name, pages = page, "Tool listing page limit reached");
            }
            cursor = Some(next.to_string());
        }

        tracing::debug!(provider = %self.name, count = infos.len(), "Tools listed");
        self.discovered.write().await.clone_from(&infos);
        self.bind(infos)
    }

    /// Liveness probe; `None` when the provider does not answer
    pub async fn ping(&self) -> Option<Value> {
        match self.request("ping", None).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::debug!(provider = %self.name, error = %e, "Ping failed");
                None
            }
        }
    }

    /// Close stdin, then kill the child. The session stays unusable afterwards.
    pub async fn close(&self) {
        let Some(connection) = self.connection.get() else {
            return;
        };

        if let Err(e) = connection.channel.lock().await.stdin.shutdown().await {
            tracing::debug!(provider = %self.name, error = %e, "Provider stdin already closed");
        }
        let mut child = connection.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!(provider = %self.name, error = %e, "Provider already exited");
        }
        tracing::info!(provider = %self.name, "Provider closed");
    }
}

#[async_trait]
impl ToolProvider for ProviderSession {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Option<Value> {
        let params = json!({"name": name, "arguments": arguments});
        match self.request("tools/call", Some(params)).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(provider = %self.name, tool = %name, error = %e, "Remote tool call failed");
                None
            }
        }
    }
}

/// Extract tool entries from a `tools/list` result.
///
/// The result is read as `(kind, payload)` pairs and only `"tools"` payloads
/// are used; entries without a name are dropped.
fn parse_tool_listing(listing: &Value) -> Vec<RemoteToolInfo> {
    let Some(entries) = listing.as_object() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter(|(kind, _)| kind.as_str() == "tools")
        .filter_map(|(_, payload)| payload.as_array())
        .flatten()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?.to_string();
            Some(RemoteToolInfo {
                name,
                description: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                input_schema: entry
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| json!({"type": "object"})),
            })
        })
        .collect()
}
