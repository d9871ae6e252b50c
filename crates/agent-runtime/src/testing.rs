//! Test fixtures: a python mock provider and a scripted model client.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use agent_core::provider::ChatResponse;
use agent_core::{AgentError, ChatMessage, LlmClient, Result, ToolCallRequest};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::ProviderConfig;

const MOCK_PROVIDER: &str = r#"
import json, os, sys

log = os.environ.get("SPAWN_LOG")
if log:
    with open(log, "a") as f:
        f.write("spawn\n")

print("mock provider starting", flush=True)

# tools/list pages keyed by cursor: (tool names, next cursor)
PAGES = {
    "two": {None: (["echo"], "p2"), "p2": (["fail"], None)},
    "cycle": {None: (["echo"], "A"), "A": (["a_tool"], "B"), "B": (["b_tool"], "A")},
}
paging = PAGES.get(os.environ.get("PAGING", ""))

def send(msg):
    sys.stdout.write(json.dumps(msg) + "\n")
    sys.stdout.flush()

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    msg = json.loads(line)
    method = msg.get("method")
    mid = msg.get("id")
    if mid is None:
        continue
    if method == "initialize":
        send({"jsonrpc": "2.0", "id": mid, "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mock", "version": "0.1.0"}}})
    elif method == "tools/list" and paging:
        cursor = (msg.get("params") or {}).get("cursor")
        names, after = paging[cursor]
        result = {"tools": [{"name": n, "description": n} for n in names]}
        if after:
            result["nextCursor"] = after
        send({"jsonrpc": "2.0", "id": mid, "result": result})
    elif method == "tools/list":
        send({"jsonrpc": "2.0", "method": "notifications/message", "params": {"level": "info"}})
        send({"jsonrpc": "2.0", "id": mid, "result": {"tools": [
            {"name": "echo", "description": "Echoes the message",
             "inputSchema": {"type": "object",
                             "properties": {"message": {"type": "string"}},
                             "required": ["message"]}},
            {"name": "fail", "description": "Always fails"}], "_meta": {}}})
    elif method == "tools/call":
        params = msg.get("params", {})
        if params.get("name") == "echo":
            text = params.get("arguments", {}).get("message", "")
            send({"jsonrpc": "2.0", "id": mid, "result": {"content": [{"type": "text", "text": text}]}})
        else:
            send({"jsonrpc": "2.0", "id": mid, "error": {"code": -32000, "message": "tool failed"}})
    elif method == "ping":
        send({"jsonrpc": "2.0", "id": mid, "result": {}})
    else:
        send({"jsonrpc": "2.0", "id": mid, "error": {"code": -32601, "message": "Method not found"}})
"#;

/// Write the mock provider into `dir`; returns its config and spawn log path
pub fn mock_provider(dir: &Path) -> (ProviderConfig, PathBuf) {
    let script = dir.join("mock_provider.py");
    std::fs::write(&script, MOCK_PROVIDER).unwrap();
    let log = dir.join("spawns.log");

    let config = ProviderConfig::new("python3")
        .arg(script.to_string_lossy())
        .env("SPAWN_LOG", log.to_string_lossy());
    (config, log)
}

/// Mock provider whose tool listing is split into cursor pages (`two` or `cycle`)
pub fn paged_mock_provider(dir: &Path, mode: &str) -> (ProviderConfig, PathBuf) {
    let (config, log) = mock_provider(dir);
    (config.env("PAGING", mode), log)
}

/// Number of times the mock provider has started
pub fn spawn_lines(log: &Path) -> usize {
    std::fs::read_to_string(log).map_or(0, |s| s.lines().count())
}

pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<ChatResponse>>>,
    calls: AtomicUsize,
    pub seen: Mutex<Vec<Vec<ChatMessage>>>,
    pub offered: Mutex<Vec<Vec<Value>>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<ChatResponse>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            offered: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn tool_round(id: &str, name: &str, arguments: &str) -> Result<ChatResponse> {
    Ok(ChatResponse::from_message(ChatMessage::assistant_with_calls(
        vec![ToolCallRequest::new(id, name, arguments)],
    )))
}

pub fn answer(text: &str) -> Result<ChatResponse> {
    Ok(ChatResponse::from_message(ChatMessage::assistant(text)))
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        self.offered.lock().unwrap().push(tools.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Transport("script exhausted".into())))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
