//! Provider Registry
//!
//! Aggregates every configured provider session and the tools they expose.
//! Loading and discovery never fail outright: bad files, bad entries and
//! misbehaving providers are logged and skipped.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use agent_core::{AgentError, Result, Tool};
use futures::FutureExt;
use serde_json::{Map, Value};

use crate::config::ProviderConfig;
use crate::stdio::ProviderSession;

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    sessions: BTreeMap<String, Arc<ProviderSession>>,
    tools: Vec<Tool>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a provider file; `false` when the file is missing or unreadable
    pub async fn load(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "Loading provider file");
                self.load_str(&contents)
            }
            Err(e) => {
                let err = AgentError::ProviderLoad(format!("{}: {e}", path.display()));
                tracing::warn!(error = %err, "Provider file not loaded");
                false
            }
        }
    }

    /// Load a provider document; `false` when it is not `{"servers": {...}}`.
    ///
    /// Entries that fail to parse or lack a command are skipped.
    pub fn load_str(&mut self, contents: &str) -> bool {
        let servers = match parse_servers(contents) {
            Ok(servers) => servers,
            Err(e) => {
                tracing::warn!(error = %e, "Provider file not loaded");
                return false;
            }
        };

        for (name, entry) in servers {
            let session = serde_json::from_value::<ProviderConfig>(entry)
                .map_err(|e| e.to_string())
                .and_then(|config| ProviderSession::new(name.clone(), config).map_err(|e| e.to_string()));

            match session {
                Ok(session) => {
                    tracing::debug!(provider = %name, "Provider configured");
                    self.sessions.insert(name, Arc::new(session));
                }
                Err(e) => tracing::warn!(provider = %name, error = %e, "Skipping provider entry"),
            }
        }
        true
    }

    /// Register an already-built session
    pub fn insert(&mut self, session: ProviderSession) {
        self.sessions
            .insert(session.name().to_string(), Arc::new(session));
    }

    /// List tools from every provider in name order.
    ///
    /// A provider whose listing panics is logged and contributes nothing.
    pub async fn discover_all(&mut self) -> &[Tool] {
        self.tools.clear();

        for (name, session) in &self.sessions {
            match AssertUnwindSafe(session.list_tools()).catch_unwind().await {
                Ok(tools) => {
                    tracing::info!(provider = %name, count = tools.len(), "Provider tools discovered");
                    self.tools.extend(tools);
                }
                Err(_) => {
                    tracing::error!(provider = %name, "Tool discovery panicked; skipping provider");
                }
            }
        }

        &self.tools
    }

    pub const fn sessions(&self) -> &BTreeMap<String, Arc<ProviderSession>> {
        &self.sessions
    }

    pub fn session(&self, name: &str) -> Option<&Arc<ProviderSession>> {
        self.sessions.get(name)
    }

    /// Tools found by the last discovery
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every provider process
    pub async fn shutdown(&self) {
        for session in self.sessions.values() {
            session.close().await;
        }
    }
}

/// The `servers` object of a provider document
fn parse_servers(contents: &str) -> Result<Map<String, Value>> {
    let document: Value = serde_json::from_str(contents)
        .map_err(|e| AgentError::ProviderLoad(format!("malformed provider file: {e}")))?;

    match document {
        Value::Object(mut root) => match root.remove("servers") {
            Some(Value::Object(servers)) => Ok(servers),
            _ => Err(AgentError::ProviderLoad("no 'servers' object".into())),
        },
        _ => Err(AgentError::ProviderLoad("document is not an object".into())),
    }
}
