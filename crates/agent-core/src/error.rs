//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM transport failed (HTTP error, bad status, undecodable body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Tool provider process unreachable or protocol exchange failed
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider configuration file could not be loaded
    #[error("Provider load failure: {0}")]
    ProviderLoad(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution failed
    #[error("{0}")]
    ToolExecution(String),

    /// Tool call exceeded its time budget
    #[error("timed out after {0:?}")]
    ToolTimeout(Duration),

    /// Maximum tool-call rounds reached in one turn
    #[error("Maximum tool rounds ({0}) reached")]
    MaxIterations(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited by the remote service
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(name) => {
                format!("The tool provider '{name}' is currently unavailable.")
            }
            Self::ProviderLoad(msg) => format!("Tool providers could not be loaded: {msg}"),
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::ToolTimeout(limit) => format!("A tool did not answer within {limit:?}."),
            Self::MaxIterations(_) => {
                "The request took too many tool rounds. Please try a simpler query.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        assert_eq!(
            AgentError::ToolTimeout(Duration::from_secs(5)).to_string(),
            "timed out after 5s"
        );
        assert_eq!(
            AgentError::ToolTimeout(Duration::from_millis(20)).to_string(),
            "timed out after 20ms"
        );
        assert_eq!(
            AgentError::ToolTimeout(Duration::from_millis(1500)).user_message(),
            "A tool did not answer within 1.5s."
        );
    }
}
