//! # agent-core
//!
//! Tool-calling conversation engine with a unified registry for local and
//! provider-backed tools.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ConversationEngine                        │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │  Transcript │  │ ToolRegistry │  │     LlmClient      │  │
//! │  │             │──│ local/remote │──│    (Strategy)      │  │
//! │  └─────────────┘  └──────────────┘  └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmClient` trait keeps the loop independent of the model backend;
//! the `ToolProvider` trait keeps it independent of how remote tools travel.

pub mod builtin;
pub mod engine;
pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

pub use engine::{ConversationEngine, TurnOutcome};
pub use error::{AgentError, Result};
pub use message::{ChatMessage, Role, ToolCallRequest, Transcript};
pub use provider::{ChatResponse, LlmClient};
pub use session::{SessionId, SessionRegistry};
pub use tool::{Tool, ToolBackend, ToolProvider, ToolRegistry};
