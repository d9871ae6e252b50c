//! toolloop agent binary
//!
//! `agent ask` answers one prompt, `agent chat` runs an interactive session,
//! `agent serve` exposes per-session agents over HTTP.

mod cli;
mod handlers;
mod state;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::SessionId;
use agent_runtime::{OllamaClient, RuntimeConfig};

use crate::cli::{Cli, Commands};
use crate::handlers::{chat_handler, disable_tool, enable_tool, health_check, list_tools};
use crate::state::AppState;

/// Exit status after Ctrl-C
const INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let state = build_state(&cli)?;

    tokio::select! {
        result = run(cli.command, state.clone()) => {
            state.shutdown().await;
            result
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nGoodbye!");
            std::process::exit(INTERRUPTED);
        }
    }
}

fn build_state(cli: &Cli) -> anyhow::Result<AppState> {
    let mut config = RuntimeConfig::from_env();
    if let Some(model) = &cli.model {
        config.llm.model.clone_from(model);
    }
    if let Some(path) = &cli.providers {
        config.agent.providers_path = Some(path.clone());
    }
    if cli.no_providers {
        config.agent.providers_path = None;
    }

    tracing::debug!(base_url = %config.llm.base_url, model = %config.llm.model, "LLM configured");
    let client = OllamaClient::new(config.llm).context("failed to build LLM client")?;
    Ok(AppState::new(Arc::new(client), config.agent))
}

async fn run(command: Commands, state: AppState) -> anyhow::Result<()> {
    match command {
        Commands::Ask { prompt, session } => ask(&state, &prompt.join(" "), session).await,
        Commands::Chat { session } => chat(&state, session).await,
        Commands::Tools => tools(&state).await,
        Commands::Serve { bind } => serve(state, &bind).await,
    }
}

fn session_id(session: Option<String>) -> SessionId {
    session.map_or_else(SessionId::new, SessionId::from_string)
}

async fn ask(state: &AppState, prompt: &str, session: Option<String>) -> anyhow::Result<()> {
    let answer = answer_once(state, prompt, session).await?;
    println!("{answer}");
    Ok(())
}

/// Final answer for one prompt; `""` after a diagnostic when the turn failed
async fn answer_once(state: &AppState, prompt: &str, session: Option<String>) -> anyhow::Result<String> {
    let agent = state.agent(&session_id(session)).await?;
    let outcome = agent.lock().await.process_query(prompt).await;

    Ok(outcome.map_or_else(
        || {
            eprintln!("Sorry, the model could not be reached. Please try again.");
            String::new()
        },
        |outcome| outcome.content,
    ))
}

async fn chat(state: &AppState, session: Option<String>) -> anyhow::Result<()> {
    let id = session_id(session);
    let agent = state.agent(&id).await?;
    println!("Session {id}. Type 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if matches!(prompt, "exit" | "quit") {
            break;
        }

        match agent.lock().await.process_query(prompt).await {
            Some(outcome) if !outcome.is_empty() => println!("{}\n", outcome.content),
            Some(_) => println!("(no answer)\n"),
            None => println!("Sorry, the model could not be reached. Please try again.\n"),
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn tools(state: &AppState) -> anyhow::Result<()> {
    let agent = state.agent(&SessionId::new()).await?;
    let agent = agent.lock().await;

    for tool in agent.tools().iter() {
        let origin = if tool.is_remote() { "provider" } else { "local" };
        println!("{:<24} [{origin}] {}", tool.name(), tool.description());
    }
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_handler))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/{name}/enable", post(enable_tool))
        .route("/api/tools/{name}/disable", post(disable_tool))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    match state.client.health_check().await {
        Ok(true) => tracing::info!(model = %state.client.model(), "✓ Connected to LLM backend"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ LLM backend not reachable - chat requests will fail");
            tracing::warn!("  Set LLM_BASE_URL or start Ollama: ollama serve");
        }
    }

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 agent server running on http://{}", bind);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                    - Health check");
    tracing::info!("  POST /api/chat                  - Send message");
    tracing::info!("  GET  /api/tools                 - List session tools");
    tracing::info!("  POST /api/tools/{{name}}/enable   - Enable a tool");
    tracing::info!("  POST /api/tools/{{name}}/disable  - Disable a tool");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::provider::ChatResponse;
    use agent_core::{AgentError, ChatMessage, LlmClient, Result, ToolCallRequest};
    use agent_runtime::AgentConfig;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct Scripted(Mutex<VecDeque<Result<ChatResponse>>>);

    #[async_trait]
    impl LlmClient for Scripted {
        async fn chat(&self, _messages: &[ChatMessage], _tools: &[Value]) -> Result<ChatResponse> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Transport("script exhausted".into())))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn app(script: Vec<Result<ChatResponse>>) -> (Router, AppState) {
        let client = Arc::new(Scripted(Mutex::new(script.into())));
        let state = AppState::new(client, AgentConfig::local_only());
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_chat_runs_tools_and_keeps_session() {
        let (app, state) = app(vec![
            Ok(ChatResponse::from_message(ChatMessage::assistant_with_calls(vec![
                ToolCallRequest::new("c1", "calculate", r#"{"expression": "2 + 2"}"#),
            ]))),
            Ok(ChatResponse::from_message(ChatMessage::assistant("2 + 2 = 4"))),
        ]);

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({"message": "2+2?", "session_id": "s1"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "2 + 2 = 4");
        assert_eq!(body["session_id"], "s1");
        assert_eq!(body["tools_used"], json!(["calculate"]));

        let agent = state.agents.get(&SessionId::from_string("s1")).await.unwrap();
        assert_eq!(agent.lock().await.history().len(), 2);
    }

    #[tokio::test]
    async fn test_chat_errors() {
        let (app, _) = app(vec![Err(AgentError::Transport("connection refused".into()))]);

        let (status, body) = send(&app, "POST", "/api/chat", Some(json!({"message": "hi"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "LLM_UNAVAILABLE");

        let (status, _) = send(&app, "POST", "/api/chat", Some(json!({"message": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ask_failure_yields_empty_answer() {
        let (_, state) = app(vec![
            Err(AgentError::Transport("connection refused".into())),
            Ok(ChatResponse::from_message(ChatMessage::assistant("back online"))),
        ]);

        let answer = answer_once(&state, "hi", Some("cli".into())).await.unwrap();
        assert_eq!(answer, "");
        let agent = state.agents.get(&SessionId::from_string("cli")).await.unwrap();
        assert!(agent.lock().await.history().is_empty());

        let answer = answer_once(&state, "hi again", Some("cli".into())).await.unwrap();
        assert_eq!(answer, "back online");
    }

    #[tokio::test]
    async fn test_tool_toggles_are_per_session() {
        let (app, _) = app(vec![]);

        let (status, body) = send(&app, "POST", "/api/tools/datetime/disable?session_id=a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], false);

        let (_, a) = send(&app, "GET", "/api/tools?session_id=a", None).await;
        let (_, b) = send(&app, "GET", "/api/tools?session_id=b", None).await;
        assert_eq!(a["tools"][0]["name"], "datetime");
        assert_eq!(a["tools"][0]["enabled"], false);
        assert_eq!(b["tools"][0]["enabled"], true);

        let (status, body) = send(&app, "POST", "/api/tools/ghost/enable?session_id=a", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "TOOL_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(vec![]);
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"], "scripted");
        assert_eq!(body["sessions"], 0);
    }
}
