use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// toolloop - a tool-calling LLM agent
#[derive(Parser, Debug)]
#[command(name = "agent")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Model identifier sent with every request
    #[arg(long, global = true, env = "LLM_MODEL")]
    pub model: Option<String>,

    /// Tool provider file
    #[arg(long, global = true, value_name = "FILE", env = "AGENT_PROVIDERS")]
    pub providers: Option<PathBuf>,

    /// Skip tool providers entirely
    #[arg(long, global = true, default_value = "false")]
    pub no_providers: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a single prompt and exit
    Ask {
        /// Prompt text; multiple words are joined with spaces
        #[arg(value_name = "PROMPT", required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Session id used for this agent instance
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },

    /// Interactive conversation on stdin/stdout
    Chat {
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },

    /// List the tools an agent would start with
    Tools,

    /// Serve the HTTP API
    Serve {
        /// Listen address
        #[arg(long, value_name = "ADDR", env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
        bind: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_joins_words() {
        let cli = Cli::try_parse_from(["agent", "ask", "what", "time", "is", "it", "--session", "s1"])
            .unwrap();
        match cli.command {
            Commands::Ask { prompt, session } => {
                assert_eq!(prompt.join(" "), "what time is it");
                assert_eq!(session.as_deref(), Some("s1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_ask_requires_prompt() {
        assert!(Cli::try_parse_from(["agent", "ask"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["agent", "tools", "--no-providers", "--model", "qwen2.5"])
            .unwrap();
        assert!(cli.no_providers);
        assert_eq!(cli.model.as_deref(), Some("qwen2.5"));
        assert!(matches!(cli.command, Commands::Tools));
    }
}
