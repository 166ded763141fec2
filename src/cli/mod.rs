//! CLI for colloquy.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::agent::{AgentRegistry, MultiAgentManager};
use crate::config::AppConfig;
use crate::error::{ColloquyError, Result};
use crate::provider::ProviderRegistry;

/// Conversational agent backend
#[derive(Parser, Debug)]
#[command(name = "colloquy", version, about = "Conversational agent backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Send one message to an agent
    Chat(ChatArgs),
    /// List available models per provider
    Models,
    /// List configured agents and their status
    Agents,
}

/// Arguments for `colloquy serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Bind address (defaults to HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port (defaults to PORT)
    #[arg(long)]
    pub port: Option<u16>,
}

/// Arguments for `colloquy chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Agent to talk to
    #[arg(short, long, default_value = "default")]
    pub agent: String,

    /// Session id (a new one is generated when omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// User id
    #[arg(short, long)]
    pub user: Option<String>,

    /// Provider override
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model override
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print the whole answer at once
    #[arg(long)]
    pub no_stream: bool,

    /// Message to send
    pub message: String,
}

/// Registries built from configuration.
pub struct Runtime {
    pub config: AppConfig,
    pub providers: Arc<ProviderRegistry>,
    pub agents: Arc<MultiAgentManager>,
}

/// Validate `config` and build the provider and agent registries.
///
/// Fails when no provider validates or no agent can be constructed.
pub async fn bootstrap(mut config: AppConfig) -> Result<Runtime> {
    config.validate()?;
    let providers = Arc::new(ProviderRegistry::from_config(&config));
    if providers.is_empty() {
        return Err(ColloquyError::Configuration(
            "no model provider passed validation".into(),
        ));
    }
    info!(
        providers = ?providers.list_providers(),
        default = ?providers.default_provider(),
        "providers registered"
    );

    let registry = Arc::new(AgentRegistry::new(providers.clone()));
    let agents = MultiAgentManager::new(config.agents.clone(), registry).await;
    agents.ensure_available()?;

    Ok(Runtime {
        config,
        providers,
        agents: Arc::new(agents),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_with_defaults() {
        let cli = Cli::try_parse_from(["colloquy", "chat", "hello"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.agent, "default");
                assert_eq!(args.message, "hello");
                assert!(args.session.is_none());
                assert!(!args.no_stream);
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_with_all_options() {
        let cli = Cli::try_parse_from([
            "colloquy",
            "chat",
            "--agent",
            "db",
            "--session",
            "s1",
            "--user",
            "u1",
            "--provider",
            "qwen",
            "--model",
            "qwen-max",
            "--no-stream",
            "how many users?",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.agent, "db");
                assert_eq!(args.session.as_deref(), Some("s1"));
                assert_eq!(args.user.as_deref(), Some("u1"));
                assert_eq!(args.provider.as_deref(), Some("qwen"));
                assert_eq!(args.model.as_deref(), Some("qwen-max"));
                assert!(args.no_stream);
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let cli = Cli::try_parse_from(["colloquy", "serve", "--port", "8080"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.port, Some(8080));
                assert!(args.host.is_none());
            }
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["colloquy"]).is_err());
        assert!(Cli::try_parse_from(["colloquy", "chat"]).is_err());
    }

    #[tokio::test]
    async fn bootstrap_without_providers_is_fatal() {
        let config = AppConfig::from_vars(Default::default());
        let err = bootstrap(config).await.err().unwrap();
        assert!(err.is_fatal_at_startup());
    }
}
