//! colloquy binary entry point.

use std::io::Write;

use clap::Parser;
use colloquy::agent::ChatRequest;
use colloquy::cli::{bootstrap, ChatArgs, Cli, Commands, Runtime, ServeArgs};
use colloquy::config::AppConfig;
use colloquy::error::Result;
use colloquy::server::{self, AppState};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    init_tracing(&config.log_level);

    let result = match bootstrap(config).await {
        Ok(runtime) => match cli.command {
            Commands::Serve(args) => handle_serve(runtime, args).await,
            Commands::Chat(args) => handle_chat(runtime, args).await,
            Commands::Models => {
                handle_models(&runtime);
                Ok(())
            }
            Commands::Agents => {
                handle_agents(&runtime);
                Ok(())
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "fatal error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL`.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn handle_serve(runtime: Runtime, args: ServeArgs) -> Result<()> {
    let host = args.host.unwrap_or_else(|| runtime.config.host.clone());
    let port = args.port.unwrap_or(runtime.config.port);
    let state = AppState::new(runtime.agents, runtime.providers);
    server::serve(state, &host, port).await
}

async fn handle_chat(runtime: Runtime, args: ChatArgs) -> Result<()> {
    let agent = runtime.agents.get_agent(Some(args.agent.as_str()))?;
    let session = args
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = ChatRequest {
        message: args.message,
        session_id: Some(session.clone()),
        user_id: args.user,
        provider_name: args.provider,
        model_name: args.model,
    };

    if args.no_stream {
        println!("{}", agent.achat(request).await?);
    } else {
        let mut fragments = agent.astream_chat(request).await?;
        let mut stdout = std::io::stdout();
        while let Some(fragment) = fragments.next().await {
            print!("{fragment}");
            let _ = stdout.flush();
        }
        println!();
    }
    eprintln!("session: {session}");
    Ok(())
}

fn handle_models(runtime: &Runtime) {
    for (provider, models) in runtime.providers.all_available_models() {
        let marker = if runtime.providers.default_provider() == Some(provider.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!(
            "{} [{provider}]{marker}",
            runtime.providers.display_name(&provider)
        );
        for model in models {
            println!("  {model}");
        }
    }
}

fn handle_agents(runtime: &Runtime) {
    let available = runtime.agents.available_agents();
    for info in runtime.agents.agent_details() {
        let status = if available.contains(&info.id) {
            "available".to_string()
        } else {
            format!(
                "unavailable: {}",
                runtime.agents.failure(&info.id).unwrap_or("unknown error")
            )
        };
        println!("{:<12} {:<20} {status}", info.id, info.name);
    }
}
