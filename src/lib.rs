//! colloquy: a conversational agent backend.
//!
//! Agents answer chat turns through chains wrapped in a
//! [`chain::HistoryAwareInvoker`], which loads and persists per-session
//! history from a pluggable [`history::HistoryStore`]. Models come from a
//! [`provider::ProviderRegistry`] of OpenAI-compatible providers.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use colloquy::prelude::*;
//!
//! # async fn example() -> colloquy::error::Result<()> {
//! let mut config = AppConfig::from_env();
//! config.validate()?;
//! let providers = Arc::new(ProviderRegistry::from_config(&config));
//! let registry = Arc::new(AgentRegistry::new(providers));
//! let agents = MultiAgentManager::new(config.agents.clone(), registry).await;
//!
//! let agent = agents.get_agent(Some("writing"))?;
//! let answer = agent.achat(ChatRequest::new("Help me outline a story", "chat-1")).await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod chain;
pub mod config;
pub mod error;
pub mod history;
pub mod prelude;
pub mod provider;
pub mod retrieval;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;
