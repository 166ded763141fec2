//! Convenience re-exports for common use.

pub use crate::agent::{
    Agent, AgentConfig, AgentKind, AgentRegistry, ChatRequest, HistoryBackend, Locale,
    MultiAgentManager,
};
pub use crate::chain::{ChainInput, ChainOutput, HistoryAwareInvoker, RunConfig, Runnable};
pub use crate::config::AppConfig;
pub use crate::error::{ColloquyError, Result};
pub use crate::history::{HistoryKey, HistoryStore, SessionHistoryRegistry};
pub use crate::provider::{ChatModel, ModelOverrides, ProviderAdapter, ProviderRegistry};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments};
pub use crate::types::{Message, Role, TextStreamDelta};
