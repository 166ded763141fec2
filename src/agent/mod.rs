//! Conversational agents.
//!
//! An [`Agent`] answers [`ChatRequest`]s through a history-aware chain. The
//! kinds form a closed set ([`AgentKind`]); [`AgentRegistry`] builds and
//! caches them and [`MultiAgentManager`] owns the configured set.

pub mod database;
pub mod general;
pub mod manager;
pub mod registry;
mod runtime;
pub mod writing;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::Result;
use crate::provider::ProviderRegistry;
use crate::types::Message;
use crate::util::blocking::{block_on, BlockingStream};

pub use database::DatabaseAgent;
pub use general::GeneralAgent;
pub use manager::{AgentInfo, MultiAgentManager};
pub use registry::AgentRegistry;
pub use writing::WritingAgent;

/// The closed set of agent kinds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AgentKind {
    /// Retrieval-augmented writing assistant.
    Writing,
    /// Tool-calling SQL assistant.
    #[strum(serialize = "db", serialize = "database")]
    #[serde(rename = "db", alias = "database")]
    Db,
    /// Plain conversation.
    General,
}

impl AgentKind {
    /// Kind used when a requested kind is unknown.
    pub const FALLBACK: AgentKind = AgentKind::General;

    pub fn display_name(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (AgentKind::Writing, Locale::En) => "Writing Assistant",
            (AgentKind::Writing, Locale::Zh) => "写作助手",
            (AgentKind::Db, Locale::En) => "Database Assistant",
            (AgentKind::Db, Locale::Zh) => "数据库助手",
            (AgentKind::General, Locale::En) => "General Assistant",
            (AgentKind::General, Locale::Zh) => "通用助手",
        }
    }
}

/// Where an agent keeps conversation history.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HistoryBackend {
    Memory,
    /// Namespaced key-value store (Redis, or process-local without it).
    #[strum(serialize = "cache", serialize = "redis")]
    Cache,
    /// Table-per-collection document store.
    #[strum(serialize = "document", serialize = "sqlite")]
    Document,
}

/// Language of fixed user-facing text.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    /// Reply sent in place of an answer when a turn fails.
    pub fn apology(self) -> &'static str {
        match self {
            Locale::En => "Sorry, I ran into an error while processing your request.",
            Locale::Zh => "抱歉，我在处理您的问题时遇到了错误。",
        }
    }

    /// Name shown for an agent id with no known kind.
    pub fn fallback_agent_name(self, id: &str) -> String {
        match self {
            Locale::En => format!("{id} assistant"),
            Locale::Zh => format!("{id}助手"),
        }
    }
}

/// SearchAPI credentials for the web search tool.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchConfig {
    pub api_key: String,
    pub engine: String,
}

impl fmt::Debug for WebSearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSearchConfig")
            .field("api_key", &"[REDACTED]")
            .field("engine", &self.engine)
            .finish()
    }
}

/// Construction options shared by every agent kind.
///
/// Serialized form doubles as the agent cache key, so the provider
/// registry handle is skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Backend for this agent's history. Each kind has its own default.
    pub history_backend: Option<HistoryBackend>,
    /// Most recent messages fed back to the model per turn.
    pub history_limit: Option<usize>,
    pub system_prompt: Option<String>,
    pub provider_name: Option<String>,
    pub model_name: Option<String>,
    #[serde(default)]
    pub locale: Locale,
    pub retrieval_k: Option<usize>,
    pub knowledge_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub document_store_url: Option<String>,
    pub document_store_table: Option<String>,
    pub redis_url: Option<String>,
    pub web_search: Option<WebSearchConfig>,
    #[serde(skip)]
    pub providers: Option<Arc<ProviderRegistry>>,
}

impl AgentConfig {
    /// Cache key: the serialized configuration.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    pub fn with_providers(mut self, providers: Arc<ProviderRegistry>) -> Self {
        self.providers = Some(providers);
        self
    }
}

/// One conversational turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// Provider override for this turn.
    pub provider_name: Option<String>,
    /// Model override for this turn.
    pub model_name: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_provider(mut self, provider_name: impl Into<String>) -> Self {
        self.provider_name = Some(provider_name.into());
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    /// Whether the turn asks for a different provider or model.
    pub fn has_overrides(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.provider_name) || set(&self.model_name)
    }
}

/// A conversational agent.
///
/// Model and tool failures during a turn are answered with the locale's
/// apology instead of an error. Only a request without a session id fails.
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    fn display_name(&self) -> &str;

    async fn achat(&self, request: ChatRequest) -> Result<String>;

    /// Answer fragments in order. A failure mid-stream ends it with the
    /// apology as the last fragment.
    async fn astream_chat(&self, request: ChatRequest) -> Result<BoxStream<'static, String>>;

    /// Stored history for a session, oldest first.
    async fn get_history(&self, session_id: &str, user_id: Option<&str>) -> Vec<Message>;

    async fn clear_history(&self, session_id: &str, user_id: Option<&str>);

    /// Blocking [`Agent::achat`].
    fn chat(&self, request: ChatRequest) -> Result<String> {
        block_on(self.achat(request))?
    }

    /// Blocking [`Agent::astream_chat`].
    fn stream_chat(&self, request: ChatRequest) -> Result<BlockingStream<String>> {
        BlockingStream::open(async move {
            let fragments = self.astream_chat(request).await?;
            Ok(fragments.map(Ok).boxed())
        })
    }
}
