//! Plain conversational assistant with in-memory history.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::runtime::{open_sessions, AgentRuntime, ChainBuilder};
use super::{Agent, AgentConfig, AgentKind, ChatRequest, HistoryBackend, Locale};
use crate::chain::{ConversationChain, Runnable};
use crate::error::Result;
use crate::provider::ChatModel;
use crate::types::Message;

const SYSTEM_PROMPT_EN: &str = "You are a helpful assistant. Answer clearly and concisely.";
const SYSTEM_PROMPT_ZH: &str = "你是一个乐于助人的助手，请清晰、简洁地回答问题。";

pub struct GeneralAgent {
    runtime: AgentRuntime,
}

impl GeneralAgent {
    pub async fn new(config: &AgentConfig) -> Result<Self> {
        let sessions = open_sessions(config, HistoryBackend::Memory).await?;
        let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
            match config.locale {
                Locale::En => SYSTEM_PROMPT_EN,
                Locale::Zh => SYSTEM_PROMPT_ZH,
            }
            .to_string()
        });
        let build_chain: ChainBuilder =
            Arc::new(move |model: Arc<dyn ChatModel>| -> Arc<dyn Runnable> {
                Arc::new(ConversationChain::new(model, system_prompt.clone()))
            });

        Ok(Self {
            runtime: AgentRuntime::new(AgentKind::General, config, sessions, build_chain)?,
        })
    }
}

#[async_trait]
impl Agent for GeneralAgent {
    fn kind(&self) -> AgentKind {
        self.runtime.kind()
    }

    fn display_name(&self) -> &str {
        self.runtime.display_name()
    }

    async fn achat(&self, request: ChatRequest) -> Result<String> {
        self.runtime.achat(request).await
    }

    async fn astream_chat(&self, request: ChatRequest) -> Result<BoxStream<'static, String>> {
        self.runtime.astream_chat(request).await
    }

    async fn get_history(&self, session_id: &str, user_id: Option<&str>) -> Vec<Message> {
        self.runtime.get_history(session_id, user_id).await
    }

    async fn clear_history(&self, session_id: &str, user_id: Option<&str>) {
        self.runtime.clear_history(session_id, user_id).await
    }
}
