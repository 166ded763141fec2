//! Retrieval-augmented writing assistant.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::{info, warn};

use super::runtime::{open_sessions, AgentRuntime, ChainBuilder};
use super::{Agent, AgentConfig, AgentKind, ChatRequest, HistoryBackend, Locale};
use crate::chain::{RetrievalChain, Runnable};
use crate::error::Result;
use crate::provider::ChatModel;
use crate::retrieval::{KeywordRetriever, Retriever, DEFAULT_K};
use crate::tools::{Tool, WebSearchTool};
use crate::types::Message;

const SYSTEM_PROMPT_EN: &str = "You are a professional novelist with extensive writing \
experience and a record of mentoring new authors. Guide the user to describe their content, \
setting and ideas, and give matching advice. Break complex techniques into three practical \
steps, diagnose passages with annotated revisions, and produce sample writing suited to web \
fiction platforms. Answer using the retrieved content below. If it does not cover the \
question, decide whether a web search is needed.";

const SYSTEM_PROMPT_ZH: &str = "你是一位专业的小说作者，有丰富的小说经验和指导新人写小说经验。\
引导用户描述内容、设定以及想法，给出相对应的指导。\
核心能力：教学指导，将复杂技巧拆解为三步实操法；文本分析，诊断并给出带注释的修改示范；\
创作示范，生成符合网文平台特性的内容。\
你要用下面检索器检索出来的内容回答问题。如果不知道的话，就自行判断是否要通过工具进行网络查询。";

const CONDENSE_PROMPT_ZH: &str = "给你历史聊天记录以及用户最新提出的问题。\
结合聊天记录中的上下文，把问题改写成一个独立的问题。\
不要回答这个问题，直接返回改写后的问题。";

pub struct WritingAgent {
    runtime: AgentRuntime,
}

impl WritingAgent {
    /// History defaults to the document store.
    pub async fn new(config: &AgentConfig) -> Result<Self> {
        let retriever: Arc<dyn Retriever> = match config.knowledge_dir.as_deref() {
            Some(dir) => {
                let retriever = KeywordRetriever::from_dir(dir)?;
                info!(dir = %dir.display(), chunks = retriever.len(), "knowledge base loaded");
                Arc::new(retriever)
            }
            None => {
                warn!("no knowledge directory configured, retrieval returns nothing");
                Arc::new(KeywordRetriever::default())
            }
        };
        Self::with_retriever(config, retriever).await
    }

    /// Build over an explicit retriever.
    pub async fn with_retriever(config: &AgentConfig, retriever: Arc<dyn Retriever>) -> Result<Self> {
        let sessions = open_sessions(config, HistoryBackend::Document).await?;
        let tools: Vec<Arc<dyn Tool>> = config
            .web_search
            .iter()
            .map(|search| {
                Arc::new(WebSearchTool::new(search.api_key.clone()).with_engine(search.engine.clone()))
                    as Arc<dyn Tool>
            })
            .collect();

        let locale = config.locale;
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| default_prompt(locale).to_string());
        let k = config.retrieval_k.unwrap_or(DEFAULT_K);

        let build_chain: ChainBuilder = Arc::new(move |model: Arc<dyn ChatModel>| -> Arc<dyn Runnable> {
            let mut chain = RetrievalChain::new(model, retriever.clone(), system_prompt.clone())
                .with_k(k)
                .with_tools(tools.clone());
            if locale == Locale::Zh {
                chain = chain.with_condense_prompt(CONDENSE_PROMPT_ZH);
            }
            Arc::new(chain)
        });

        Ok(Self {
            runtime: AgentRuntime::new(AgentKind::Writing, config, sessions, build_chain)?,
        })
    }
}

fn default_prompt(locale: Locale) -> &'static str {
    match locale {
        Locale::En => SYSTEM_PROMPT_EN,
        Locale::Zh => SYSTEM_PROMPT_ZH,
    }
}

#[async_trait]
impl Agent for WritingAgent {
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
