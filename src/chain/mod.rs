//! Runnable chains and the history-aware invoker that wraps them.

pub mod conversation;
pub mod invoker;
pub mod retrieval;
pub mod tool_loop;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::retrieval::Document;
use crate::types::Message;

pub use conversation::ConversationChain;
pub use invoker::HistoryAwareInvoker;
pub use retrieval::RetrievalChain;
pub use tool_loop::{ToolCallingChain, MAX_TOOL_ITERATIONS};

/// Input to a chain: the new user text plus the history slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainInput {
    pub input: String,
    pub history: Vec<Message>,
}

impl ChainInput {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Result of a chain call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutput {
    pub answer: String,
    /// Documents the answer was grounded on, if any.
    pub context: Vec<Document>,
    /// Intermediate tool-call and tool-result messages, if any.
    pub steps: Vec<Message>,
}

impl ChainOutput {
    pub fn answer(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Self::default()
        }
    }
}

/// Per-call configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl RunConfig {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// A composable unit that turns input plus history into an answer.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn invoke(&self, input: ChainInput) -> Result<ChainOutput>;

    /// Answer fragments as they are produced. Defaults to one fragment
    /// holding the whole answer.
    async fn stream(&self, input: ChainInput) -> Result<BoxStream<'static, Result<String>>> {
        let output = self.invoke(input).await?;
        Ok(Box::pin(stream::once(async move { Ok(output.answer) })))
    }
}
