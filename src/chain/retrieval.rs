//! Two-stage retrieval chain.
//!
//! 1. Condense the latest question against the history into a standalone
//!    query. Skipped when the history is empty: the question is used as is.
//! 2. Retrieve the top `k` documents for the query and answer with them
//!    stuffed into the system prompt.
//!
//! The system prompt may carry a `{context}` placeholder; without one the
//! documents are appended after it. With tools attached, the answer stage
//! runs as a [`ToolCallingChain`] and streams as a single fragment.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::debug;

use super::conversation::{compose, text_fragments};
use super::tool_loop::ToolCallingChain;
use super::{ChainInput, ChainOutput, Runnable};
use crate::error::Result;
use crate::provider::ChatModel;
use crate::retrieval::{Document, Retriever, DEFAULT_K};
use crate::tools::Tool;
use crate::types::Message;

pub const CONDENSE_PROMPT: &str = "Given the chat history and the user's latest question, \
which may reference context in the history, rewrite it as a standalone question that can be \
understood without the history. Do not answer the question. Return only the question.";

const CONTEXT_PLACEHOLDER: &str = "{context}";

pub struct RetrievalChain {
    model: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    k: usize,
    system_prompt: String,
    condense_prompt: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl RetrievalChain {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model,
            retriever,
            k: DEFAULT_K,
            system_prompt: system_prompt.into(),
            condense_prompt: CONDENSE_PROMPT.to_string(),
            tools: Vec::new(),
        }
    }

    /// Tools the answer stage may call.
    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    pub fn with_condense_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.condense_prompt = prompt.into();
        self
    }

    /// Standalone form of `input` given `history`.
    pub async fn condense(&self, input: &str, history: &[Message]) -> Result<String> {
        if history.is_empty() {
            return Ok(input.to_string());
        }
        let messages = compose(&self.condense_prompt, history.to_vec(), input.to_string());
        let reply = self.model.invoke(&messages).await?;
        let question = reply.content.trim();
        if question.is_empty() {
            Ok(input.to_string())
        } else {
            Ok(question.to_string())
        }
    }

    /// Retrieved documents plus the system prompt they were stuffed into.
    async fn retrieve(&self, input: &ChainInput) -> Result<(Vec<Document>, String)> {
        let query = self.condense(&input.input, &input.history).await?;
        let context = self.retriever.similarity_search(&query, self.k).await?;
        debug!(
            query = %query,
            documents = context.len(),
            "retrieval: documents selected"
        );
        let system = stuff_documents(&self.system_prompt, &context);
        Ok((context, system))
    }
}

/// Render `documents` into `system_prompt`.
pub fn stuff_documents(system_prompt: &str, documents: &[Document]) -> String {
    let context = documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    if system_prompt.contains(CONTEXT_PLACEHOLDER) {
        system_prompt.replace(CONTEXT_PLACEHOLDER, &context)
    } else if context.is_empty() {
        system_prompt.to_string()
    } else {
        format!("{system_prompt}\n\nContext:\n{context}")
    }
}

#[async_trait]
impl Runnable for RetrievalChain {
    async fn invoke(&self, input: ChainInput) -> Result<ChainOutput> {
        let (context, system) = self.retrieve(&input).await?;
        if !self.tools.is_empty() {
            let answer = ToolCallingChain::new(self.model.clone(), self.tools.clone(), system)
                .invoke(input)
                .await?;
            return Ok(ChainOutput { context, ..answer });
        }
        let messages = compose(&system, input.history, input.input);
        let reply = self.model.invoke(&messages).await?;
        Ok(ChainOutput {
            answer: reply.content,
            context,
            steps: Vec::new(),
        })
    }

    async fn stream(&self, input: ChainInput) -> Result<BoxStream<'static, Result<String>>> {
        if !self.tools.is_empty() {
            let output = self.invoke(input).await?;
            return Ok(Box::pin(futures::stream::once(async move { Ok(output.answer) })));
        }
        let (_, system) = self.retrieve(&input).await?;
        let messages = compose(&system, input.history, input.input);
        let deltas = self.model.stream(&messages).await?;
        Ok(text_fragments(deltas))
    }
}
