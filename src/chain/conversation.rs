//! System prompt + history + model.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use super::{ChainInput, ChainOutput, Runnable};
use crate::error::Result;
use crate::provider::ChatModel;
use crate::types::Message;

/// Plain conversational chain.
pub struct ConversationChain {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
}

impl ConversationChain {
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    fn messages(&self, input: ChainInput) -> Vec<Message> {
        compose(&self.system_prompt, input.history, input.input)
    }
}

/// `[system?, ..history, user]`.
pub(crate) fn compose(system_prompt: &str, history: Vec<Message>, input: String) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !system_prompt.is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.extend(history);
    messages.push(Message::user(input));
    messages
}

/// Drop empty deltas and keep the text.
pub(crate) fn text_fragments(
    deltas: BoxStream<'static, Result<crate::types::TextStreamDelta>>,
) -> BoxStream<'static, Result<String>> {
    Box::pin(deltas.filter_map(|delta| async move {
        match delta {
            Ok(d) if d.text.is_empty() => None,
            Ok(d) => Some(Ok(d.text)),
            Err(e) => Some(Err(e)),
        }
    }))
}

#[async_trait]
impl Runnable for ConversationChain {
    async fn invoke(&self, input: ChainInput) -> Result<ChainOutput> {
        let messages = self.messages(input);
        debug!(
            provider = self.model.provider_name(),
            model = self.model.model_id(),
            messages = messages.len(),
            "conversation: calling model"
        );
        let reply = self.model.invoke(&messages).await?;
        Ok(ChainOutput::answer(reply.content))
    }

    async fn stream(&self, input: ChainInput) -> Result<BoxStream<'static, Result<String>>> {
        let messages = self.messages(input);
        let deltas = self.model.stream(&messages).await?;
        Ok(text_fragments(deltas))
    }
}
