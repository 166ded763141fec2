//! Shared test helpers and a scripted chat model.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;

use colloquy::config::ProviderSettings;
use colloquy::error::{ColloquyError, Result};
use colloquy::provider::{
    ChatModel, ModelOverrides, ProviderAdapter, ProviderRegistry, ToolDefinition,
};
use colloquy::types::{Message, TextStreamDelta, ToolCall};

/// One queued reply.
#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Fail(String),
    /// Stream `prefix`, then fail.
    BreakAfter(String),
}

#[derive(Default)]
struct Script {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<Vec<Message>>>,
    models: Mutex<Vec<String>>,
}

/// A chat model that replays queued replies and records every request.
///
/// Handles returned by `bind_tools` share the same queue. With an empty
/// queue the model echoes the last user message.
#[derive(Clone)]
pub struct ScriptedChatModel {
    provider: String,
    model_id: String,
    tools: Vec<ToolDefinition>,
    script: Arc<Script>,
}

impl ScriptedChatModel {
    pub fn new(model_id: &str) -> Self {
        Self {
            provider: "scripted".to_string(),
            model_id: model_id.to_string(),
            tools: Vec::new(),
            script: Arc::new(Script::default()),
        }
    }

    fn with_model_id(&self, model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            ..self.clone()
        }
    }

    fn push(&self, reply: Scripted) {
        self.script.replies.lock().unwrap().push_back(reply);
    }

    /// Queue a text reply.
    pub fn queue_response(&self, text: &str) {
        self.push(Scripted::Text(text.to_string()));
    }

    /// Queue a reply requesting one tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.push(Scripted::ToolCalls(vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        }]));
    }

    /// Queue a provider failure.
    pub fn queue_failure(&self, message: &str) {
        self.push(Scripted::Fail(message.to_string()));
    }

    /// Queue a stream that yields `prefix` and then errors.
    pub fn queue_broken_stream(&self, prefix: &str) {
        self.push(Scripted::BreakAfter(prefix.to_string()));
    }

    /// Every message list the model was called with, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.script.requests.lock().unwrap().clone()
    }

    /// Model id of every call, oldest first.
    pub fn models_called(&self) -> Vec<String> {
        self.script.models.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Vec<Message> {
        self.requests().pop().unwrap_or_default()
    }

    fn next(&self, messages: &[Message]) -> Scripted {
        self.script.requests.lock().unwrap().push(messages.to_vec());
        self.script.models.lock().unwrap().push(self.model_id.clone());
        self.script
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == colloquy::types::Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Scripted::Text(format!("echo: {last_user}"))
            })
    }
}

/// Split text into 4-char deltas.
fn chunks(text: &str) -> Vec<Result<TextStreamDelta>> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(4)
        .map(|c| Ok(TextStreamDelta::text(c.iter().collect::<String>())))
        .collect()
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        match self.next(messages) {
            Scripted::Text(text) => Ok(Message::assistant(text)),
            Scripted::ToolCalls(calls) => Ok(Message::assistant_with_tool_calls("", calls)),
            Scripted::Fail(message) | Scripted::BreakAfter(message) => {
                Err(ColloquyError::api(500, message))
            }
        }
    }

    async fn stream(
        &self,
        messages: &[Message],
    ) -> Result<BoxStream<'static, Result<TextStreamDelta>>> {
        let items = match self.next(messages) {
            Scripted::Text(text) => chunks(&text),
            Scripted::ToolCalls(_) => Vec::new(),
            Scripted::Fail(message) => return Err(ColloquyError::api(500, message)),
            Scripted::BreakAfter(prefix) => {
                let mut items = chunks(&prefix);
                items.push(Err(ColloquyError::Stream("connection reset".into())));
                items
            }
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn bind_tools(&self, tools: Vec<ToolDefinition>) -> Arc<dyn ChatModel> {
        Arc::new(Self {
            tools,
            ..self.clone()
        })
    }
}

/// Adapter handing out the shared scripted model.
pub struct ScriptedAdapter {
    name: String,
    settings: ProviderSettings,
    models: Vec<String>,
    model: ScriptedChatModel,
}

impl ScriptedAdapter {
    pub fn new(name: &str, model: ScriptedChatModel) -> Self {
        Self {
            name: name.to_string(),
            settings: ProviderSettings::new(name).with_api_key("test-key"),
            models: vec!["scripted-small".to_string(), "scripted-large".to_string()],
            model,
        }
    }

    /// Adapter without a credential; fails validation.
    pub fn without_key(name: &str, model: ScriptedChatModel) -> Self {
        Self {
            settings: ProviderSettings::new(name),
            ..Self::new(name, model)
        }
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        "Scripted"
    }

    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn get_chat_model(
        &self,
        model: Option<&str>,
        _overrides: &ModelOverrides,
    ) -> Result<Arc<dyn ChatModel>> {
        let resolved = self.resolve_model_name(model)?;
        let mut handle = self.model.with_model_id(&resolved);
        handle.provider = self.name.clone();
        Ok(Arc::new(handle))
    }
}

/// A registry whose only (default) provider is `scripted`.
pub fn registry_with(model: &ScriptedChatModel) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    registry.register(
        "scripted",
        Arc::new(ScriptedAdapter::new("scripted", model.clone())),
        true,
    );
    Arc::new(registry)
}
