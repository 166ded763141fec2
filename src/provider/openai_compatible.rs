//! OpenAI Chat Completions compatible provider.
//!
//! Every builtin provider (Qwen via DashScope compatible mode, OpenAI,
//! DeepSeek) speaks this wire format; only the base URL, credential and
//! model list differ.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ProviderSettings;
use crate::error::{ColloquyError, Result};
use crate::types::{FinishReason, GenerationSettings, Message, Role, TextStreamDelta, ToolCall, Usage};
use crate::util::retry::RetryPolicy;

use super::catalog::ProviderDescriptor;
use super::http::{bearer_headers, parse_sse_data, shared_client, status_to_error, SseLineBuffer};
use super::{ChatModel, ModelOverrides, ProviderAdapter, ToolDefinition};

/// A model handle bound to one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleModel {
    provider: String,
    model: String,
    api_key: String,
    base_url: String,
    settings: GenerationSettings,
    tools: Vec<ToolDefinition>,
    retry: RetryPolicy,
}

impl OpenAiCompatibleModel {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            settings: GenerationSettings::default(),
            tools: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request_body(&self, messages: &[Message], stream: bool) -> Value {
        let messages = messages.iter().map(message_to_openai).collect::<Vec<_>>();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(max) = self.settings.max_tokens {
                obj.insert("max_tokens".into(), max.into());
            }
            if let Some(temp) = self.settings.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if let Some(top_p) = self.settings.top_p {
                obj.insert("top_p".into(), top_p.into());
            }
            if let Some(ref stops) = self.settings.stop_sequences {
                obj.insert("stop".into(), json!(stops));
            }
            if let Some(ref user) = self.settings.user {
                obj.insert("user".into(), user.clone().into());
            }
            if !self.tools.is_empty() {
                let tool_defs: Vec<Value> = self
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
            }
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = self.endpoint();
        self.retry
            .execute(|| async {
                let resp = shared_client()
                    .post(&url)
                    .headers(bearer_headers(&self.api_key))
                    .json(body)
                    .send()
                    .await?;

                let status = resp.status().as_u16();
                if !resp.status().is_success() {
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(status_to_error(status, &body_text));
                }
                Ok(resp)
            })
            .await
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleModel {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        let body = self.build_request_body(messages, false);
        debug!(provider = %self.provider, model = %self.model, "chat completion");

        let data: ChatResponse = self.send(&body).await?.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ColloquyError::api(200, "No choices in chat completion response"))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments)),
            })
            .collect();

        let text = choice.message.content.unwrap_or_default();
        let reply = if tool_calls.is_empty() {
            Message::assistant(text)
        } else {
            Message::assistant_with_tool_calls(text, tool_calls)
        };

        let mut metadata = json!({ "model": self.model });
        if let Some(reason) = choice.finish_reason.as_deref().and_then(parse_finish_reason) {
            metadata["finish_reason"] = json!(reason);
        }
        if let Some(usage) = data.usage.map(Usage::from) {
            metadata["usage"] = json!(usage);
        }
        Ok(reply.with_metadata(metadata))
    }

    async fn stream(
        &self,
        messages: &[Message],
    ) -> Result<BoxStream<'static, Result<TextStreamDelta>>> {
        let body = self.build_request_body(messages, true);
        debug!(provider = %self.provider, model = %self.model, "chat completion stream");

        let byte_stream = self.send(&body).await?.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = SseLineBuffer::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ColloquyError::Network(e));
                        break;
                    }
                };

                for line in buffer.push(&chunk) {
                    if line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = parse_sse_data(&line) else {
                        continue;
                    };
                    // skip unparseable chunks
                    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
                        continue;
                    };
                    let usage = chunk.usage.map(Usage::from);
                    match chunk.choices.into_iter().next() {
                        Some(choice) => {
                            yield Ok(TextStreamDelta {
                                text: choice.delta.content.unwrap_or_default(),
                                finish_reason: choice
                                    .finish_reason
                                    .as_deref()
                                    .and_then(parse_finish_reason),
                                usage,
                            });
                        }
                        None if usage.is_some() => {
                            yield Ok(TextStreamDelta {
                                text: String::new(),
                                finish_reason: None,
                                usage,
                            });
                        }
                        None => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn bind_tools(&self, tools: Vec<ToolDefinition>) -> Arc<dyn ChatModel> {
        Arc::new(Self {
            tools,
            ..self.clone()
        })
    }
}

/// Adapter for a catalog provider speaking the OpenAI-compatible protocol.
pub struct OpenAiCompatibleAdapter {
    descriptor: ProviderDescriptor,
    settings: ProviderSettings,
    retry: RetryPolicy,
}

impl OpenAiCompatibleAdapter {
    pub fn new(descriptor: ProviderDescriptor, settings: ProviderSettings) -> Self {
        Self {
            descriptor,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn display_name(&self) -> &str {
        self.descriptor.display_name
    }

    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn list_models(&self) -> Vec<String> {
        self.descriptor.models.iter().map(|m| m.to_string()).collect()
    }

    fn default_model(&self) -> Option<&str> {
        Some(self.descriptor.default_model)
    }

    fn get_chat_model(
        &self,
        model: Option<&str>,
        overrides: &ModelOverrides,
    ) -> Result<Arc<dyn ChatModel>> {
        let model_name = self.resolve_model_name(model)?;
        let merged = overrides.apply(&self.settings);
        let base_url = if merged.base_url.is_empty() {
            self.descriptor.default_base_url.to_string()
        } else {
            merged.base_url.clone()
        };

        debug!(provider = %merged.name, model = %model_name, "building chat model");

        let settings = GenerationSettings::builder()
            .max_tokens(merged.max_tokens)
            .temperature(merged.temperature)
            .build();
        Ok(Arc::new(
            OpenAiCompatibleModel::new(merged.name, model_name, merged.api_key, base_url)
                .with_settings(settings)
                .with_retry(self.retry.clone()),
        ))
    }
}

fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn message_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content,
        }),
        Role::Assistant if msg.has_tool_calls() => {
            let tool_calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({
                "role": "assistant",
                "content": if msg.content.is_empty() { Value::Null } else { Value::String(msg.content.clone()) },
                "tool_calls": tool_calls,
            })
        }
        role => json!({ "role": role.to_string(), "content": msg.content }),
    }
}

// Wire types (internal)

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
