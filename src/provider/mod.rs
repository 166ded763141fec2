//! Chat model and provider adapter traits.
//!
//! A [`ProviderAdapter`] holds one provider's settings and builds
//! [`ChatModel`] handles for a concrete model name. The
//! [`registry::ProviderRegistry`] owns the validated adapters.

pub mod catalog;
pub mod http;
pub mod openai_compatible;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::ProviderSettings;
use crate::error::{ColloquyError, Result};
use crate::types::{Message, TextStreamDelta};

pub use catalog::{ProviderCatalog, ProviderDescriptor};
pub use openai_compatible::{OpenAiCompatibleAdapter, OpenAiCompatibleModel};
pub use registry::ProviderRegistry;

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Per-call settings layered over a provider's stored settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl ModelOverrides {
    /// Apply the overrides to a copy of `settings`.
    pub fn apply(&self, settings: &ProviderSettings) -> ProviderSettings {
        let mut merged = settings.clone();
        if let Some(ref key) = self.api_key {
            merged.api_key = key.clone();
        }
        if let Some(ref url) = self.base_url {
            merged.base_url = url.clone();
        }
        if let Some(max) = self.max_tokens {
            merged.max_tokens = max;
        }
        if let Some(temp) = self.temperature {
            merged.temperature = temp;
        }
        merged
    }
}

/// A resolved model handle.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider_name(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Tools bound to this handle.
    fn tools(&self) -> &[ToolDefinition] {
        &[]
    }

    /// Produce one reply for the given conversation.
    async fn invoke(&self, messages: &[Message]) -> Result<Message>;

    /// Produce the reply incrementally.
    async fn stream(
        &self,
        messages: &[Message],
    ) -> Result<BoxStream<'static, Result<TextStreamDelta>>>;

    /// A new handle that advertises `tools` on every call.
    fn bind_tools(&self, tools: Vec<ToolDefinition>) -> Arc<dyn ChatModel>;
}

/// One provider's configuration plus its model factory.
pub trait ProviderAdapter: Send + Sync {
    /// Registry key, e.g. `qwen`.
    fn name(&self) -> &str;

    /// Human-readable provider name.
    fn display_name(&self) -> &str;

    fn settings(&self) -> &ProviderSettings;

    /// Models this provider declares.
    fn list_models(&self) -> Vec<String>;

    /// Model used when neither the call nor the settings name one.
    fn default_model(&self) -> Option<&str> {
        None
    }

    /// A credential is present and at least one model is declared.
    fn validate_config(&self) -> bool {
        self.settings().has_credentials() && !self.list_models().is_empty()
    }

    /// Resolve the model name: explicit, then settings, then adapter default,
    /// then the first declared model.
    fn resolve_model_name(&self, model: Option<&str>) -> Result<String> {
        model
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| {
                let configured = &self.settings().model;
                (!configured.is_empty()).then(|| configured.clone())
            })
            .or_else(|| self.default_model().map(str::to_string))
            .or_else(|| self.list_models().into_iter().next())
            .ok_or_else(|| {
                ColloquyError::Configuration(format!(
                    "no model specified and provider '{}' has no default model",
                    self.name()
                ))
            })
    }

    /// Build a chat model for `model`, layering `overrides` over the stored settings.
    fn get_chat_model(
        &self,
        model: Option<&str>,
        overrides: &ModelOverrides,
    ) -> Result<Arc<dyn ChatModel>>;
}
