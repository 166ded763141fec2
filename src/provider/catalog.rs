//! Builtin provider table.

use std::sync::{Arc, OnceLock};

use crate::config::ProviderSettings;

use super::openai_compatible::OpenAiCompatibleAdapter;
use super::ProviderAdapter;

/// Static description of an OpenAI-compatible provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub key: &'static str,
    pub display_name: &'static str,
    pub default_base_url: &'static str,
    pub default_model: &'static str,
    pub models: &'static [&'static str],
}

/// The set of providers this crate knows how to build.
#[derive(Debug)]
pub struct ProviderCatalog {
    descriptors: Vec<ProviderDescriptor>,
}

static BUILTIN: OnceLock<ProviderCatalog> = OnceLock::new();

impl ProviderCatalog {
    /// The builtin table, computed once.
    pub fn builtin() -> &'static ProviderCatalog {
        BUILTIN.get_or_init(|| ProviderCatalog {
            descriptors: vec![
                ProviderDescriptor {
                    key: "qwen",
                    display_name: "通义千问",
                    default_base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
                    default_model: "qwen-turbo",
                    models: &["qwen-turbo", "qwen-plus", "qwen-max"],
                },
                ProviderDescriptor {
                    key: "openai",
                    display_name: "OpenAI",
                    default_base_url: "https://api.openai.com/v1",
                    default_model: "gpt-4o-mini",
                    models: &["gpt-4o-mini", "gpt-4o", "gpt-4.1"],
                },
                ProviderDescriptor {
                    key: "deepseek",
                    display_name: "DeepSeek",
                    default_base_url: "https://api.deepseek.com/v1",
                    default_model: "deepseek-chat",
                    models: &["deepseek-chat", "deepseek-reasoner"],
                },
            ],
        })
    }

    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, key: &str) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    /// Build the adapter for `settings.name`, if the catalog knows it.
    pub fn create_adapter(&self, settings: &ProviderSettings) -> Option<Arc<dyn ProviderAdapter>> {
        let descriptor = self.get(&settings.name)?;
        Some(Arc::new(OpenAiCompatibleAdapter::new(
            *descriptor,
            settings.clone(),
        )))
    }
}
