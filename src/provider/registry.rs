//! Provider registry with validation and default-provider fallback.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{ColloquyError, Result};

use super::catalog::ProviderCatalog;
use super::{ChatModel, ModelOverrides, ProviderAdapter};

/// Registry mapping provider names to validated adapters.
///
/// Built once at startup and shared by `Arc`; it is read-only afterwards.
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    /// Registration order, for stable listings.
    order: Vec<String>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            order: Vec::new(),
            default_provider: None,
        }
    }

    /// Register every configured provider the builtin catalog knows about.
    ///
    /// The configured default is honoured only when it validates; otherwise
    /// the first registered provider stays the default.
    pub fn from_config(config: &AppConfig) -> Self {
        let catalog = ProviderCatalog::builtin();
        let mut registry = Self::new();
        for settings in config.configured_providers() {
            let Some(adapter) = catalog.create_adapter(settings) else {
                warn!(provider = %settings.name, "no adapter for configured provider");
                continue;
            };
            let is_default = settings.name == config.default_provider;
            registry.register(settings.name.clone(), adapter, is_default);
        }
        registry
    }

    /// Register an adapter after validating it. Returns whether it was kept.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn ProviderAdapter>,
        is_default: bool,
    ) -> bool {
        let name = name.into();
        if !adapter.validate_config() {
            warn!(provider = %name, "provider configuration failed validation, skipping");
            return false;
        }

        if !self.adapters.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.adapters.insert(name.clone(), adapter);
        if is_default || self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        info!(
            provider = %name,
            default = ?self.default_provider,
            "registered model provider"
        );
        true
    }

    /// Look up a provider, falling back to the default for unknown or omitted names.
    pub fn get_provider(&self, name: Option<&str>) -> Option<Arc<dyn ProviderAdapter>> {
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            if let Some(adapter) = self.adapters.get(name) {
                return Some(adapter.clone());
            }
            warn!(provider = %name, "unknown provider, using default");
        }
        let default = self.default_provider.as_deref()?;
        self.adapters.get(default).cloned()
    }

    /// Build a chat model from the resolved provider.
    pub fn get_chat_model(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        overrides: &ModelOverrides,
    ) -> Result<Arc<dyn ChatModel>> {
        info!(provider = ?provider, model = ?model, "resolving chat model");
        let adapter = self.get_provider(provider).ok_or_else(|| {
            ColloquyError::ProviderNotFound(provider.unwrap_or("<default>").to_string())
        })?;
        adapter.get_chat_model(model, overrides)
    }

    /// Whether `name` is a registered provider.
    pub fn has_provider(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Registered provider names in registration order.
    pub fn list_providers(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Models of the named (or default) provider; empty when unresolvable.
    pub fn list_models(&self, name: Option<&str>) -> Vec<String> {
        self.get_provider(name)
            .map(|a| a.list_models())
            .unwrap_or_default()
    }

    /// Every registered provider's models.
    pub fn all_available_models(&self) -> BTreeMap<String, Vec<String>> {
        self.order
            .iter()
            .filter_map(|name| {
                self.adapters
                    .get(name)
                    .map(|a| (name.clone(), a.list_models()))
            })
            .collect()
    }

    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Display name for a provider; the capitalized key when unknown.
    pub fn display_name(&self, name: &str) -> String {
        match self.adapters.get(name) {
            Some(adapter) => adapter.display_name().to_string(),
            None => capitalize(name),
        }
    }

    /// Replace an unknown provider name with the default one.
    pub fn normalize_provider_name(&self, name: Option<&str>) -> Option<String> {
        match name {
            Some(n) if self.has_provider(n) => Some(n.to_string()),
            _ => self.default_provider.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.order)
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::types::{Message, TextStreamDelta};
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    struct StubModel {
        provider: String,
        model: String,
    }

    #[async_trait]
    impl ChatModel for StubModel {
        fn provider_name(&self) -> &str {
            &self.provider
        }
        fn model_id(&self) -> &str {
            &self.model
        }
        async fn invoke(&self, _messages: &[Message]) -> Result<Message> {
            Ok(Message::assistant("stub"))
        }
        async fn stream(
            &self,
            _messages: &[Message],
        ) -> Result<BoxStream<'static, Result<TextStreamDelta>>> {
            Err(ColloquyError::Stream("stub does not stream".into()))
        }
        fn bind_tools(&self, _tools: Vec<crate::provider::ToolDefinition>) -> Arc<dyn ChatModel> {
            Arc::new(StubModel {
                provider: self.provider.clone(),
                model: self.model.clone(),
            })
        }
    }

    struct StubAdapter {
        settings: ProviderSettings,
    }

    impl StubAdapter {
        fn arc(name: &str, api_key: &str) -> Arc<dyn ProviderAdapter> {
            Arc::new(StubAdapter {
                settings: ProviderSettings::new(name).with_api_key(api_key),
            })
        }
    }

    impl ProviderAdapter for StubAdapter {
        fn name(&self) -> &str {
            &self.settings.name
        }
        fn display_name(&self) -> &str {
            "Stub"
        }
        fn settings(&self) -> &ProviderSettings {
            &self.settings
        }
        fn list_models(&self) -> Vec<String> {
            vec!["m1".into(), "m2".into()]
        }
        fn get_chat_model(
            &self,
            model: Option<&str>,
            _overrides: &ModelOverrides,
        ) -> Result<Arc<dyn ChatModel>> {
            Ok(Arc::new(StubModel {
                provider: self.settings.name.clone(),
                model: self.resolve_model_name(model)?,
            }))
        }
    }

    #[test]
    fn invalid_adapter_is_excluded_even_when_declared_default() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.register("a", StubAdapter::arc("a", "k"), false));
        assert!(!registry.register("b", StubAdapter::arc("b", ""), true));

        assert_eq!(registry.list_providers(), vec!["a".to_string()]);
        assert_eq!(registry.default_provider(), Some("a"));
    }

    #[test]
    fn later_default_claim_wins() {
        let mut registry = ProviderRegistry::new();
        registry.register("a", StubAdapter::arc("a", "k"), false);
        registry.register("b", StubAdapter::arc("b", "k"), true);
        assert_eq!(registry.default_provider(), Some("b"));
    }

    #[test]
    fn unknown_provider_falls_back_to_default() {
        let mut registry = ProviderRegistry::new();
        registry.register("a", StubAdapter::arc("a", "k"), false);

        let model = registry
            .get_chat_model(Some("missing"), None, &ModelOverrides::default())
            .unwrap();
        assert_eq!(model.provider_name(), "a");
        assert_eq!(model.model_id(), "m1");
    }

    #[test]
    fn empty_registry_reports_provider_not_found() {
        let registry = ProviderRegistry::new();
        let result = registry.get_chat_model(None, None, &ModelOverrides::default());
        match result {
            Err(ColloquyError::ProviderNotFound(_)) => {}
            Err(e) => panic!("expected ProviderNotFound, got error: {e}"),
            Ok(_) => panic!("expected ProviderNotFound, got Ok"),
        }
        assert!(registry.list_models(None).is_empty());
    }

    #[test]
    fn listings_follow_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry.register("z", StubAdapter::arc("z", "k"), false);
        registry.register("a", StubAdapter::arc("a", "k"), false);

        assert_eq!(registry.list_providers(), vec!["z".to_string(), "a".to_string()]);
        let all = registry.all_available_models();
        assert_eq!(all["a"], vec!["m1".to_string(), "m2".to_string()]);
        assert_eq!(registry.display_name("z"), "Stub");
        assert_eq!(registry.display_name("nope"), "Nope");
    }

    #[test]
    fn normalize_replaces_unknown_names() {
        let mut registry = ProviderRegistry::new();
        registry.register("a", StubAdapter::arc("a", "k"), false);
        assert_eq!(registry.normalize_provider_name(Some("x")), Some("a".into()));
        assert_eq!(registry.normalize_provider_name(Some("a")), Some("a".into()));
        assert_eq!(registry.normalize_provider_name(None), Some("a".into()));
    }

    #[test]
    fn from_config_registers_configured_catalog_providers() {
        let vars = [
            ("QWEN_API_KEY", "sk-q"),
            ("DEEPSEEK_API_KEY", "sk-d"),
            ("DEFAULT_AI_PROVIDER", "deepseek"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = AppConfig::from_vars(vars);
        let registry = ProviderRegistry::from_config(&config);

        assert_eq!(
            registry.list_providers(),
            vec!["qwen".to_string(), "deepseek".to_string()]
        );
        assert_eq!(registry.default_provider(), Some("deepseek"));
    }
}
