//! Provider registration, fallback, and model resolution.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use colloquy::config::AppConfig;
use colloquy::provider::{ModelOverrides, ProviderRegistry};

use common::{ScriptedAdapter, ScriptedChatModel};

fn two_providers() -> ProviderRegistry {
    let model = ScriptedChatModel::new("m");
    let mut registry = ProviderRegistry::new();
    assert!(registry.register("a", Arc::new(ScriptedAdapter::new("a", model.clone())), false));
    assert!(!registry.register(
        "b",
        Arc::new(ScriptedAdapter::without_key("b", model.clone())),
        true
    ));
    registry
}

#[test]
fn invalid_provider_is_skipped_and_default_falls_back() {
    let registry = two_providers();
    assert_eq!(registry.list_providers(), vec!["a".to_string()]);
    assert_eq!(registry.default_provider(), Some("a"));
    assert!(!registry.has_provider("b"));

    let model = registry
        .get_chat_model(Some("b"), None, &ModelOverrides::default())
        .unwrap();
    assert_eq!(model.provider_name(), "a");
}

#[test]
fn explicit_default_wins_when_valid() {
    let model = ScriptedChatModel::new("m");
    let mut registry = ProviderRegistry::new();
    registry.register("a", Arc::new(ScriptedAdapter::new("a", model.clone())), false);
    registry.register("b", Arc::new(ScriptedAdapter::new("b", model.clone())), true);

    assert_eq!(registry.default_provider(), Some("b"));
    assert_eq!(registry.list_providers(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(registry.normalize_provider_name(Some("zzz")).as_deref(), Some("b"));
    assert_eq!(registry.normalize_provider_name(Some("a")).as_deref(), Some("a"));
    assert_eq!(registry.normalize_provider_name(None).as_deref(), Some("b"));
}

#[test]
fn model_name_resolution() {
    let registry = two_providers();
    let overrides = ModelOverrides::default();

    let explicit = registry
        .get_chat_model(Some("a"), Some("scripted-large"), &overrides)
        .unwrap();
    assert_eq!(explicit.model_id(), "scripted-large");

    let defaulted = registry.get_chat_model(None, None, &overrides).unwrap();
    assert_eq!(defaulted.model_id(), "scripted-small");
}

#[test]
fn empty_registry_cannot_resolve_models() {
    let registry = ProviderRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.default_provider().is_none());
    assert!(registry.list_models(None).is_empty());

    let err = registry
        .get_chat_model(None, None, &ModelOverrides::default())
        .err()
        .unwrap();
    assert!(err.is_fatal_at_startup());
}

#[test]
fn listings_cover_every_registered_provider() {
    let registry = two_providers();
    let all = registry.all_available_models();
    assert_eq!(all.len(), 1);
    assert_eq!(
        all["a"],
        vec!["scripted-small".to_string(), "scripted-large".to_string()]
    );
    assert_eq!(registry.list_models(Some("unknown")), all["a"]);
    assert_eq!(registry.display_name("a"), "Scripted");
    assert_eq!(registry.display_name("mystery"), "Mystery");
}

#[test]
fn registry_from_config_keeps_keyed_catalog_providers() {
    let mut config = AppConfig::from_vars(HashMap::from([
        ("OPENAI_API_KEY".to_string(), "sk-openai".to_string()),
        ("DEEPSEEK_API_KEY".to_string(), "sk-deep".to_string()),
        ("DEFAULT_AI_PROVIDER".to_string(), "deepseek".to_string()),
    ]));
    config.validate().unwrap();

    let registry = ProviderRegistry::from_config(&config);
    assert_eq!(
        registry.list_providers(),
        vec!["openai".to_string(), "deepseek".to_string()]
    );
    assert_eq!(registry.default_provider(), Some("deepseek"));
    assert_eq!(registry.display_name("openai"), "OpenAI");

    let model = registry
        .get_chat_model(Some("openai"), None, &ModelOverrides::default())
        .unwrap();
    assert_eq!(model.model_id(), "gpt-4o-mini");
}
