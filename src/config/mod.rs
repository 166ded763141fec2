//! Application configuration resolved once at startup.
//!
//! Values come from environment-style key/value input: [`AppConfig::from_env`]
//! reads the process environment (after loading `.env` if present), while
//! [`AppConfig::from_vars`] takes an explicit map so tests never touch the
//! real environment.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{AgentConfig, AgentKind, HistoryBackend, Locale, WebSearchConfig};
use crate::error::{ColloquyError, Result};
use crate::provider::catalog::ProviderCatalog;

/// Provider used when `DEFAULT_AI_PROVIDER` is unset.
pub const DEFAULT_PROVIDER: &str = "qwen";
/// Default `max_tokens` for every provider.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
/// Default sampling temperature for every provider.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Settings for one model provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl ProviderSettings {
    /// Settings with defaults and no credential.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: String::new(),
            base_url: String::new(),
            model: String::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("api_key", &if self.api_key.is_empty() { "" } else { ".." })
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Connection settings for the Redis-backed cache store.
#[derive(Debug, Clone, PartialEq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
    /// Full URL override (`REDIS_URL`).
    pub url: Option<String>,
}

impl RedisSettings {
    pub fn url(&self) -> String {
        if let Some(ref url) = self.url {
            return url.clone();
        }
        match self.password {
            Some(ref password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Layered application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub app_version: String,
    pub debug: bool,
    pub default_provider: String,
    /// Every provider in the builtin catalog, configured or not.
    pub providers: Vec<ProviderSettings>,
    pub redis: RedisSettings,
    pub document_store_url: Option<String>,
    pub document_store_table: String,
    pub max_history_messages: usize,
    pub max_message_length: usize,
    pub log_level: String,
    pub host: String,
    pub port: u16,
    /// Agents to build at startup, in configuration order.
    pub agents: Vec<(String, AgentConfig)>,
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit key/value map.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        let env = Vars(vars);
        let debug = env.parse_or("DEBUG", false);

        let providers = ProviderCatalog::builtin()
            .descriptors()
            .iter()
            .map(|d| {
                let prefix = d.key.to_uppercase();
                let settings = ProviderSettings {
                    name: d.key.to_string(),
                    api_key: env.get_or(&format!("{prefix}_API_KEY"), ""),
                    base_url: env.get_or(&format!("{prefix}_BASE_URL"), d.default_base_url),
                    model: env.get_or(&format!("{prefix}_MODEL"), d.default_model),
                    max_tokens: env.parse_or(&format!("{prefix}_MAX_TOKENS"), DEFAULT_MAX_TOKENS),
                    temperature: env
                        .parse_or(&format!("{prefix}_TEMPERATURE"), DEFAULT_TEMPERATURE),
                };
                debug!(provider = d.key, settings = ?settings, "resolved provider settings");
                settings
            })
            .collect();

        let redis = RedisSettings {
            host: env.get_or("REDIS_HOST", "localhost"),
            port: env.parse_or("REDIS_PORT", 6379),
            password: env.get("REDIS_PASSWORD"),
            db: env.parse_or("REDIS_DB", 0),
            url: env.get("REDIS_URL"),
        };

        let max_history_messages = env.parse_or("MAX_HISTORY_MESSAGES", 20);
        let document_store_url = env.get("DOCUMENT_STORE_URL");
        let document_store_table = env.get_or("DOCUMENT_STORE_TABLE", "message_store");

        let locale = env.parse_or("AGENT_LOCALE", Locale::En);
        let web_search = env.get("SEARCHAPI_API_KEY").map(|api_key| WebSearchConfig {
            api_key,
            engine: env.get_or("SEARCHAPI_ENGINE", "baidu"),
        });
        let agent_names = env.get_or("AGENTS", "writing,db");
        let agents = agent_names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                let prefix = format!("AGENT_{}", name.to_uppercase());
                let history_backend = env
                    .get(&format!("{prefix}_HISTORY_BACKEND"))
                    .and_then(|v| HistoryBackend::from_str(&v).ok());
                let config = AgentConfig {
                    history_backend,
                    history_limit: Some(max_history_messages),
                    system_prompt: env.get(&format!("{prefix}_SYSTEM_PROMPT")),
                    provider_name: env.get(&format!("{prefix}_PROVIDER")),
                    model_name: env.get(&format!("{prefix}_MODEL")),
                    locale,
                    retrieval_k: env.get(&format!("{prefix}_RETRIEVAL_K")).and_then(|v| v.parse().ok()),
                    knowledge_dir: env.get("KNOWLEDGE_DIR").map(PathBuf::from),
                    database_url: env.get("DB_SQL_URL"),
                    document_store_url: document_store_url.clone(),
                    document_store_table: Some(document_store_table.clone()),
                    redis_url: Some(redis.url()),
                    web_search: web_search.clone(),
                    providers: None,
                };
                (name.to_string(), config)
            })
            .collect();

        Self {
            app_name: env.get_or("APP_NAME", "colloquy"),
            app_version: env.get_or("APP_VERSION", env!("CARGO_PKG_VERSION")),
            debug,
            default_provider: env.get_or("DEFAULT_AI_PROVIDER", DEFAULT_PROVIDER),
            providers,
            redis,
            document_store_url,
            document_store_table,
            max_history_messages,
            max_message_length: env.parse_or("MAX_MESSAGE_LENGTH", 50),
            log_level: env.get_or("LOG_LEVEL", if debug { "DEBUG" } else { "INFO" }),
            host: env.get_or("HOST", "localhost"),
            port: env.parse_or("PORT", 9091),
            agents,
        }
    }

    /// Providers with a non-empty API key, in catalog order.
    pub fn configured_providers(&self) -> Vec<&ProviderSettings> {
        let configured: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.has_credentials())
            .collect();
        info!(
            providers = ?configured.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            "configured providers"
        );
        configured
    }

    /// Settings for a provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Require at least one configured provider and demote an unconfigured default.
    pub fn validate(&mut self) -> Result<()> {
        let first = self
            .configured_providers()
            .first()
            .map(|p| p.name.clone())
            .ok_or_else(|| {
                ColloquyError::Configuration(
                    "at least one AI provider API key must be configured".into(),
                )
            })?;

        let default_ok = self
            .provider(&self.default_provider)
            .is_some_and(ProviderSettings::has_credentials);
        if !default_ok {
            warn!(
                requested = %self.default_provider,
                fallback = %first,
                "default AI provider not configured, falling back to first configured provider"
            );
            self.default_provider = first;
        }
        Ok(())
    }

    /// Agent configurations keyed by kind, for callers that only need the kinds.
    pub fn agent_kinds(&self) -> Vec<Option<AgentKind>> {
        self.agents
            .iter()
            .map(|(name, _)| AgentKind::from_str(name).ok())
            .collect()
    }
}

/// Key/value lookup over the raw configuration input.
struct Vars(HashMap<String, String>);

impl Vars {
    fn get(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => match raw.to_lowercase().parse::<T>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(key, value = %raw, "ignoring unparseable configuration value");
                    default
                }
            },
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn provider_defaults_come_from_catalog() {
        let config = AppConfig::from_vars(vars(&[("QWEN_API_KEY", "sk-qwen")]));
        let qwen = config.provider("qwen").unwrap();
        assert_eq!(qwen.api_key, "sk-qwen");
        assert_eq!(
            qwen.base_url,
            "https://dashscope.aliyuncs.com/compatible-mode/v1"
        );
        assert_eq!(qwen.model, "qwen-turbo");
        assert_eq!(qwen.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(qwen.temperature, DEFAULT_TEMPERATURE);
    }

    #[test]
    fn provider_overrides_are_read_per_prefix() {
        let config = AppConfig::from_vars(vars(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_MAX_TOKENS", "2048"),
            ("OPENAI_TEMPERATURE", "0.2"),
        ]));
        let openai = config.provider("openai").unwrap();
        assert_eq!(openai.model, "gpt-4o");
        assert_eq!(openai.max_tokens, 2048);
        assert_eq!(openai.temperature, 0.2);
    }

    #[test]
    fn validate_demotes_unconfigured_default() {
        let mut config = AppConfig::from_vars(vars(&[
            ("DEFAULT_AI_PROVIDER", "openai"),
            ("DEEPSEEK_API_KEY", "sk-deepseek"),
        ]));
        config.validate().unwrap();
        assert_eq!(config.default_provider, "deepseek");
    }

    #[test]
    fn validate_fails_without_any_provider() {
        let mut config = AppConfig::from_vars(HashMap::new());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ColloquyError::Configuration(_)));
    }

    #[test]
    fn redis_url_includes_password_when_set() {
        let config = AppConfig::from_vars(vars(&[
            ("REDIS_HOST", "cache"),
            ("REDIS_PASSWORD", "secret"),
            ("REDIS_DB", "2"),
        ]));
        assert_eq!(config.redis.url(), "redis://:secret@cache:6379/2");
    }

    #[test]
    fn agents_default_to_writing_and_db() {
        let config = AppConfig::from_vars(HashMap::new());
        let names: Vec<_> = config.agents.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["writing", "db"]);
        assert_eq!(config.agents[0].1.history_limit, Some(20));
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let config = AppConfig::from_vars(vars(&[("PORT", "not-a-port"), ("DEBUG", "TRUE")]));
        assert_eq!(config.port, 9091);
        assert!(config.debug);
        assert_eq!(config.log_level, "DEBUG");
    }

    #[test]
    fn debug_output_hides_api_key() {
        let settings = ProviderSettings::new("qwen").with_api_key("sk-secret");
        assert!(!format!("{settings:?}").contains("sk-secret"));
    }
}
