//! Agent construction and caching.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{Agent, AgentConfig, AgentKind, DatabaseAgent, GeneralAgent, WritingAgent};
use crate::error::{ColloquyError, Result};
use crate::provider::ProviderRegistry;

type AgentConstructor = fn(AgentConfig) -> BoxFuture<'static, Result<Arc<dyn Agent>>>;

fn build_writing(config: AgentConfig) -> BoxFuture<'static, Result<Arc<dyn Agent>>> {
    async move { Ok(Arc::new(WritingAgent::new(&config).await?) as Arc<dyn Agent>) }.boxed()
}

fn build_database(config: AgentConfig) -> BoxFuture<'static, Result<Arc<dyn Agent>>> {
    async move { Ok(Arc::new(DatabaseAgent::new(&config).await?) as Arc<dyn Agent>) }.boxed()
}

fn build_general(config: AgentConfig) -> BoxFuture<'static, Result<Arc<dyn Agent>>> {
    async move { Ok(Arc::new(GeneralAgent::new(&config).await?) as Arc<dyn Agent>) }.boxed()
}

/// Kind → constructor.
fn constructors() -> &'static HashMap<AgentKind, AgentConstructor> {
    static TABLE: OnceLock<HashMap<AgentKind, AgentConstructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table: HashMap<AgentKind, AgentConstructor> = HashMap::new();
        table.insert(AgentKind::Writing, build_writing);
        table.insert(AgentKind::Db, build_database);
        table.insert(AgentKind::General, build_general);
        table
    })
}

/// Builds agents by kind and caches them by `(kind, serialized config)`.
pub struct AgentRegistry {
    providers: Arc<ProviderRegistry>,
    cache: RwLock<HashMap<(AgentKind, String), Arc<dyn Agent>>>,
}

impl AgentRegistry {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self {
            providers,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Kind for an agent type tag; unknown tags map to [`AgentKind::FALLBACK`].
    pub fn resolve_kind(agent_type: &str) -> AgentKind {
        AgentKind::from_str(agent_type.trim()).unwrap_or_else(|_| {
            warn!(
                agent_type,
                fallback = %AgentKind::FALLBACK,
                "unknown agent type, using fallback kind"
            );
            AgentKind::FALLBACK
        })
    }

    /// Kinds with a registered constructor.
    pub fn registered_kinds() -> Vec<AgentKind> {
        let mut kinds: Vec<_> = constructors().keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }

    /// The cached agent for this type and config, constructing it on a miss.
    ///
    /// The shared provider registry is injected when `config` carries none.
    pub async fn create(&self, agent_type: &str, config: &AgentConfig) -> Result<Arc<dyn Agent>> {
        let kind = Self::resolve_kind(agent_type);
        let key = (kind, config.cache_key());

        let cached = self.cache.read().get(&key).cloned();
        if let Some(agent) = cached {
            debug!(agent = %kind, "agent cache hit");
            return Ok(agent);
        }

        let constructor = constructors().get(&kind).copied().ok_or_else(|| {
            ColloquyError::AgentResolution(format!("no constructor registered for {kind}"))
        })?;
        let mut config = config.clone();
        if config.providers.is_none() {
            config.providers = Some(self.providers.clone());
        }

        let built = constructor(config).await?;
        let agent = self.cache.write().entry(key).or_insert(built).clone();
        info!(agent = %kind, "agent constructed");
        Ok(agent)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("providers", &self.providers)
            .field("cached", &self.cached_count())
            .finish()
    }
}
