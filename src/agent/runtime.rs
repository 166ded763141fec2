//! Shared agent machinery: model resolution, history wiring, and the
//! conversion of failed turns into the locale's apology.

use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use super::{AgentConfig, AgentKind, ChatRequest, HistoryBackend, Locale};
use crate::chain::{HistoryAwareInvoker, RunConfig, Runnable};
use crate::error::{ColloquyError, Result};
use crate::history::{
    CacheStore, DocumentStore, DocumentStoreOptions, HistoryKey, SessionHistoryRegistry,
    SharedStoreFactory,
};
use crate::provider::{ChatModel, ModelOverrides, ProviderRegistry};
use crate::types::Message;

/// Builds an agent's chain around a resolved model.
pub(crate) type ChainBuilder = Arc<dyn Fn(Arc<dyn ChatModel>) -> Arc<dyn Runnable> + Send + Sync>;

pub(crate) struct AgentRuntime {
    kind: AgentKind,
    display_name: String,
    locale: Locale,
    providers: Arc<ProviderRegistry>,
    sessions: Arc<SessionHistoryRegistry>,
    history_limit: Option<usize>,
    provider_name: Option<String>,
    model_name: Option<String>,
    build_chain: ChainBuilder,
    default_invoker: HistoryAwareInvoker,
}

impl AgentRuntime {
    /// Resolve the default model and build the default chain once.
    pub(crate) fn new(
        kind: AgentKind,
        config: &AgentConfig,
        sessions: Arc<SessionHistoryRegistry>,
        build_chain: ChainBuilder,
    ) -> Result<Self> {
        let providers = config.providers.clone().ok_or_else(|| {
            ColloquyError::Configuration(format!("{kind} agent has no provider registry"))
        })?;
        let model = providers.get_chat_model(
            config.provider_name.as_deref(),
            config.model_name.as_deref(),
            &ModelOverrides::default(),
        )?;
        info!(
            agent = %kind,
            provider = model.provider_name(),
            model = model.model_id(),
            "agent ready"
        );
        let default_invoker = HistoryAwareInvoker::new(build_chain(model), sessions.clone())
            .with_history_limit(config.history_limit);

        Ok(Self {
            kind,
            display_name: kind.display_name(config.locale).to_string(),
            locale: config.locale,
            providers,
            sessions,
            history_limit: config.history_limit,
            provider_name: config.provider_name.clone(),
            model_name: config.model_name.clone(),
            build_chain,
            default_invoker,
        })
    }

    pub(crate) fn kind(&self) -> AgentKind {
        self.kind
    }

    pub(crate) fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The default invoker, or one rebuilt for the turn's overrides.
    fn invoker_for(&self, request: &ChatRequest) -> Result<HistoryAwareInvoker> {
        if !request.has_overrides() {
            return Ok(self.default_invoker.clone());
        }
        let requested_provider = request.provider_name.as_deref().filter(|p| !p.is_empty());
        let provider = requested_provider.or(self.provider_name.as_deref());
        let model = request
            .model_name
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| {
                requested_provider
                    .is_none()
                    .then_some(self.model_name.as_deref())
                    .flatten()
            });
        debug!(agent = %self.kind, provider = ?provider, model = ?model, "rebuilding chain for overrides");
        let model = self
            .providers
            .get_chat_model(provider, model, &ModelOverrides::default())?;
        Ok(HistoryAwareInvoker::new((self.build_chain)(model), self.sessions.clone())
            .with_history_limit(self.history_limit))
    }

    fn run_config(request: &ChatRequest) -> Result<RunConfig> {
        let session_id = request
            .session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ColloquyError::Configuration("missing session id".into()))?;
        let mut config = RunConfig::session(session_id);
        config.user_id = request.user_id.clone();
        Ok(config)
    }

    pub(crate) async fn achat(&self, request: ChatRequest) -> Result<String> {
        let config = Self::run_config(&request)?;
        let result = match self.invoker_for(&request) {
            Ok(invoker) => invoker.invoke(request.message, &config).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(output) => Ok(output.answer),
            Err(e) => {
                error!(agent = %self.kind, error = %e, "chat turn failed");
                Ok(self.locale.apology().to_string())
            }
        }
    }

    pub(crate) async fn astream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, String>> {
        let config = Self::run_config(&request)?;
        let locale = self.locale;
        let kind = self.kind;
        let opened = match self.invoker_for(&request) {
            Ok(invoker) => invoker.stream(request.message, &config).await,
            Err(e) => Err(e),
        };

        match opened {
            Ok(mut fragments) => Ok(Box::pin(async_stream::stream! {
                while let Some(item) = fragments.next().await {
                    match item {
                        Ok(fragment) => yield fragment,
                        Err(e) => {
                            error!(agent = %kind, error = %e, "chat stream failed");
                            yield locale.apology().to_string();
                            break;
                        }
                    }
                }
            })),
            Err(e) => {
                error!(agent = %kind, error = %e, "chat stream could not start");
                Ok(Box::pin(stream::once(async move {
                    locale.apology().to_string()
                })))
            }
        }
    }

    pub(crate) async fn get_history(&self, session_id: &str, user_id: Option<&str>) -> Vec<Message> {
        match self.sessions.get_or_create(session_id).await {
            Ok(store) => store.list(&HistoryKey::new(session_id, user_id), None).await,
            Err(e) => {
                error!(agent = %self.kind, session_id, error = %e, "history unavailable");
                Vec::new()
            }
        }
    }

    pub(crate) async fn clear_history(&self, session_id: &str, user_id: Option<&str>) {
        match self.sessions.get_or_create(session_id).await {
            Ok(store) => store.clear(&HistoryKey::new(session_id, user_id)).await,
            Err(e) => error!(agent = %self.kind, session_id, error = %e, "history unavailable"),
        }
    }
}

/// Session registry for the configured backend, or `fallback` when unset.
///
/// A document backend without a connection string degrades to in-memory
/// history.
pub(crate) async fn open_sessions(
    config: &AgentConfig,
    fallback: HistoryBackend,
) -> Result<Arc<SessionHistoryRegistry>> {
    let backend = config.history_backend.unwrap_or(fallback);
    let registry = match backend {
        HistoryBackend::Memory => SessionHistoryRegistry::in_memory(),
        HistoryBackend::Document => match config.document_store_url.as_deref() {
            Some(url) => {
                let mut options = DocumentStoreOptions::with_connection_string(url);
                if let Some(table) = config.document_store_table.as_deref() {
                    options.table = table.to_string();
                }
                let store = DocumentStore::connect(options).await?;
                SessionHistoryRegistry::new(Arc::new(SharedStoreFactory::new(Arc::new(store))))
            }
            None => {
                warn!("no document store configured, keeping history in memory");
                SessionHistoryRegistry::in_memory()
            }
        },
        HistoryBackend::Cache => {
            let store = cache_store(config).await?;
            SessionHistoryRegistry::new(Arc::new(SharedStoreFactory::new(Arc::new(store))))
        }
    };
    debug!(backend = %backend, "history backend selected");
    Ok(Arc::new(registry))
}

#[cfg(feature = "redis")]
async fn cache_store(config: &AgentConfig) -> Result<CacheStore> {
    use crate::history::RedisBackend;

    match config.redis_url.as_deref() {
        Some(url) => Ok(CacheStore::new(Arc::new(RedisBackend::connect(url).await?))),
        None => {
            warn!("no redis url configured, using process-local cache store");
            Ok(CacheStore::local())
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn cache_store(_config: &AgentConfig) -> Result<CacheStore> {
    warn!("built without redis support, using process-local cache store");
    Ok(CacheStore::local())
}
