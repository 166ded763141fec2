//! Lazy session → store map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::memory::InMemoryStore;
use super::HistoryStore;
use crate::error::Result;

/// Builds the store for a session on first access.
#[async_trait]
pub trait HistoryStoreFactory: Send + Sync {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn HistoryStore>>;
}

/// A fresh [`InMemoryStore`] per session.
#[derive(Debug, Default)]
pub struct InMemoryFactory;

#[async_trait]
impl HistoryStoreFactory for InMemoryFactory {
    async fn create(&self, _session_id: &str) -> Result<Arc<dyn HistoryStore>> {
        Ok(Arc::new(InMemoryStore::new()))
    }
}

/// Hands every session the same store (a shared pool or connection).
pub struct SharedStoreFactory {
    store: Arc<dyn HistoryStore>,
}

impl SharedStoreFactory {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HistoryStoreFactory for SharedStoreFactory {
    async fn create(&self, _session_id: &str) -> Result<Arc<dyn HistoryStore>> {
        Ok(self.store.clone())
    }
}

/// Session id → store, created once and kept for the registry's lifetime.
pub struct SessionHistoryRegistry {
    factory: Arc<dyn HistoryStoreFactory>,
    stores: RwLock<HashMap<String, Arc<dyn HistoryStore>>>,
}

impl SessionHistoryRegistry {
    pub fn new(factory: Arc<dyn HistoryStoreFactory>) -> Self {
        Self {
            factory,
            stores: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryFactory))
    }

    /// The store for `session_id`, creating it on first access.
    ///
    /// Concurrent first accesses may each build a store; the first insert
    /// wins and the others are dropped.
    pub async fn get_or_create(&self, session_id: &str) -> Result<Arc<dyn HistoryStore>> {
        let existing = self.stores.read().get(session_id).cloned();
        if let Some(store) = existing {
            return Ok(store);
        }

        let created = self.factory.create(session_id).await?;
        let store = self
            .stores
            .write()
            .entry(session_id.to_string())
            .or_insert(created)
            .clone();
        debug!(session_id, "history store ready for session");
        Ok(store)
    }

    pub fn session_count(&self) -> usize {
        self.stores.read().len()
    }
}

impl fmt::Debug for SessionHistoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHistoryRegistry")
            .field("sessions", &self.session_count())
            .finish()
    }
}
