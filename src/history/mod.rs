//! Session-scoped conversation history.
//!
//! Every backend implements [`HistoryStore`] over a message log keyed by
//! [`HistoryKey`]. Implementations supply the fallible `try_*` operations;
//! the provided `append`/`list`/`clear` wrappers log backend failures and
//! degrade to a no-op or an empty log, so a storage outage never fails a
//! conversation turn.

pub mod cache;
pub mod document;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod registry;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::Result;
use crate::types::Message;

pub use cache::{CacheStore, LocalNamespaceBackend, Namespace, NamespaceBackend, StoredItem};
pub use document::{DocumentStore, DocumentStoreOptions};
pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use registry::{HistoryStoreFactory, InMemoryFactory, SessionHistoryRegistry, SharedStoreFactory};

/// User id used when a caller does not supply one.
pub const DEFAULT_USER_ID: &str = "default_user";

/// Identity of one message log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub user_id: String,
    pub session_id: String,
}

impl HistoryKey {
    pub fn new(session_id: impl Into<String>, user_id: Option<&str>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id
                .filter(|u| !u.is_empty())
                .unwrap_or(DEFAULT_USER_ID)
                .to_string(),
        }
    }

    /// Key for `session_id` under the default user.
    pub fn session(session_id: impl Into<String>) -> Self {
        Self::new(session_id, None)
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_id)
    }
}

/// Ordered, append-only message log storage.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Backend label for logs.
    fn backend(&self) -> &'static str;

    async fn try_append(&self, key: &HistoryKey, message: Message) -> Result<()>;

    /// All messages in insertion order, or the most recent `limit` of them.
    async fn try_list(&self, key: &HistoryKey, limit: Option<usize>) -> Result<Vec<Message>>;

    async fn try_clear(&self, key: &HistoryKey) -> Result<()>;

    /// Append at the tail; failures are logged.
    async fn append(&self, key: &HistoryKey, message: Message) {
        if let Err(e) = self.try_append(key, message).await {
            error!(backend = self.backend(), key = %key, error = %e, "failed to append message to history");
        }
    }

    /// Read the log; failures are logged and yield an empty log.
    async fn list(&self, key: &HistoryKey, limit: Option<usize>) -> Vec<Message> {
        match self.try_list(key, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(backend = self.backend(), key = %key, error = %e, "failed to read history");
                Vec::new()
            }
        }
    }

    /// Delete the log; idempotent, failures are logged.
    async fn clear(&self, key: &HistoryKey) {
        if let Err(e) = self.try_clear(key).await {
            error!(backend = self.backend(), key = %key, error = %e, "failed to clear history");
        }
    }
}

/// Most recent `limit` items of `items`, order preserved.
pub(crate) fn tail<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        let skip = items.len().saturating_sub(limit);
        items.drain(..skip);
    }
    items
}
