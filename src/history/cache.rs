//! Namespaced key-value history.
//!
//! Each message is one item in the namespace `("memories", user_id)`, stored
//! as `{"data": "User: ..."}` under a key unique to that write. Order comes
//! from the backend-assigned `created_at`, with the item key breaking ties;
//! this is weaker than the strict insertion order of the other stores when
//! clocks or writers race. Only user and assistant turns are reconstructed
//! on read.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::{tail, HistoryKey, HistoryStore};
use crate::error::{ColloquyError, Result};
use crate::types::{Message, Role};

/// Hierarchical namespace, e.g. `("memories", "alice")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(pub Vec<String>);

impl Namespace {
    pub fn memories(user_id: &str) -> Self {
        Self(vec!["memories".to_string(), user_id.to_string()])
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

/// One item as returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Networked (or local) key-value store with namespaces.
#[async_trait]
pub trait NamespaceBackend: Send + Sync {
    /// Write `value` under `key`, assigning `created_at` on first write.
    async fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<()>;

    /// Every item in `namespace`, in no particular order.
    async fn list(&self, namespace: &Namespace) -> Result<Vec<StoredItem>>;

    async fn delete(&self, namespace: &Namespace, keys: &[String]) -> Result<()>;
}

/// Process-local [`NamespaceBackend`].
///
/// `created_at` is strictly increasing across writes so ordering is exact.
#[derive(Debug, Default)]
pub struct LocalNamespaceBackend {
    inner: RwLock<LocalState>,
}

#[derive(Debug, Default)]
struct LocalState {
    namespaces: HashMap<Namespace, BTreeMap<String, StoredItem>>,
    last_created: Option<DateTime<Utc>>,
}

impl LocalNamespaceBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NamespaceBackend for LocalNamespaceBackend {
    async fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<()> {
        let mut state = self.inner.write();
        let mut now = Utc::now();
        if let Some(last) = state.last_created {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        state.last_created = Some(now);

        let items = state.namespaces.entry(namespace.clone()).or_default();
        match items.get_mut(key) {
            Some(item) => {
                item.value = value;
                item.updated_at = now;
            }
            None => {
                items.insert(
                    key.to_string(),
                    StoredItem {
                        key: key.to_string(),
                        value,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn list(&self, namespace: &Namespace) -> Result<Vec<StoredItem>> {
        Ok(self
            .inner
            .read()
            .namespaces
            .get(namespace)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, namespace: &Namespace, keys: &[String]) -> Result<()> {
        if let Some(items) = self.inner.write().namespaces.get_mut(namespace) {
            for key in keys {
                items.remove(key);
            }
        }
        Ok(())
    }
}

/// History over a [`NamespaceBackend`].
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn NamespaceBackend>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn NamespaceBackend>) -> Self {
        Self { backend }
    }

    /// Store over a fresh [`LocalNamespaceBackend`].
    pub fn local() -> Self {
        Self::new(Arc::new(LocalNamespaceBackend::new()))
    }

    /// Items for the session, ordered by `created_at` then key.
    async fn session_items(&self, key: &HistoryKey) -> Result<Vec<StoredItem>> {
        let mut items: Vec<StoredItem> = self
            .backend
            .list(&Namespace::memories(&key.user_id))
            .await?
            .into_iter()
            .filter(|item| item.value.get("session_id").and_then(Value::as_str) == Some(key.session_id.as_str()))
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(items)
    }

    /// Up to `limit` messages of the session most relevant to `query`.
    ///
    /// This is a relevance-ranked subset, not a suffix of the log.
    pub async fn search(&self, key: &HistoryKey, query: &str, limit: usize) -> Result<Vec<Message>> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let mut scored: Vec<(usize, Message)> = self
            .session_items(key)
            .await?
            .iter()
            .filter_map(decode_item)
            .map(|msg| {
                let content = msg.content.to_lowercase();
                let score = words.iter().filter(|w| content.contains(w.as_str())).count();
                (score, msg)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, m)| m).collect())
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl HistoryStore for CacheStore {
    fn backend(&self) -> &'static str {
        "cache"
    }

    async fn try_append(&self, key: &HistoryKey, message: Message) -> Result<()> {
        let item_key = format!("{}_{}_{}", key.session_id, message.role.kind(), Uuid::now_v7());
        let value = json!({
            "data": encode_data(&message),
            "session_id": key.session_id,
        });
        debug!(key = %key, item = %item_key, "writing history item");
        self.backend
            .put(&Namespace::memories(&key.user_id), &item_key, value)
            .await
            .map_err(|e| ColloquyError::StorageWrite(e.to_string()))
    }

    async fn try_list(&self, key: &HistoryKey, limit: Option<usize>) -> Result<Vec<Message>> {
        let items = self
            .session_items(key)
            .await
            .map_err(|e| ColloquyError::StorageRead(e.to_string()))?;
        let messages = items.iter().filter_map(decode_item).collect();
        Ok(tail(messages, limit))
    }

    async fn try_clear(&self, key: &HistoryKey) -> Result<()> {
        let keys: Vec<String> = self
            .session_items(key)
            .await
            .map_err(|e| ColloquyError::StorageRead(e.to_string()))?
            .into_iter()
            .map(|item| item.key)
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        self.backend
            .delete(&Namespace::memories(&key.user_id), &keys)
            .await
            .map_err(|e| ColloquyError::StorageWrite(e.to_string()))
    }
}

fn encode_data(message: &Message) -> String {
    let prefix = match message.role {
        Role::User => "User",
        Role::Assistant => "AI",
        Role::System => "System",
        Role::Tool => "Tool",
    };
    format!("{prefix}: {}", message.content)
}

fn decode_item(item: &StoredItem) -> Option<Message> {
    let data = item.value.get("data")?.as_str()?;
    if let Some(content) = data.strip_prefix("User: ") {
        Some(Message::user(content))
    } else {
        data.strip_prefix("AI: ").map(Message::assistant)
    }
}
