//! Process-local history.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{tail, HistoryKey, HistoryStore};
use crate::error::Result;
use crate::types::Message;

/// History held in a map of per-key message vectors. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    logs: RwLock<HashMap<HistoryKey, Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with at least one message.
    pub fn key_count(&self) -> usize {
        self.logs.read().values().filter(|v| !v.is_empty()).count()
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn try_append(&self, key: &HistoryKey, message: Message) -> Result<()> {
        self.logs.write().entry(key.clone()).or_default().push(message);
        Ok(())
    }

    async fn try_list(&self, key: &HistoryKey, limit: Option<usize>) -> Result<Vec<Message>> {
        let messages = self.logs.read().get(key).cloned().unwrap_or_default();
        Ok(tail(messages, limit))
    }

    async fn try_clear(&self, key: &HistoryKey) -> Result<()> {
        self.logs.write().remove(key);
        Ok(())
    }
}
