//! Redis-backed [`NamespaceBackend`].
//!
//! One hash per namespace (`memories:{user_id}`); each field holds a
//! JSON-encoded [`StoredItem`]. `created_at` comes from the server clock
//! (`TIME`) so every writer shares one time source.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde_json::Value;
use tracing::{info, warn};

use super::cache::{Namespace, NamespaceBackend, StoredItem};
use crate::error::{ColloquyError, Result};

pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`ColloquyError::StorageConnect`] if the URL is invalid or the
    /// server is unreachable.
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url = %redact(url), "connecting to Redis");

        let client =
            Client::open(url).map_err(|e| ColloquyError::StorageConnect(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ColloquyError::StorageConnect(e.to_string()))?;

        info!("connected to Redis");
        Ok(Self { conn })
    }

    async fn server_time(&self) -> Result<DateTime<Utc>> {
        let mut conn = self.conn.clone();
        let (secs, micros): (i64, u32) = redis::cmd("TIME").query_async(&mut conn).await?;
        DateTime::from_timestamp(secs, micros * 1_000)
            .ok_or_else(|| ColloquyError::StorageRead(format!("invalid server time {secs}.{micros}")))
    }
}

#[async_trait]
impl NamespaceBackend for RedisBackend {
    async fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<()> {
        let now = self.server_time().await?;
        let mut conn = self.conn.clone();
        let hash = namespace.to_string();

        let existing: Option<String> = conn.hget(&hash, key).await?;
        let created_at = existing
            .and_then(|raw| serde_json::from_str::<StoredItem>(&raw).ok())
            .map_or(now, |item| item.created_at);
        let item = StoredItem {
            key: key.to_string(),
            value,
            created_at,
            updated_at: now,
        };

        let _: () = conn.hset(&hash, key, serde_json::to_string(&item)?).await?;
        Ok(())
    }

    async fn list(&self, namespace: &Namespace) -> Result<Vec<StoredItem>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(namespace.to_string()).await?;
        Ok(fields
            .into_iter()
            .filter_map(|(field, raw)| match serde_json::from_str::<StoredItem>(&raw) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(namespace = %namespace, field, error = %e, "skipping malformed history item");
                    None
                }
            })
            .collect())
    }

    async fn delete(&self, namespace: &Namespace, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(namespace.to_string(), keys).await?;
        Ok(())
    }
}

/// Hide the password in a Redis URL for logging.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
