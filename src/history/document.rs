//! Document-table history over SQLite.
//!
//! One row per message:
//!
//! | column         | content                                        |
//! |----------------|------------------------------------------------|
//! | `id`           | autoincrement insertion identifier (sort key)  |
//! | `session_id`   | session the message belongs to                 |
//! | `user_id`      | owning user                                    |
//! | `history`      | the serialized [`Message`]                     |
//! | `metadata`     | `{"created_at": .., "message_type": ..}`       |
//! | `message_type` | `human`, `ai`, `system` or `tool`              |
//! | `timestamp`    | RFC 3339 write time                            |
//!
//! A compound index on `(session_id, user_id)` serves every query.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};

use super::{HistoryKey, HistoryStore};
use crate::error::{ColloquyError, Result};
use crate::types::Message;
use crate::util::sqlite::connect_pool;

pub const DEFAULT_TABLE: &str = "message_store";

/// Construction options. Exactly one of `connection_string` and `client`
/// must be set.
#[derive(Debug, Clone)]
pub struct DocumentStoreOptions {
    pub connection_string: Option<String>,
    pub client: Option<SqlitePool>,
    pub table: String,
    /// Bound applied to reads that pass no explicit limit.
    pub history_size: Option<usize>,
    pub create_index: bool,
}

impl Default for DocumentStoreOptions {
    fn default() -> Self {
        Self {
            connection_string: None,
            client: None,
            table: DEFAULT_TABLE.to_string(),
            history_size: None,
            create_index: true,
        }
    }
}

impl DocumentStoreOptions {
    pub fn with_connection_string(url: impl Into<String>) -> Self {
        Self {
            connection_string: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_client(pool: SqlitePool) -> Self {
        Self {
            client: Some(pool),
            ..Self::default()
        }
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: i64,
    history: String,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    table: String,
    history_size: Option<usize>,
}

impl DocumentStore {
    /// Open the store and make sure its table (and index) exist.
    pub async fn connect(options: DocumentStoreOptions) -> Result<Self> {
        let pool = match (options.connection_string, options.client) {
            (Some(_), Some(_)) => {
                return Err(ColloquyError::StorageConnect(
                    "Must provide connection_string or client, not both".into(),
                ))
            }
            (None, None) => {
                return Err(ColloquyError::StorageConnect(
                    "Either connection_string or client must be provided".into(),
                ))
            }
            (Some(url), None) => connect_pool(&url, 5).await?,
            (None, Some(pool)) => pool,
        };

        validate_identifier(&options.table)?;
        let store = Self {
            pool,
            table: options.table,
            history_size: options.history_size,
        };
        store.run_migrations(options.create_index).await?;
        info!(table = %store.table, "document history store ready");
        Ok(store)
    }

    async fn run_migrations(&self, create_index: bool) -> Result<()> {
        let table = &self.table;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                history TEXT NOT NULL,
                metadata TEXT NOT NULL,
                message_type TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| ColloquyError::StorageConnect(e.to_string()))?;

        if create_index {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_session_user ON {table} (session_id, user_id)"
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| ColloquyError::StorageConnect(e.to_string()))?;
        }
        Ok(())
    }

    /// Number of stored messages for `key`.
    pub async fn count(&self, key: &HistoryKey) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE session_id = ? AND user_id = ?",
            self.table
        ))
        .bind(&key.session_id)
        .bind(&key.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl HistoryStore for DocumentStore {
    fn backend(&self) -> &'static str {
        "document"
    }

    async fn try_append(&self, key: &HistoryKey, message: Message) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let kind = message.role.kind();
        let metadata = json!({ "created_at": now, "message_type": kind });
        let history = serde_json::to_string(&message)?;

        sqlx::query(&format!(
            "INSERT INTO {} (session_id, user_id, history, metadata, message_type, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.table
        ))
        .bind(&key.session_id)
        .bind(&key.user_id)
        .bind(history)
        .bind(metadata.to_string())
        .bind(kind)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ColloquyError::StorageWrite(e.to_string()))?;
        Ok(())
    }

    async fn try_list(&self, key: &HistoryKey, limit: Option<usize>) -> Result<Vec<Message>> {
        let skip = match limit.or(self.history_size) {
            Some(limit) => {
                let count = self
                    .count(key)
                    .await
                    .map_err(|e| ColloquyError::StorageRead(e.to_string()))?;
                count.saturating_sub(limit as u64)
            }
            None => 0,
        };

        let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
            "SELECT id, history FROM {} WHERE session_id = ? AND user_id = ? \
             ORDER BY id LIMIT -1 OFFSET ?",
            self.table
        ))
        .bind(&key.session_id)
        .bind(&key.user_id)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ColloquyError::StorageRead(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_str::<Message>(&row.history) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(id = row.id, error = %e, "skipping undecodable history row");
                    None
                }
            })
            .collect())
    }

    async fn try_clear(&self, key: &HistoryKey) -> Result<()> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE session_id = ? AND user_id = ?",
            self.table
        ))
        .bind(&key.session_id)
        .bind(&key.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| ColloquyError::StorageWrite(e.to_string()))?;
        Ok(())
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ColloquyError::Configuration(format!(
            "invalid history table name '{name}'"
        )))
    }
}
