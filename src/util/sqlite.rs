//! SQLite pool construction shared by the document store and SQL tools.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::{ColloquyError, Result};

/// Whether `url` names a private in-memory database.
pub fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Open a pool for `url`, creating the database file if needed.
///
/// In-memory databases live only as long as their connection, so they get a
/// single connection that is never recycled.
pub async fn connect_pool(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| ColloquyError::StorageConnect(format!("{url}: {e}")))?
        .create_if_missing(true);

    let pool_options = if is_memory_url(url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    pool_options
        .connect_with(options)
        .await
        .map_err(|e| ColloquyError::StorageConnect(format!("{url}: {e}")))
}

/// Open an existing database with read-only connections.
///
/// Writes fail at the SQLite level regardless of the statement text.
pub async fn connect_read_only_pool(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| ColloquyError::StorageConnect(format!("{url}: {e}")))?
        .read_only(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| ColloquyError::StorageConnect(format!("{url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite://file.db?mode=memory"));
        assert!(!is_memory_url("sqlite://history.db"));
    }

    #[tokio::test]
    async fn file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let url = format!("sqlite://{}", path.display());
        let pool = connect_pool(&url, 2).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn read_only_pool_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ro.db").display());
        let writer = connect_pool(&url, 1).await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER)")
            .execute(&writer)
            .await
            .unwrap();

        let reader = connect_read_only_pool(&url, 1).await.unwrap();
        sqlx::query("SELECT COUNT(*) FROM t").fetch_one(&reader).await.unwrap();
        assert!(sqlx::query("INSERT INTO t VALUES (1)")
            .execute(&reader)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn read_only_pool_needs_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("absent.db").display());
        let err = connect_read_only_pool(&url, 1).await.unwrap_err();
        assert!(matches!(err, ColloquyError::StorageConnect(_)));
    }

    #[tokio::test]
    async fn unreachable_path_is_a_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/missing/dir/history.db", dir.path().display());
        let err = connect_pool(&url, 1).await.unwrap_err();
        assert!(matches!(err, ColloquyError::StorageConnect(_)));
    }
}
