use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{CREATE_TABLE, CounterStore, SELECT_VIEWS, UPSERT_VIEWS, to_count};
use crate::error::StoreError;

// SQLite file store, statements run on the blocking pool
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn read(&self, key: &str) -> Result<u64, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let views: Option<i64> = conn
                .query_row(SELECT_VIEWS, [&key], |row| row.get(0))
                .optional()?;
            views.map_or(Ok(0), to_count)
        })
        .await
    }

    async fn increment_and_read(&self, key: &str) -> Result<u64, StoreError> {
        let key = key.to_string();
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_conn(move |conn| {
            let views: i64 =
                conn.query_row(UPSERT_VIEWS, rusqlite::params![key, now], |row| row.get(0))?;
            to_count(views)
        })
        .await
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_slug_reads_zero() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.read("blog:missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_inserts_then_increments() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.increment_and_read("blog:hello-world").await.unwrap(), 1);
        assert_eq!(store.increment_and_read("blog:hello-world").await.unwrap(), 2);
        assert_eq!(store.read("blog:hello-world").await.unwrap(), 2);
        assert_eq!(store.read("project:hello-world").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn last_viewed_is_recorded() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.increment_and_read("blog:a").await.unwrap();

        let last_viewed: String = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT last_viewed FROM page_views WHERE slug = 'blog:a'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&last_viewed).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.spawn(async move { store.increment_and_read("blog:hot").await.unwrap() });
        }

        let mut seen = Vec::new();
        while let Some(res) = tasks.join_next().await {
            seen.push(res.unwrap());
        }
        seen.sort_unstable();

        // every caller observed a distinct post-increment value
        assert_eq!(seen, (1..=50).collect::<Vec<u64>>());
        assert_eq!(store.read("blog:hot").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn corrupt_count_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO page_views (slug, views, last_viewed) VALUES ('blog:bad', -5, '')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(store.read("blog:bad").await, Err(StoreError::InvalidCount(-5))));
    }
}
