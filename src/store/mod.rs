mod memory;
mod remote;
mod sqlite;

pub use memory::MemoryStore;
pub use remote::RemoteStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;

pub(crate) const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS page_views (
    slug        TEXT PRIMARY KEY NOT NULL,
    views       INTEGER NOT NULL DEFAULT 0,
    last_viewed TEXT NOT NULL
)";

pub(crate) const SELECT_VIEWS: &str = "SELECT views FROM page_views WHERE slug = ?1";

pub(crate) const UPSERT_VIEWS: &str = "INSERT INTO page_views (slug, views, last_viewed)
    VALUES (?1, 1, ?2)
    ON CONFLICT(slug) DO UPDATE SET
        views = views + 1,
        last_viewed = excluded.last_viewed
    RETURNING views";

/// Durable key → view count storage.
///
/// `increment_and_read` must be one atomic operation against the backend,
/// never a read followed by a write.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current count for `key`, 0 when it has never been incremented.
    async fn read(&self, key: &str) -> Result<u64, StoreError>;

    /// Atomically adds one view and returns the new count.
    async fn increment_and_read(&self, key: &str) -> Result<u64, StoreError>;

    /// Backend name for logs.
    fn kind(&self) -> &'static str;
}

// e.g. blog:hello-world
pub fn namespaced_key(kind: &str, slug: &str) -> String {
    format!("{kind}:{slug}")
}

pub(crate) fn to_count(views: i64) -> Result<u64, StoreError> {
    u64::try_from(views).map_err(|_| StoreError::InvalidCount(views))
}

// stand-in for a missing or broken store, every call fails with the reason
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    not_configured: bool,
    reason: String,
}

impl UnavailableStore {
    pub fn not_configured() -> Self {
        Self {
            not_configured: true,
            reason: "set VIEWS_DATABASE_URL or --database-url".to_string(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            not_configured: false,
            reason: reason.into(),
        }
    }

    fn error(&self) -> StoreError {
        if self.not_configured {
            StoreError::NotConfigured(self.reason.clone())
        } else {
            StoreError::Unavailable(self.reason.clone())
        }
    }
}

#[async_trait]
impl CounterStore for UnavailableStore {
    async fn read(&self, _key: &str) -> Result<u64, StoreError> {
        Err(self.error())
    }

    async fn increment_and_read(&self, _key: &str) -> Result<u64, StoreError> {
        Err(self.error())
    }

    fn kind(&self) -> &'static str {
        "unavailable"
    }
}

// never fails, a bad configuration is logged and becomes an UnavailableStore
pub async fn connect(
    database_url: Option<&str>,
    token: Option<&str>,
    timeout: Duration,
) -> Arc<dyn CounterStore> {
    let Some(url) = database_url.map(str::trim).filter(|u| !u.is_empty()) else {
        tracing::error!("no database url configured, view requests will fail with 500");
        return Arc::new(UnavailableStore::not_configured());
    };

    if url == "memory" || url == "sqlite::memory:" {
        tracing::warn!("using in-memory counter store, counts are lost on restart");
        return Arc::new(MemoryStore::new());
    }

    if let Some(path) = sqlite_path(url) {
        return match SqliteStore::open(path, timeout) {
            Ok(store) => {
                tracing::info!(path, "sqlite counter store opened");
                Arc::new(store)
            }
            Err(err) => {
                tracing::error!(path, error = %err, "failed to open sqlite counter store");
                Arc::new(UnavailableStore::failed(format!("sqlite store {path}: {err}")))
            }
        };
    }

    if url.starts_with("libsql://") || url.starts_with("http://") || url.starts_with("https://") {
        if token.is_none() {
            tracing::warn!("remote counter store configured without a token");
        }
        let store = match RemoteStore::new(url, token, timeout) {
            Ok(store) => store,
            Err(err) => {
                tracing::error!(error = %err, "failed to build remote store client");
                return Arc::new(UnavailableStore::failed(err.to_string()));
            }
        };
        // the database may come up later, keep the store either way
        match store.ensure_schema().await {
            Ok(()) => tracing::info!(endpoint = %store.endpoint(), "remote counter store ready"),
            Err(err) => tracing::error!(
                endpoint = %store.endpoint(),
                error = %err,
                "failed to prepare remote counter store schema"
            ),
        }
        return Arc::new(store);
    }

    tracing::error!("unrecognised database url scheme, view requests will fail with 500");
    Arc::new(UnavailableStore::failed("unsupported database url scheme"))
}

fn sqlite_path(url: &str) -> Option<&str> {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .or_else(|| url.strip_prefix("file:"))
        .filter(|path| !path.is_empty())
}
