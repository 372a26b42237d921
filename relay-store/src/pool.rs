//! SQLite connection pool.
//!
//! A fixed-size pool of long-lived connections serializes concurrent
//! access to the embedded store. Acquisition blocks up to a configured
//! timeout and fails with [`Error::PoolExhausted`]; the pooled handle
//! is returned on drop even when the operation fails, so callers can
//! never leak a connection on an error path.

use r2d2_sqlite::SqliteConnectionManager;
use relay_common::{Error, Result};
use std::path::Path;
use std::time::Duration;

/// Schema creation is idempotent; run once at startup.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS processed_events (
    event_id TEXT PRIMARY KEY,
    processed_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_contexts (
    chat_handle TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    last_used INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    message_index INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processed_events_time
    ON processed_events(processed_at);
CREATE INDEX IF NOT EXISTS idx_contexts_last_used
    ON conversation_contexts(last_used);
CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON conversation_messages(conversation_id, message_index);
"#;

/// Fixed-size pool of SQLite connections shared by the stores.
#[derive(Clone)]
pub struct StorePool {
    inner: r2d2::Pool<SqliteConnectionManager>,
}

impl StorePool {
    /// Open (or create) the database and initialize the schema.
    ///
    /// Every pooled connection runs in WAL mode with relaxed sync and a
    /// bounded busy wait on lock contention.
    pub async fn open(path: &Path, pool_size: u32, acquire_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA busy_timeout=5000;",
            )
        });

        let inner = r2d2::Pool::builder()
            .max_size(pool_size)
            .min_idle(Some(pool_size))
            .connection_timeout(acquire_timeout)
            .build(manager)
            .map_err(|e| Error::Internal(format!("failed to build connection pool: {e}")))?;

        let pool = Self { inner };
        pool.with_conn(|conn| conn.execute_batch(SCHEMA)).await?;

        tracing::info!(
            db_path = %path.display(),
            pool_size,
            "Store opened (WAL mode)"
        );

        Ok(pool)
    }

    /// Run a closure against a pooled connection on the blocking pool.
    ///
    /// Acquire-use-release is scoped: the connection goes back to the
    /// pool when the closure returns, success or failure. Waiting
    /// longer than the acquire timeout yields `PoolExhausted`.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|_| Error::PoolExhausted)?;
            f(&mut conn).map_err(Error::from)
        })
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {e}")))?
    }

    /// Current unix time in seconds.
    pub(crate) fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}
