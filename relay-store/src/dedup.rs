//! Event dedup cache.
//!
//! Answers "has event X been processed?" and marks ids processed
//! idempotently. Retention is time-bounded: the window only needs to
//! cover the platform's webhook redelivery latency, so the reclaimer
//! expires old markers instead of keeping permanent history.

use crate::pool::StorePool;
use relay_common::Result;
use rusqlite::params;
use std::time::Duration;

/// Bounded, crash-safe cache of processed event ids.
#[derive(Clone)]
pub struct DedupStore {
    pool: StorePool,
}

impl DedupStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Check whether an event id has already been processed.
    ///
    /// Any store failure degrades to `false`: an occasional duplicate
    /// delivery beats blocking the whole pipeline.
    pub async fn is_processed(&self, event_id: &str) -> bool {
        let event_id = event_id.to_string();
        let result = self
            .pool
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT 1 FROM processed_events WHERE event_id = ?1",
                    params![event_id],
                    |_row| Ok(()),
                )
                .map(|()| true)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(false),
                    other => Err(other),
                })
            })
            .await;

        match result {
            Ok(seen) => seen,
            Err(e) => {
                tracing::error!(error = %e, "Dedup lookup failed, treating event as unseen");
                false
            }
        }
    }

    /// Mark an event id processed. Idempotent: concurrent marks of the
    /// same id converge to one row.
    pub async fn mark_processed(&self, event_id: &str) -> Result<()> {
        let event_id = event_id.to_string();
        self.pool
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO processed_events (event_id, processed_at) VALUES (?1, ?2)",
                    params![event_id, StorePool::now()],
                )
                .map(|_| ())
            })
            .await
    }

    /// Delete markers whose `processed_at` predates `now - max_age`.
    /// Returns the number of rows removed. Reclaimer-only; never called
    /// from the request path.
    pub async fn clean_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = StorePool::now() - max_age.as_secs() as i64;
        let removed = self
            .pool
            .with_conn(move |conn| {
                conn.execute(
                    "DELETE FROM processed_events WHERE processed_at < ?1",
                    params![cutoff],
                )
            })
            .await?;

        if removed > 0 {
            tracing::info!(removed, "Expired old processed-event markers");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, DedupStore) {
        let dir = TempDir::new().unwrap();
        let pool = StorePool::open(
            &dir.path().join("relay.db"),
            2,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        (dir, DedupStore::new(pool))
    }

    #[tokio::test]
    async fn mark_then_lookup() {
        let (_dir, dedup) = setup().await;

        dedup.mark_processed("evt-1").await.unwrap();
        assert!(dedup.is_processed("evt-1").await);
        assert!(!dedup.is_processed("evt-2").await);
    }

    #[tokio::test]
    async fn marking_twice_stores_one_row() {
        let (_dir, dedup) = setup().await;

        dedup.mark_processed("evt-1").await.unwrap();
        dedup.mark_processed("evt-1").await.unwrap();

        let count: i64 = dedup
            .pool
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM processed_events WHERE event_id = 'evt-1'",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(dedup.is_processed("evt-1").await);
    }

    #[tokio::test]
    async fn clean_removes_only_expired_markers() {
        let (_dir, dedup) = setup().await;

        dedup.mark_processed("old").await.unwrap();
        dedup.mark_processed("fresh").await.unwrap();

        // Age the first marker past the retention window.
        dedup
            .pool
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE processed_events SET processed_at = processed_at - 90000 WHERE event_id = 'old'",
                    [],
                )
            })
            .await
            .unwrap();

        let removed = dedup
            .clean_older_than(Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!dedup.is_processed("old").await);
        assert!(dedup.is_processed("fresh").await);
    }

    #[tokio::test]
    async fn clean_on_empty_store_removes_nothing() {
        let (_dir, dedup) = setup().await;
        let removed = dedup
            .clean_older_than(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
