//! Background expiry of dedup rows and idle conversation contexts.

use relay_common::config::{ContextConfig, DedupConfig};
use relay_store::{ContextStore, DedupStore};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Sweep cadence and retention windows for both loops.
#[derive(Debug, Clone)]
pub struct ReclaimerSettings {
    pub dedup_retention: Duration,
    pub dedup_sweep: Duration,
    pub context_idle: Duration,
    pub context_sweep: Duration,
}

impl ReclaimerSettings {
    pub fn from_config(dedup: &DedupConfig, context: &ContextConfig) -> Self {
        Self {
            dedup_retention: Duration::from_secs(dedup.retention_hours * 3600),
            dedup_sweep: Duration::from_secs(dedup.sweep_interval_secs),
            context_idle: Duration::from_secs(context.idle_hours * 3600),
            context_sweep: Duration::from_secs(context.sweep_interval_secs),
        }
    }
}

/// Two independent interval loops. A failed sweep is logged and the
/// next tick tries again; neither loop ever exits on its own.
pub struct Reclaimer {
    dedup_loop: JoinHandle<()>,
    context_loop: JoinHandle<()>,
}

impl Reclaimer {
    pub fn spawn(dedup: DedupStore, context: ContextStore, settings: ReclaimerSettings) -> Self {
        let dedup_loop = tokio::spawn(sweep_dedup(
            dedup,
            settings.dedup_retention,
            settings.dedup_sweep,
        ));
        let context_loop = tokio::spawn(sweep_contexts(
            context,
            settings.context_idle,
            settings.context_sweep,
        ));
        Self {
            dedup_loop,
            context_loop,
        }
    }

    pub fn shutdown(self) {
        self.dedup_loop.abort();
        self.context_loop.abort();
    }
}

async fn sweep_dedup(dedup: DedupStore, retention: Duration, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match dedup.clean_older_than(retention).await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "Expired dedup entries removed"),
            Err(e) => tracing::warn!(error = %e, "Dedup sweep failed"),
        }
    }
}

async fn sweep_contexts(context: ContextStore, max_idle: Duration, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match context.clean_idle(max_idle).await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "Idle conversation contexts removed"),
            Err(e) => tracing::warn!(error = %e, "Context sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::StorePool;

    async fn aged_store(dir: &tempfile::TempDir) -> (StorePool, DedupStore, ContextStore) {
        let pool = StorePool::open(&dir.path().join("relay.db"), 2, Duration::from_secs(5))
            .await
            .unwrap();
        (
            pool.clone(),
            DedupStore::new(pool.clone()),
            ContextStore::new(pool, 3),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweeps_expired_rows_on_its_own() {
        let dir = tempfile::TempDir::new().unwrap();
        let (pool, dedup, context) = aged_store(&dir).await;

        dedup.mark_processed("old-event").await.unwrap();
        context.save_context("idle-chat", "conv-1").await.unwrap();
        // Age both rows well past their windows.
        pool.with_conn(|conn| {
            conn.execute_batch(
                "UPDATE processed_events SET processed_at = processed_at - 200000;
                 UPDATE conversation_contexts SET last_used = last_used - 200000;",
            )
        })
        .await
        .unwrap();

        let reclaimer = Reclaimer::spawn(
            dedup.clone(),
            context.clone(),
            ReclaimerSettings {
                dedup_retention: Duration::from_secs(3600),
                dedup_sweep: Duration::from_millis(50),
                context_idle: Duration::from_secs(3600),
                context_sweep: Duration::from_millis(50),
            },
        );

        let mut cleaned = false;
        for _ in 0..50 {
            if !dedup.is_processed("old-event").await
                && context.get_context("idle-chat").await.unwrap().is_none()
            {
                cleaned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        reclaimer.shutdown();
        assert!(cleaned, "reclaimer never swept the aged rows");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fresh_rows_survive_the_sweep() {
        let dir = tempfile::TempDir::new().unwrap();
        let (_pool, dedup, context) = aged_store(&dir).await;

        dedup.mark_processed("fresh-event").await.unwrap();
        context.save_context("active-chat", "conv-1").await.unwrap();

        let reclaimer = Reclaimer::spawn(
            dedup.clone(),
            context.clone(),
            ReclaimerSettings {
                dedup_retention: Duration::from_secs(3600),
                dedup_sweep: Duration::from_millis(50),
                context_idle: Duration::from_secs(3600),
                context_sweep: Duration::from_millis(50),
            },
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        reclaimer.shutdown();

        assert!(dedup.is_processed("fresh-event").await);
        assert!(context.get_context("active-chat").await.unwrap().is_some());
    }
}
