//! File-system watcher feeding the registry.
//!
//! Raw notify events are reduced to load/reload/unload intents and sent
//! over a channel to one consumer task. The registry is therefore only
//! ever mutated from a single place per event, in arrival order.

use crate::registry::ExtensionRegistry;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use relay_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A change to a manifest file, reduced to what the registry acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchIntent {
    Load(PathBuf),
    Reload(PathBuf),
    Unload(PathBuf),
}

/// Watches an extension directory and applies changes to a registry.
pub struct ExtensionWatcher {
    // Held so the notify backend keeps running.
    _watcher: notify::RecommendedWatcher,
    consumer: JoinHandle<()>,
}

impl ExtensionWatcher {
    /// Start watching `dir`. Manifest changes are applied to `registry`
    /// until the watcher is dropped or [`stop`](Self::stop)ped.
    pub fn spawn(dir: &Path, registry: Arc<ExtensionRegistry>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<WatchIntent>(64);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "Extension watch error");
                    return;
                }
            };
            for intent in intents_for(&event) {
                // Callback runs on notify's own thread, so a blocking
                // send is fine. A closed channel means we are shutting
                // down.
                if tx.blocking_send(intent).is_err() {
                    return;
                }
            }
        })
        .map_err(|e| Error::ExtensionLoad(format!("watcher init failed: {e}")))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::ExtensionLoad(format!("cannot watch {}: {e}", dir.display()))
            })?;

        let consumer = tokio::spawn(consume(rx, registry));
        tracing::info!(dir = %dir.display(), "Watching extension directory");

        Ok(Self {
            _watcher: watcher,
            consumer,
        })
    }

    /// Stop watching and wait for queued intents to be applied.
    pub async fn stop(self) {
        drop(self._watcher);
        if let Err(e) = self.consumer.await {
            tracing::warn!(error = %e, "Watch consumer exited abnormally");
        }
    }
}

async fn consume(mut rx: mpsc::Receiver<WatchIntent>, registry: Arc<ExtensionRegistry>) {
    while let Some(intent) = rx.recv().await {
        tracing::debug!(?intent, "Applying extension change");
        registry.apply(intent).await;
    }
}

/// Reduce a notify event to registry intents. Only `*.toml` paths
/// matter; everything else in the directory is ignored.
fn intents_for(event: &Event) -> Vec<WatchIntent> {
    let build = |make: fn(PathBuf) -> WatchIntent| {
        event
            .paths
            .iter()
            .filter(|path| is_manifest(path))
            .map(|path| make(path.clone()))
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => build(WatchIntent::Load),
        EventKind::Modify(_) => build(WatchIntent::Reload),
        EventKind::Remove(_) => build(WatchIntent::Unload),
        _ => Vec::new(),
    }
}

fn is_manifest(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("toml")
        && !path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('_'))
}
