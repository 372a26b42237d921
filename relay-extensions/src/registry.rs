//! Extension registry.
//!
//! Owns the capability table exclusively. Every mutation swaps entries
//! under one write lock, so a concurrent `route()` observes either the
//! fully-old or fully-new handler, never a partially-initialized one.

use crate::extension::{Extension, ExtensionInfo, IntentClassifier};
use crate::handlers;
use crate::manifest::ExtensionManifest;
use crate::watcher::WatchIntent;
use relay_common::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Table {
    by_name: HashMap<String, Arc<dyn Extension>>,
    by_path: HashMap<PathBuf, String>,
}

/// Registry of capability-tagged handlers with hot reload.
#[derive(Default)]
pub struct ExtensionRegistry {
    table: RwLock<Table>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a directory for `*.toml` manifests and load each one.
    /// Files prefixed with `_` are skipped. Returns how many loaded;
    /// individual failures are logged and isolated.
    pub async fn load_dir(&self, dir: &Path) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Extension directory not readable");
                return 0;
            }
        };

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with('_'))
            {
                continue;
            }
            match self.load(&path).await {
                Ok(()) => loaded += 1,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to load extension");
                }
            }
        }

        tracing::info!(dir = %dir.display(), loaded, "Extension directory scanned");
        loaded
    }

    /// Load (or replace) the extension defined at `path`.
    ///
    /// The manifest is parsed and the handler fully constructed before
    /// the table is touched; on any failure the previous registration
    /// under the same name stays active.
    pub async fn load(&self, path: &Path) -> Result<()> {
        let manifest = ExtensionManifest::load(path)?;
        let ext = handlers::build(manifest);
        ext.on_load();

        let displaced = {
            let mut table = self.table.write().await;
            let mut displaced = Vec::new();

            // The file may now define a differently named extension.
            if let Some(old_name) = table
                .by_path
                .insert(path.to_path_buf(), ext.name().to_string())
            {
                if old_name != ext.name() {
                    if let Some(old) = table.by_name.remove(&old_name) {
                        displaced.push(old);
                    }
                }
            }
            if let Some(old) = table.by_name.insert(ext.name().to_string(), ext.clone()) {
                displaced.push(old);
            }
            displaced
        };

        for old in displaced {
            old.on_unload();
        }

        tracing::info!(extension = ext.name(), version = ext.version(), "Extension registered");
        Ok(())
    }

    /// Reload the extension defined at `path` (load for unknown paths).
    /// Replacement is a single table swap, atomic with respect to
    /// concurrent routing.
    pub async fn reload(&self, path: &Path) -> Result<()> {
        tracing::debug!(path = %path.display(), "Reloading extension");
        self.load(path).await
    }

    /// Unload the extension whose definition file was removed.
    pub async fn unload_path(&self, path: &Path) {
        let removed = {
            let mut table = self.table.write().await;
            table
                .by_path
                .remove(path)
                .and_then(|name| table.by_name.remove(&name))
        };
        if let Some(ext) = removed {
            ext.on_unload();
        }
    }

    /// Unload an extension by name.
    pub async fn unload_name(&self, name: &str) {
        let removed = {
            let mut table = self.table.write().await;
            let removed = table.by_name.remove(name);
            table.by_path.retain(|_, owner| owner != name);
            removed
        };
        if let Some(ext) = removed {
            ext.on_unload();
        }
    }

    /// Explicitly register a handler constructed in Rust.
    pub async fn register(&self, ext: Arc<dyn Extension>) {
        ext.on_load();
        let displaced = {
            let mut table = self.table.write().await;
            table.by_name.insert(ext.name().to_string(), ext)
        };
        if let Some(old) = displaced {
            old.on_unload();
        }
    }

    /// Get an extension by exact name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.table.read().await.by_name.get(name).cloned()
    }

    /// Snapshot of every registered extension's identity.
    pub async fn list(&self) -> Vec<ExtensionInfo> {
        self.table
            .read()
            .await
            .by_name
            .values()
            .map(|ext| ExtensionInfo {
                name: ext.name().to_string(),
                version: ext.version().to_string(),
                description: ext.description().to_string(),
            })
            .collect()
    }

    /// Number of registered extensions.
    pub async fn len(&self) -> usize {
        self.table.read().await.by_name.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Route a message through at most one extension.
    ///
    /// One classification call picks the handler by name (or none);
    /// handler errors and panics are caught and logged, falling through
    /// to "no extension handled this" so the default path stays
    /// reachable.
    pub async fn route(
        &self,
        message: &str,
        conversation_id: &str,
        classifier: &dyn IntentClassifier,
    ) -> Option<String> {
        let infos = self.list().await;
        if infos.is_empty() {
            return None;
        }

        let answer = match classifier.classify(message, &infos).await {
            Ok(Some(name)) => name,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Intent classification failed, using default path");
                return None;
            }
        };

        // Accept the classifier's answer case-insensitively.
        let name = infos
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(&answer))
            .map(|info| info.name.clone())?;
        let ext = self.get(&name).await?;

        self.invoke(ext, &name, message, conversation_id).await
    }

    /// Secondary direct path: linear `can_handle` scan, first match
    /// wins. For embedders that skip the classification call.
    pub async fn first_match(&self, message: &str, conversation_id: &str) -> Option<String> {
        let snapshot: Vec<Arc<dyn Extension>> =
            self.table.read().await.by_name.values().cloned().collect();

        for ext in snapshot {
            if !ext.can_handle(message) {
                continue;
            }
            let name = ext.name().to_string();
            if let Some(reply) = self.invoke(ext, &name, message, conversation_id).await {
                return Some(reply);
            }
        }
        None
    }

    /// Invoke a handler on its own task so a panic cannot take down the
    /// dispatch loop.
    async fn invoke(
        &self,
        ext: Arc<dyn Extension>,
        name: &str,
        message: &str,
        conversation_id: &str,
    ) -> Option<String> {
        let message = message.to_string();
        let conversation_id = conversation_id.to_string();
        let outcome =
            tokio::spawn(async move { ext.handle(&message, &conversation_id).await }).await;

        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::error!(extension = name, error = %e, "Extension handler failed");
                None
            }
            Err(e) => {
                tracing::error!(extension = name, error = %e, "Extension handler panicked");
                None
            }
        }
    }

    /// Apply a watcher intent. Failures are logged, never propagated.
    pub async fn apply(&self, intent: WatchIntent) {
        let result = match intent {
            WatchIntent::Load(path) => self.load(&path).await,
            WatchIntent::Reload(path) => self.reload(&path).await,
            WatchIntent::Unload(path) => {
                self.unload_path(&path).await;
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Extension change could not be applied");
        }
    }

    /// Tear down the registry, giving every handler its unload hook.
    pub async fn shutdown(&self) {
        let drained = {
            let mut table = self.table.write().await;
            table.by_path.clear();
            table.by_name.drain().collect::<Vec<_>>()
        };
        for (_, ext) in drained {
            ext.on_unload();
        }
    }
}
