//! Extension capability surface.

use async_trait::async_trait;
use relay_common::Result;
use serde::Serialize;

/// A pluggable message handler.
///
/// Implement this trait to intercept messages before the default
/// inference path. Handlers constructed in Rust are added through
/// [`crate::ExtensionRegistry::register`]; manifest-defined handlers
/// are built by the loader.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Stable unique identifier.
    fn name(&self) -> &str;

    /// Extension version.
    fn version(&self) -> &str;

    /// Human-readable description, shown to the intent classifier.
    fn description(&self) -> &str;

    /// Cheap predicate for the direct (non-classifier) routing path.
    fn can_handle(&self, message: &str) -> bool;

    /// Handle a message. `Ok(None)` means "declined"; the dispatcher
    /// falls through to the default inference path.
    async fn handle(&self, message: &str, conversation_id: &str) -> Result<Option<String>>;

    /// Best-effort lifecycle hook, called after registration.
    fn on_load(&self) {
        tracing::info!(extension = self.name(), version = self.version(), "Extension loaded");
    }

    /// Best-effort lifecycle hook, called before removal.
    fn on_unload(&self) {
        tracing::info!(extension = self.name(), version = self.version(), "Extension unloaded");
    }
}

/// Snapshot of an extension's identity, fed to the classifier call.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Decides which extension (if any) should handle a message.
///
/// One external classification call replaces a linear `can_handle`
/// scan: the classifier sees every extension's name and description and
/// answers with exactly one name, or none.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        extensions: &[ExtensionInfo],
    ) -> Result<Option<String>>;
}
