//! Hot-reloadable extension registry.
//!
//! Extensions are capability-tagged message handlers defined by TOML
//! manifests in a watched directory. The registry owns the handler
//! table exclusively; the file-system watcher feeds load/reload/unload
//! intents through a channel to a single consumer task, so routing
//! reads never observe a table mid-mutation.

pub mod extension;
pub mod handlers;
pub mod manifest;
pub mod registry;
pub mod watcher;

pub use extension::{Extension, ExtensionInfo, IntentClassifier};
pub use manifest::{ExtensionManifest, HandlerSpec};
pub use registry::ExtensionRegistry;
pub use watcher::{ExtensionWatcher, WatchIntent};
