//! Configuration for the relay session layer.
//!
//! Loaded from a TOML file with serde defaults for every field, so a
//! missing file or an empty table still yields a working configuration.
//!
//! # Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables (`RELAY_*` prefix, selected fields)
//! 3. Default values

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Get the default configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relay"),
        |dirs| dirs.home_dir().join(".relay"),
    )
}

/// Get the default configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Top-level configuration consumed by the session core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Durable store and connection pool
    #[serde(default)]
    pub store: StoreConfig,

    /// Event dedup cache retention
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Conversation context store and history budget
    #[serde(default)]
    pub context: ContextConfig,

    /// Extension directory and hot reload
    #[serde(default)]
    pub extensions: ExtensionsConfig,

    /// External inference service boundary
    #[serde(default)]
    pub inference: InferenceConfig,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// variable overrides. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `RELAY_*` environment overrides.
    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("RELAY_DB_PATH") {
            self.store.path = PathBuf::from(shellexpand::tilde(&path).into_owned());
        }
        if let Ok(url) = std::env::var("RELAY_INFERENCE_URL") {
            self.inference.base_url = url;
        }
        if let Ok(dir) = std::env::var("RELAY_EXTENSIONS_DIR") {
            self.extensions.dir = PathBuf::from(shellexpand::tilde(&dir).into_owned());
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Durable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file path
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Fixed connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Seconds to block waiting for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_pool_size() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

// ============================================================================
// Dedup
// ============================================================================

/// Event dedup cache configuration.
///
/// The retention window only needs to cover plausible webhook
/// redelivery latency, not permanent history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Hours a processed event id is remembered
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Seconds between reclaimer sweeps
    #[serde(default = "default_dedup_sweep_secs")]
    pub sweep_interval_secs: u64,
}

fn default_retention_hours() -> u64 {
    24
}

fn default_dedup_sweep_secs() -> u64 {
    3600
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            sweep_interval_secs: default_dedup_sweep_secs(),
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Conversation context store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Hours before an idle chat-to-conversation mapping is evicted
    #[serde(default = "default_idle_hours")]
    pub idle_hours: u64,

    /// Seconds between reclaimer sweeps
    #[serde(default = "default_context_sweep_secs")]
    pub sweep_interval_secs: u64,

    /// Token budget for one conversation's history
    #[serde(default = "default_max_history_tokens")]
    pub max_history_tokens: u64,

    /// Characters per estimated token (cheap approximation)
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u32,
}

fn default_idle_hours() -> u64 {
    2
}

fn default_context_sweep_secs() -> u64 {
    1800
}

fn default_max_history_tokens() -> u64 {
    80_000
}

fn default_chars_per_token() -> u32 {
    3
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            idle_hours: default_idle_hours(),
            sweep_interval_secs: default_context_sweep_secs(),
            max_history_tokens: default_max_history_tokens(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

// ============================================================================
// Extensions
// ============================================================================

/// Extension registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    /// Directory scanned for extension manifests
    #[serde(default = "default_extensions_dir")]
    pub dir: PathBuf,
}

fn default_extensions_dir() -> PathBuf {
    PathBuf::from("extensions")
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            dir: default_extensions_dir(),
        }
    }
}

// ============================================================================
// Inference
// ============================================================================

/// External inference service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of the inference service
    #[serde(default = "default_inference_url")]
    pub base_url: String,

    /// Seconds a chat completion call may take
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,

    /// Seconds an intent classification call may take
    #[serde(default = "default_classify_timeout_secs")]
    pub classify_timeout_secs: u64,
}

fn default_inference_url() -> String {
    "http://localhost:8080".into()
}

fn default_chat_timeout_secs() -> u64 {
    600
}

fn default_classify_timeout_secs() -> u64 {
    30
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_url(),
            chat_timeout_secs: default_chat_timeout_secs(),
            classify_timeout_secs: default_classify_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.store.pool_size, 5);
        assert_eq!(config.store.acquire_timeout_secs, 5);
        assert_eq!(config.dedup.retention_hours, 24);
        assert_eq!(config.context.idle_hours, 2);
        assert_eq!(config.context.max_history_tokens, 80_000);
        assert_eq!(config.context.chars_per_token, 3);
        assert_eq!(config.inference.chat_timeout_secs, 600);
        assert_eq!(config.inference.classify_timeout_secs, 30);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/relay-config.toml")).unwrap();
        assert_eq!(config.store.pool_size, 5);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[context]\nmax_history_tokens = 1000\n\n[store]\npool_size = 2"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.context.max_history_tokens, 1000);
        assert_eq!(config.store.pool_size, 2);
        // untouched sections fall back to defaults
        assert_eq!(config.context.chars_per_token, 3);
        assert_eq!(config.dedup.retention_hours, 24);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
