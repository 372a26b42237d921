//! Extension manifest parsing.
//!
//! A manifest is a TOML file declaring exactly one concrete handler.
//! There is no runtime type discovery: the `[handler.*]` table names
//! the handler kind and the loader constructs it directly.
//!
//! ```toml
//! name = "weather"
//! version = "0.1.0"
//! description = "Answers weather questions for a city"
//!
//! [handler.reply]
//! triggers = ["weather"]
//! template = "Sorry, the weather service is offline."
//! ```

use relay_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Parsed extension definition file.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionManifest {
    /// Stable unique identifier
    pub name: String,
    /// Extension version
    pub version: String,
    /// Description shown to the intent classifier
    #[serde(default)]
    pub description: String,
    /// The single concrete handler this extension provides
    pub handler: HandlerSpec,
}

/// Handler kinds a manifest may declare. Externally tagged, so a
/// manifest carries exactly one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerSpec {
    /// Keyword-triggered template reply.
    Reply {
        /// Case-insensitive substrings that trigger the direct path
        triggers: Vec<String>,
        /// Reply text; `{message}` is replaced with the user message
        template: String,
    },
    /// Run an external program with the message on argv.
    Command {
        /// Program to execute
        program: String,
        /// Leading arguments, before the message
        #[serde(default)]
        args: Vec<String>,
        /// Case-insensitive substrings for the direct path (optional;
        /// classifier routing works without them)
        #[serde(default)]
        triggers: Vec<String>,
        /// Seconds the program may run
        #[serde(default = "default_command_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_command_timeout_secs() -> u64 {
    60
}

impl ExtensionManifest {
    /// Parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ExtensionLoad(format!("{}: {e}", path.display()))
        })?;
        let manifest: Self = toml::from_str(&raw)
            .map_err(|e| Error::ExtensionLoad(format!("{}: {e}", path.display())))?;

        if manifest.name.trim().is_empty() {
            return Err(Error::ExtensionLoad(format!(
                "{}: extension name must not be empty",
                path.display()
            )));
        }
        Ok(manifest)
    }
}
