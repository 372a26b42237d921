//! Shared building blocks for the relay session layer.
//!
//! Hosts the unified error taxonomy, the TOML configuration surface,
//! and logging initialization used by every relay crate.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
