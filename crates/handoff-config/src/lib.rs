//! Handoff Configuration System
//!
//! Provides configuration for the async completion bridge:
//! - Global user configuration (~/.handoff/config.toml)
//! - Project configuration (handoff.toml)
//! - Environment overrides (HANDOFF_*)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.handoff/config.toml)
//! 2. Project config (./handoff.toml, searched upwards)
//! 3. Environment variables (HANDOFF_*)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use handoff_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("max pending calls: {}", config.bridge.max_pending());
//! ```

pub mod bridge;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use bridge::{
    BridgeConfig, BridgeSection, LibrarySection, LoggingSection, DEFAULT_BLOB_SYMBOL,
    DEFAULT_LOG_FILTER, DEFAULT_MAX_PENDING, DEFAULT_SCALAR_SYMBOL, DEFAULT_STRING_LIST_SYMBOL,
    MAX_PENDING_LIMIT,
};
pub use loader::{Config, ConfigLoader};
