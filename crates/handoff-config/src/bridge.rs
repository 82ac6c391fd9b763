//! Bridge configuration (handoff.toml)
//!
//! The same schema is used for the global file and the project file;
//! every field is optional so either can carry a partial configuration.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exported symbol of the scalar operation
pub const DEFAULT_SCALAR_SYMBOL: &str = "run_task_async";
/// Exported symbol of the string-list operation
pub const DEFAULT_STRING_LIST_SYMBOL: &str = "process_string_async";
/// Exported symbol of the blob operation
pub const DEFAULT_BLOB_SYMBOL: &str = "process_protobuf_async";
/// Outstanding calls allowed when `bridge.max_pending` is unset
pub const DEFAULT_MAX_PENDING: usize = 65_536;
/// Number of slots a context table can address (24-bit slot index)
pub const MAX_PENDING_LIMIT: usize = 1 << 24;
/// Log filter used when neither RUST_LOG nor `logging.filter` is set
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Bridge configuration from handoff.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Foreign library binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<LibrarySection>,

    /// Context table and facade settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeSection>,

    /// Logging settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSection>,
}

/// `[library]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LibrarySection {
    /// Path of the shared library exporting the foreign operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scalar_symbol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_list_symbol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_symbol: Option<String>,
}

/// `[bridge]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    /// Maximum number of outstanding calls per context table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pending: Option<usize>,

    /// Facade timeout in milliseconds (unset waits forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// `tracing-subscriber` EnvFilter directive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl BridgeConfig {
    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::new(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(bridge) = &self.bridge {
            if let Some(max) = bridge.max_pending {
                validate_max_pending(max)?;
            }
        }

        if let Some(library) = &self.library {
            for (field, symbol) in [
                ("library.scalar_symbol", &library.scalar_symbol),
                ("library.string_list_symbol", &library.string_list_symbol),
                ("library.blob_symbol", &library.blob_symbol),
            ] {
                if let Some(symbol) = symbol {
                    if symbol.trim().is_empty() {
                        return Err(ConfigError::InvalidValue {
                            field: field.to_string(),
                            reason: "symbol name cannot be empty".to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Overlay `other` on top of `self`, field by field
    pub fn merge(self, other: BridgeConfig) -> BridgeConfig {
        BridgeConfig {
            library: merge_section(self.library, other.library, |base, over| LibrarySection {
                path: over.path.or(base.path),
                scalar_symbol: over.scalar_symbol.or(base.scalar_symbol),
                string_list_symbol: over.string_list_symbol.or(base.string_list_symbol),
                blob_symbol: over.blob_symbol.or(base.blob_symbol),
            }),
            bridge: merge_section(self.bridge, other.bridge, |base, over| BridgeSection {
                max_pending: over.max_pending.or(base.max_pending),
                timeout_ms: over.timeout_ms.or(base.timeout_ms),
            }),
            logging: merge_section(self.logging, other.logging, |base, over| LoggingSection {
                filter: over.filter.or(base.filter),
            }),
        }
    }

    /// Path of the foreign library, if one is configured
    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_ref().and_then(|l| l.path.as_deref())
    }

    pub fn scalar_symbol(&self) -> &str {
        self.library
            .as_ref()
            .and_then(|l| l.scalar_symbol.as_deref())
            .unwrap_or(DEFAULT_SCALAR_SYMBOL)
    }

    pub fn string_list_symbol(&self) -> &str {
        self.library
            .as_ref()
            .and_then(|l| l.string_list_symbol.as_deref())
            .unwrap_or(DEFAULT_STRING_LIST_SYMBOL)
    }

    pub fn blob_symbol(&self) -> &str {
        self.library
            .as_ref()
            .and_then(|l| l.blob_symbol.as_deref())
            .unwrap_or(DEFAULT_BLOB_SYMBOL)
    }

    /// Effective outstanding-call limit
    pub fn max_pending(&self) -> usize {
        self.bridge
            .as_ref()
            .and_then(|b| b.max_pending)
            .unwrap_or(DEFAULT_MAX_PENDING)
    }

    /// Effective facade timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.bridge
            .as_ref()
            .and_then(|b| b.timeout_ms)
            .map(Duration::from_millis)
    }

    /// Effective log filter
    pub fn log_filter(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }
}

pub(crate) fn validate_max_pending(max: usize) -> ConfigResult<()> {
    if max == 0 || max > MAX_PENDING_LIMIT {
        return Err(ConfigError::InvalidValue {
            field: "bridge.max_pending".to_string(),
            reason: format!("must be between 1 and {}, got {}", MAX_PENDING_LIMIT, max),
        });
    }
    Ok(())
}

fn merge_section<T>(base: Option<T>, over: Option<T>, combine: impl FnOnce(T, T) -> T) -> Option<T> {
    match (base, over) {
        (Some(base), Some(over)) => Some(combine(base, over)),
        (base, over) => over.or(base),
    }
}
