//! CLI configuration resolution
//!
//! Layers, later overrides earlier:
//! 1. ~/.handoff/config.toml
//! 2. handoff.toml found from the start directory upwards
//! 3. HANDOFF_* environment variables
//! 4. Command-line flags

use anyhow::{Context, Result};
use handoff_config::{BridgeConfig, BridgeSection, ConfigLoader, LibrarySection};
use std::path::PathBuf;

/// Settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub library: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub config_dir: Option<PathBuf>,
}

impl CliOverrides {
    fn into_config(self) -> BridgeConfig {
        BridgeConfig {
            library: self.library.map(|path| LibrarySection {
                path: Some(path),
                ..Default::default()
            }),
            bridge: self.timeout_ms.map(|ms| BridgeSection {
                timeout_ms: Some(ms),
                ..Default::default()
            }),
            logging: None,
        }
    }
}

/// Load the layered configuration and apply command-line overrides
pub fn resolve(overrides: CliOverrides) -> Result<BridgeConfig> {
    let start_dir = match &overrides.config_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };

    let loaded = ConfigLoader::new()
        .load_from_directory(&start_dir)
        .with_context(|| format!("Failed to load configuration from {}", start_dir.display()))?;

    let config = loaded.bridge.merge(overrides.into_config());
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flags_override_loaded_values() {
        let loaded = BridgeConfig::from_toml_str(
            "[bridge]\ntimeout_ms = 100\nmax_pending = 4\n[library]\nblob_symbol = \"custom\"\n",
        )
        .unwrap();
        let overrides = CliOverrides {
            library: Some(PathBuf::from("/tmp/libops.so")),
            timeout_ms: Some(2_000),
            config_dir: None,
        };

        let merged = loaded.merge(overrides.into_config());
        assert_eq!(merged.timeout(), Some(Duration::from_millis(2_000)));
        assert_eq!(merged.max_pending(), 4);
        assert_eq!(merged.blob_symbol(), "custom");
        assert_eq!(
            merged.library_path(),
            Some(std::path::Path::new("/tmp/libops.so"))
        );
    }

    #[test]
    fn test_no_flags_keep_loaded_values() {
        let loaded = BridgeConfig::from_toml_str("[bridge]\ntimeout_ms = 100\n").unwrap();
        let merged = loaded.merge(CliOverrides::default().into_config());
        assert_eq!(merged.timeout(), Some(Duration::from_millis(100)));
        assert!(merged.library_path().is_none());
    }
}
