//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::bridge::{validate_max_pending, BridgeConfig, BridgeSection, LibrarySection, LoggingSection};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "handoff.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.handoff/config.toml) - lowest priority
/// 2. Project config (./handoff.toml) - overrides global
/// 3. Environment variables (HANDOFF_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective bridge configuration
    pub bridge: BridgeConfig,

    /// Directory where handoff.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global config from `path`
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find handoff.toml, merges it over the
    /// global config, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let global_config = self.load_global_config()?;

        let merged = global_config.merge(project_config);
        let bridge = self.apply_env_overrides(merged)?;

        Ok(Config {
            bridge,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = BridgeConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config()?;
        let bridge = self.apply_env_overrides(global_config.merge(project_config))?;

        Ok(Config {
            bridge,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, BridgeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = BridgeConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, BridgeConfig::default())),
            }
        }
    }

    /// Load global configuration, which is optional
    fn load_global_config(&mut self) -> ConfigResult<BridgeConfig> {
        if self.global_config_path.is_none() {
            match Self::global_config_dir() {
                Ok(dir) => self.global_config_path = Some(dir.join("config.toml")),
                // No home directory means no global config
                Err(ConfigError::HomeNotFound) => return Ok(BridgeConfig::default()),
                Err(e) => return Err(e),
            }
        }

        match &self.global_config_path {
            Some(path) if path.exists() => BridgeConfig::load_from_file(path),
            _ => Ok(BridgeConfig::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Recognized: HANDOFF_LIBRARY, HANDOFF_MAX_PENDING, HANDOFF_TIMEOUT_MS, HANDOFF_LOG
    fn apply_env_overrides(&self, mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if let Ok(path) = env::var("HANDOFF_LIBRARY") {
            if !path.is_empty() {
                config
                    .library
                    .get_or_insert_with(LibrarySection::default)
                    .path = Some(PathBuf::from(path));
            }
        }

        if let Ok(max) = env::var("HANDOFF_MAX_PENDING") {
            let max = parse_env_number::<usize>("HANDOFF_MAX_PENDING", &max)?;
            validate_max_pending(max)?;
            config
                .bridge
                .get_or_insert_with(BridgeSection::default)
                .max_pending = Some(max);
        }

        if let Ok(timeout) = env::var("HANDOFF_TIMEOUT_MS") {
            let timeout = parse_env_number::<u64>("HANDOFF_TIMEOUT_MS", &timeout)?;
            config
                .bridge
                .get_or_insert_with(BridgeSection::default)
                .timeout_ms = Some(timeout);
        }

        if let Ok(filter) = env::var("HANDOFF_LOG") {
            config
                .logging
                .get_or_insert_with(LoggingSection::default)
                .filter = Some(filter);
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.handoff)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".handoff"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a handoff.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

fn parse_env_number<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: name.to_string(),
        reason: format!("expected a non-negative integer, got '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(temp: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_path(temp.path().join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[bridge]\nmax_pending = 32\n");

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let config = isolated_loader(&temp_dir)
            .load_from_directory(&sub_dir)
            .unwrap();

        assert_eq!(config.bridge.max_pending(), 32);
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_env_override_timeout() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[bridge]\ntimeout_ms = 10\n");

        env::set_var("HANDOFF_TIMEOUT_MS", "2000");
        let result = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
        env::remove_var("HANDOFF_TIMEOUT_MS");

        let config = result.unwrap();
        assert_eq!(
            config.bridge.timeout(),
            Some(std::time::Duration::from_millis(2000))
        );
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_number() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("HANDOFF_MAX_PENDING", "lots");
        let result = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
        env::remove_var("HANDOFF_MAX_PENDING");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
