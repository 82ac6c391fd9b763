//! Command implementations

pub mod demo;
pub mod invoke;

use anyhow::{Context, Result};
use handoff_config::BridgeConfig;
use handoff_runtime::{Bridge, BridgeError};

/// How results are printed
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print a JSON value on stdout, pretty-printed
    pub fn emit_json(&self, value: &serde_json::Value) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Report a failed call and turn it into the command's error
    pub fn fail(&self, operation: &str, err: BridgeError) -> anyhow::Error {
        if self.json {
            let value = serde_json::json!({
                "operation": operation,
                "error": {
                    "kind": err.kind(),
                    "message": err.to_string(),
                },
            });
            if let Ok(text) = serde_json::to_string_pretty(&value) {
                println!("{}", text);
            }
        }
        anyhow::Error::new(err).context(format!("{} call failed", operation))
    }
}

/// Bridge for `config`, bound to the built-in natives unless a library is set
pub fn build_bridge(config: &BridgeConfig) -> Result<Bridge> {
    let bridge = Bridge::from_config(config, handoff_native::builtin_ops())
        .context("Failed to set up the bridge")?;
    tracing::debug!(
        library = ?config.library_path(),
        max_pending = config.max_pending(),
        timeout = ?config.timeout(),
        "bridge ready"
    );
    Ok(bridge)
}
