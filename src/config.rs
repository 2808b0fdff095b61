//! Configuration for the checkpoint/restore layer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime settings consulted by every checkpoint and restore request.
///
/// Normally embedded in the runtime's own configuration file:
///
/// ```json
/// { "enabled": true, "staging_root": "/var/lib/containers/staging" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointRestoreConfig {
    /// Whether checkpoint/restore support is available at all.
    pub enabled: bool,
    /// Parent directory for staging directories (system temp dir if unset).
    pub staging_root: Option<PathBuf>,
}

impl CheckpointRestoreConfig {
    /// Creates a config with checkpoint/restore enabled.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            staging_root: None,
        }
    }

    /// Sets the feature gate.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the staging root.
    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Returns the directory staging directories are created in.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let config = CheckpointRestoreConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.staging_root(), std::env::temp_dir());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CheckpointRestoreConfig =
            serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert!(config.enabled);
        assert!(config.staging_root.is_none());
    }
}
