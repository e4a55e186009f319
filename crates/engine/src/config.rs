//! Engine configuration via `shadowset.toml`
//!
//! A small config file selects the capability level sessions gate against,
//! the snapshot context new backups start in, and the default wait timeout
//! for async operations. `write_default_if_missing` drops a commented
//! default next to the caller's data.

use serde::{Deserialize, Serialize};
use shadowset_core::{OrchestrationError, PlatformLevel, Result, SnapshotContext};
use std::path::Path;
use std::time::Duration;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "shadowset.toml";

/// Engine configuration loaded from `shadowset.toml`.
///
/// # Example
///
/// ```toml
/// # Capability level: "xp", "server2003", "server2003sp1", "vista" or "server2008"
/// platform = "server2008"
///
/// # Context new backup sessions start in
/// default_context = "backup"
///
/// # wait_timeout_ms = 30000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Capability level name.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Snapshot context preset name.
    #[serde(default = "default_context")]
    pub default_context: String,
    /// Default timeout for `AsyncOperation::wait_default`, in milliseconds.
    /// Absent means wait without limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
}

fn default_platform() -> String {
    PlatformLevel::Server2008.name().to_string()
}

fn default_context() -> String {
    "backup".to_string()
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            default_context: default_context(),
            wait_timeout_ms: None,
        }
    }
}

impl ShadowConfig {
    /// Parse the platform name.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown level name.
    pub fn platform_level(&self) -> Result<PlatformLevel> {
        PlatformLevel::from_name(&self.platform).ok_or_else(|| {
            OrchestrationError::invalid_argument(format!(
                "Invalid platform '{}' in {}. Expected one of: xp, server2003, server2003sp1, vista, server2008.",
                self.platform, CONFIG_FILE_NAME
            ))
        })
    }

    /// Parse the default context name.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown preset name.
    pub fn context(&self) -> Result<SnapshotContext> {
        SnapshotContext::from_name(&self.default_context).ok_or_else(|| {
            OrchestrationError::invalid_argument(format!(
                "Invalid default_context '{}' in {}.",
                self.default_context, CONFIG_FILE_NAME
            ))
        })
    }

    /// Default wait timeout, if configured.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Check every field eagerly.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.platform_level()?;
        if self.context()? == SnapshotContext::ALL {
            return Err(OrchestrationError::invalid_argument(format!(
                "default_context in {} cannot be \"all\"; it is a query filter.",
                CONFIG_FILE_NAME
            )));
        }
        if self.wait_timeout_ms == Some(0) {
            return Err(OrchestrationError::invalid_argument(format!(
                "wait_timeout_ms in {} must be positive; omit it to wait without limit.",
                CONFIG_FILE_NAME
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Shadowset configuration
#
# Capability level sessions gate against:
#   "xp", "server2003", "server2003sp1", "vista" or "server2008" (default)
platform = "server2008"

# Snapshot context new backup sessions start in (default: "backup").
#   "backup", "file_share_backup", "nas_rollback", "app_rollback",
#   "client_accessible", "client_accessible_writers"
default_context = "backup"

# Default timeout for waiting on async operations, in milliseconds.
# Omit to wait without limit.
# wait_timeout_ms = 30000
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the file cannot be read
    /// - `InvalidArgument` if it cannot be parsed or a value is invalid
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ShadowConfig = toml::from_str(&content).map_err(|e| {
            OrchestrationError::invalid_argument(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                OrchestrationError::configuration(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            OrchestrationError::configuration(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content).map_err(|e| {
            OrchestrationError::configuration(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
