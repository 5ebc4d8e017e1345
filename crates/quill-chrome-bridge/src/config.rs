//! Bridge settings
//!
//! A small JSON settings file under the per-user config directory carries the
//! enable flag and the bridge tunables. Everything has a default; a missing
//! file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::framing::DEFAULT_MAX_FRAME_SIZE;
use crate::native_host;

/// Settings file name under the config directory
const SETTINGS_FILE: &str = "chrome-bridge.json";

/// Environment variable overriding the enable flag
pub const ENABLE_ENV_VAR: &str = "QUILL_ENABLE_CHROME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Persisted bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Whether the agent side wires the browser tools in at all
    pub enabled: bool,
    /// Override for the derived transport address
    pub socket_path: Option<String>,
    /// Maximum frame payload size in bytes
    pub max_frame_size: u32,
    /// Socket connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-call timeout in milliseconds
    pub call_timeout_ms: u64,
    /// Optional JSON file replacing the built-in tool catalog
    pub catalog_path: Option<PathBuf>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            socket_path: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout_ms: 5_000,
            call_timeout_ms: 60_000,
            catalog_path: None,
        }
    }
}

impl BridgeSettings {
    /// Load settings from the given path; a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// The transport address: the configured override or the derived one.
    pub fn resolved_socket_path(&self) -> String {
        self.socket_path
            .clone()
            .unwrap_or_else(native_host::socket_path)
    }

    /// Resolve the enable flag: an explicit CLI flag wins, then the
    /// environment variable, then the persisted setting.
    pub fn is_enabled(&self, cli_flag: Option<bool>) -> bool {
        if let Some(flag) = cli_flag {
            return flag;
        }
        if let Ok(value) = std::env::var(ENABLE_ENV_VAR) {
            if value == "1" || value == "true" {
                return true;
            }
            if value == "0" || value == "false" {
                return false;
            }
        }
        self.enabled
    }
}

/// Per-user config directory (`~/.quill`)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quill")
}

/// Default location of the settings file
pub fn settings_path() -> PathBuf {
    config_dir().join(SETTINGS_FILE)
}
