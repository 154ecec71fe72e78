// Editor configuration
//
// Loaded from `<config dir>/scan_editor/config.ron`, e.g.
//
// (
//     server: (host: "scan-server.local", port: 4810, timeout_secs: 10),
//     history: (max_undo: 100),
//     log_level: "info",
// )
//
// Missing fields take their defaults; SCAN_SERVER_HOST and SCAN_SERVER_PORT
// override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4810;

pub const HOST_ENV: &str = "SCAN_SERVER_HOST";
pub const PORT_ENV: &str = "SCAN_SERVER_PORT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("RON error in {path}: {source}")]
    Ron {
        path: PathBuf,
        source: ron::error::SpannedError,
    },

    #[error("Invalid value for {name}: '{value}'")]
    InvalidOverride { name: &'static str, value: String },
}

/// Address of the scan server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Edits kept per document for undo
    pub max_undo: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_undo: crate::undo::DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub server: ServerConfig,
    pub history: HistoryConfig,
    /// Default tracing filter, `RUST_LOG` takes precedence
    pub log_level: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            history: HistoryConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl EditorConfig {
    /// `<config dir>/scan_editor/config.ron`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scan_editor").join("config.ron"))
    }

    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&text).map_err(|source| ConfigError::Ron {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the given file, or the default file when it exists, then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply host/port overrides from a variable lookup
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup(HOST_ENV).filter(|host| !host.trim().is_empty()) {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = lookup(PORT_ENV) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidOverride {
                    name: PORT_ENV,
                    value: port.clone(),
                })?;
        }
        Ok(())
    }
}
