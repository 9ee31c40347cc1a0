//! TOML configuration for a kernel process.
//!
//! The connection profile (ports, key) comes from the launcher as JSON; this
//! file holds the settings that belong to the kernel itself:
//!
//! ```toml
//! [kernel]
//! username = "kernel"
//! log_level = "info"
//! implementation = "echo-kernel"
//! banner = "Echo kernel: every cell evaluates to its own source"
//!
//! [language]
//! name = "text"
//! version = "1.0"
//! mimetype = "text/plain"
//! file_extension = ".txt"
//! ```
//!
//! Every field has a serde default, so a partial file (or no file at all)
//! still yields a complete [`KernelConfig`].

use std::path::{Path, PathBuf};

use nbkernel_core::protocol::messages::LanguageInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct KernelConfig {
    #[serde(default)]
    pub kernel: KernelSection,
    #[serde(default)]
    pub language: LanguageSection,
}

/// Process-level kernel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelSection {
    /// Username written into every outgoing header.
    #[serde(default = "default_username")]
    pub username: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `implementation` field of `kernel_info_reply`.
    #[serde(default = "default_implementation")]
    pub implementation: String,
    #[serde(default)]
    pub banner: String,
}

/// Language metadata reported in `kernel_info_reply`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageSection {
    #[serde(default = "default_language_name")]
    pub name: String,
    #[serde(default = "default_language_version")]
    pub version: String,
    #[serde(default = "default_mimetype")]
    pub mimetype: String,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pygments_lexer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codemirror_mode: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_username() -> String {
    "kernel".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_implementation() -> String {
    "echo-kernel".to_string()
}
fn default_language_name() -> String {
    "text".to_string()
}
fn default_language_version() -> String {
    "1.0".to_string()
}
fn default_mimetype() -> String {
    "text/plain".to_string()
}
fn default_file_extension() -> String {
    ".txt".to_string()
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            username: default_username(),
            log_level: default_log_level(),
            implementation: default_implementation(),
            banner: String::new(),
        }
    }
}

impl Default for LanguageSection {
    fn default() -> Self {
        Self {
            name: default_language_name(),
            version: default_language_version(),
            mimetype: default_mimetype(),
            file_extension: default_file_extension(),
            pygments_lexer: None,
            codemirror_mode: None,
        }
    }
}

impl LanguageSection {
    pub fn to_language_info(&self) -> LanguageInfo {
        LanguageInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            mimetype: self.mimetype.clone(),
            file_extension: self.file_extension.clone(),
            pygments_lexer: self.pygments_lexer.clone(),
            codemirror_mode: self.codemirror_mode.clone(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads a config file, returning `KernelConfig::default()` if it does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<KernelConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KernelConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &KernelConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
