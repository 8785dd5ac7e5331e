//! # Supervisor Configuration
//!
//! YAML configuration for the ops-ctrl daemon.
//!
//! The file carries three optional sections: an alias table used to resolve
//! `alias` start requests, an autostart table of services launched at boot,
//! and daemon settings.
//!
//! ```yaml
//! aliases:
//!   firefox: /usr/bin/firefox
//! autostart:
//!   clock: "xclock -digital"
//! settings:
//!   socket_path: /tmp/ops-ctrl-daemon.sock
//!   strict_autostart: false
//!   output_limit_bytes: 1048576
//!   id_length: 10
//! ```

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub mod parser;
pub mod resolver;

pub use parser::{load_or_default, parse_file, parse_str, substitute_env_vars};
pub use resolver::{CommandLine, autostart_specs, resolve_alias};

/// Socket the daemon listens on when nothing else is configured
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/ops-ctrl-daemon.sock";

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "opsctl.yaml";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Environment variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// Alias reference not found
    #[error("Alias '{0}' not found")]
    UnknownAlias(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Alias name to command line
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    /// Services started at boot, name to command line
    #[serde(default)]
    pub autostart: BTreeMap<String, String>,

    /// Daemon settings
    #[serde(default)]
    pub settings: Settings,
}

/// Daemon settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Control socket location
    pub socket_path: PathBuf,

    /// Abort startup on the first autostart failure
    pub strict_autostart: bool,

    /// Per-process cap on captured output
    pub output_limit_bytes: usize,

    /// Length of generated service identifiers
    pub id_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            strict_autostart: false,
            output_limit_bytes: supervisor_core::DEFAULT_OUTPUT_LIMIT,
            id_length: supervisor_core::DEFAULT_ID_LENGTH,
        }
    }
}
